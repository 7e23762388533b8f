pub mod audio;
pub mod session;
pub mod shared;
pub mod transcription;

pub use session::controller::{
    PollResult, SessionController, SessionHandle, SessionState, TerminalOutcome,
};
pub use session::error::SessionError;
pub use session::message::TerminalKind;
pub use transcription::domain::segment::{Segment, Word};
pub use transcription::domain::transcription_config::TranscriptionConfig;
