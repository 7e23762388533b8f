use thiserror::Error;

use super::message::TerminalKind;

/// Misuse of the session controller. Worker-side failures never surface
/// here; they arrive as terminal messages.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("a transcription is already running")]
    AlreadyRunning,
    #[error("session {0} is not the current session")]
    UnknownSession(u64),
    #[error("session has not reached a terminal state")]
    NotTerminal,
    #[error("session ended as {actual}, not {requested}")]
    TerminalMismatch {
        requested: TerminalKind,
        actual: TerminalKind,
    },
    #[error("failed to spawn transcription worker: {0}")]
    Spawn(#[source] std::io::Error),
}
