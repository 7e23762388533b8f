pub mod model_resolver;
pub mod silero_vad;
pub mod whisper_model;
