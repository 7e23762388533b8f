pub mod recall_policy;
pub mod segment;
pub mod segment_processor;
pub mod speech_model;
pub mod transcription_config;
