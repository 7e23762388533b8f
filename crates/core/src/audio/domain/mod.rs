pub mod audio_extractor;
pub mod vocal_separator;
