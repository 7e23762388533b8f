pub mod command_vocal_separator;
pub mod ffmpeg_decoder;
pub mod wav_audio_extractor;
