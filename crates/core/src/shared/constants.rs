use std::time::Duration;

pub const WHISPER_SAMPLE_RATE: u32 = 16000;

/// Model files smaller than this are treated as interrupted downloads.
pub const MIN_MODEL_FILE_BYTES: u64 = 1024;

/// Voice activity model looked up in the model cache as `ggml-<id>.bin`.
pub const VAD_MODEL_ID: &str = "silero-v5.1.2";

/// Containers the model reads directly; anything else goes through extraction.
pub const RAW_AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "m4a"];

/// Cadence callers are expected to poll a running session at.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

// Recall heuristics. Empirical values; clips shorter than the minimum
// duration never trigger a retry.
pub const RECALL_MIN_AUDIO_SECONDS: f64 = 45.0;
pub const RECALL_MIN_SEGMENTS: usize = 8;
pub const RECALL_MIN_WORDS: usize = 25;
pub const LOW_RECALL_COVERAGE: f64 = 0.03;
pub const NO_VAD_RETRY_COVERAGE: f64 = 0.02;

// Relaxed VAD bounds for the second pass.
pub const RELAXED_THRESHOLD_FLOOR: f32 = 0.18;
pub const RELAXED_THRESHOLD_STEP: f32 = 0.1;
pub const RELAXED_MIN_SPEECH_MS: u32 = 80;
pub const RELAXED_MIN_SILENCE_MS: u32 = 350;
pub const RELAXED_PAD_STEP_MS: u32 = 200;
pub const RELAXED_PAD_CEILING_MS: u32 = 900;

/// Progress fraction reserved for model loading and audio preparation.
pub const PASS_PROGRESS_START: f64 = 0.1;
