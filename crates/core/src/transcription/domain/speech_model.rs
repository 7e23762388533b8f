use std::path::{Path, PathBuf};

use thiserror::Error;

use super::segment::Segment;
use super::transcription_config::{ComputeType, Device, TranscribeOptions};
use crate::shared::sanitize::sanitize_user_message;

/// Failure to obtain a usable model. Never retried.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model '{model}' not found in {}", dir.display())]
    ModelNotFound { model: String, dir: PathBuf },
    #[error("model '{model}' is incomplete at {}", path.display())]
    IncompleteModel { model: String, path: PathBuf },
    #[error("{compute} compute type not supported on {device}")]
    UnsupportedComputeType { compute: ComputeType, device: Device },
    #[error("GPU runtime library missing or unloadable: {0}")]
    RuntimeUnavailable(String),
    #[error("could not determine model cache directory")]
    NoCacheDir,
    #[error("model backend failed: {0}")]
    Backend(String),
}

impl ModelLoadError {
    /// Short, path-free explanation for the user.
    pub fn user_message(&self) -> String {
        match self {
            ModelLoadError::ModelNotFound { model, .. } => format!(
                "Model '{}' not found. Download the model first.",
                model_display_name(model)
            ),
            ModelLoadError::IncompleteModel { model, .. } => format!(
                "Model '{}' files are incomplete. Re-download the model.",
                model_display_name(model)
            ),
            ModelLoadError::UnsupportedComputeType { compute, device } => format!(
                "{compute} compute type not supported on {device}. Use int8 or float32."
            ),
            ModelLoadError::RuntimeUnavailable(_) => {
                "GPU runtime library missing or unloadable. Install the GPU runtime or use the CPU device."
                    .to_string()
            }
            ModelLoadError::NoCacheDir => {
                "Could not determine where models are stored.".to_string()
            }
            ModelLoadError::Backend(detail) => {
                format!("Failed to load AI model: {}", sanitize_user_message(detail))
            }
        }
    }
}

/// Model ids may be file paths; only the file stem is shown.
fn model_display_name(model: &str) -> String {
    let name = if model.contains(['/', '\\']) {
        model
            .rsplit(['/', '\\'])
            .next()
            .map(|file| file.rsplit_once('.').map_or(file, |(stem, _)| stem))
            .unwrap_or_default()
    } else {
        model
    };
    sanitize_user_message(name)
}

/// Failure while the model is running over audio.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("failed to decode audio: {0}")]
    Decode(String),
    #[error("inference failed: {0}")]
    Backend(String),
    #[error("speech detection failed: {0}")]
    Vad(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InferenceError {
    pub fn user_message(&self) -> String {
        sanitize_user_message(&format!("Transcription failed: {self}"))
    }
}

/// Metadata the model reports before yielding segments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranscriptionInfo {
    /// Detected or forced language, when the model knows it.
    pub language: Option<String>,
    /// Length of the transcribed audio in seconds.
    pub duration: f64,
}

/// Segments are produced lazily so callers can stop between them.
pub type SegmentStream<'a> = Box<dyn Iterator<Item = Result<Segment, InferenceError>> + 'a>;

pub struct Transcription<'a> {
    pub info: TranscriptionInfo,
    pub segments: SegmentStream<'a>,
}

/// A loaded recognition model.
pub trait SpeechModel: Send {
    fn transcribe<'a>(
        &'a self,
        audio_path: &Path,
        options: &TranscribeOptions,
    ) -> Result<Transcription<'a>, InferenceError>;
}

/// Produces ready-to-use models.
pub trait ModelProvider: Send + Sync {
    fn load(
        &self,
        model_id: &str,
        device: Device,
        compute_type: ComputeType,
        cache_dir: Option<&Path>,
    ) -> Result<Box<dyn SpeechModel>, ModelLoadError>;
}
