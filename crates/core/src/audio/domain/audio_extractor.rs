use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::RAW_AUDIO_EXTENSIONS;
use crate::shared::sanitize::sanitize_user_message;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("no audio track in {}", .0.display())]
    NoAudioTrack(PathBuf),
    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("failed to write extracted audio: {0}")]
    Write(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractionError {
    pub fn user_message(&self) -> String {
        match self {
            ExtractionError::NoAudioTrack(_) => "The selected media has no audio track.".to_string(),
            other => sanitize_user_message(&format!("Audio extraction failed: {other}")),
        }
    }
}

/// A temporary audio file removed when this value is dropped.
#[derive(Debug)]
pub struct ExtractedAudio {
    path: PathBuf,
}

impl ExtractedAudio {
    /// Take ownership of `path`; the file is deleted on drop.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ExtractedAudio {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("removed extracted audio {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "failed to remove extracted audio {}: {e}",
                self.path.display()
            ),
        }
    }
}

/// Domain interface for pulling a mono 16 kHz track out of a media file.
pub trait AudioExtractor: Send + Sync {
    fn extract(&self, source: &Path) -> Result<ExtractedAudio, ExtractionError>;
}

/// Whether the model can read `path` without extraction.
pub fn is_raw_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| RAW_AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
