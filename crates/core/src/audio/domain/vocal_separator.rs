use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeparationError {
    #[error("separator unavailable: {0}")]
    Unavailable(String),
    #[error("separation failed: {0}")]
    Failed(String),
    #[error("separator produced no vocals track")]
    MissingOutput,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Isolated vocals plus the scratch directory holding them.
///
/// Dropping this removes the scratch directory.
#[derive(Debug)]
pub struct SeparatedAudio {
    path: PathBuf,
    _workdir: Option<TempDir>,
}

impl SeparatedAudio {
    pub fn new(path: PathBuf, workdir: Option<TempDir>) -> Self {
        Self {
            path,
            _workdir: workdir,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Domain interface for isolating speech from music and effects.
pub trait VocalSeparator: Send + Sync {
    fn separate(&self, audio: &Path) -> Result<SeparatedAudio, SeparationError>;
}
