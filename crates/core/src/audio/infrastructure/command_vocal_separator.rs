use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use crate::audio::domain::vocal_separator::{SeparatedAudio, SeparationError, VocalSeparator};

const DEFAULT_PROGRAM: &str = "demucs";
const VOCALS_FILE: &str = "vocals.wav";

/// Isolates vocals by running an external two-stem separation command.
///
/// The command writes `<out>/<model>/<track>/vocals.wav`; the output tree lives
/// in a temporary directory owned by the returned [`SeparatedAudio`].
#[derive(Debug, Clone)]
pub struct CommandVocalSeparator {
    program: PathBuf,
}

impl Default for CommandVocalSeparator {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl CommandVocalSeparator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl VocalSeparator for CommandVocalSeparator {
    fn separate(&self, audio: &Path) -> Result<SeparatedAudio, SeparationError> {
        let workdir = tempfile::Builder::new()
            .prefix("vocal_separation_")
            .tempdir()?;

        log::info!("separating vocals with {}", self.program.display());
        let output = Command::new(&self.program)
            .arg("--two-stems=vocals")
            .arg("-o")
            .arg(workdir.path())
            .arg(audio)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SeparationError::Unavailable(format!(
                    "{} is not installed",
                    self.program.display()
                )),
                _ => SeparationError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty());
            return Err(SeparationError::Failed(format!(
                "{}: {}",
                output.status,
                last_line.unwrap_or("no output")
            )));
        }

        let vocals = find_vocals(workdir.path()).ok_or(SeparationError::MissingOutput)?;
        log::debug!("vocals written to {}", vocals.display());
        Ok(SeparatedAudio::new(vocals, Some(workdir)))
    }
}

/// Depth-first search for the vocals stem.
fn find_vocals(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if path.file_name().is_some_and(|n| n == VOCALS_FILE) {
            return Some(path);
        }
    }
    subdirs.sort();
    subdirs.iter().find_map(|d| find_vocals(d))
}
