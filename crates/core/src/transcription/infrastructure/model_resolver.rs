use std::fs;
use std::path::{Path, PathBuf};

use crate::shared::constants::MIN_MODEL_FILE_BYTES;
use crate::transcription::domain::speech_model::ModelLoadError;

const APP_DIR: &str = "Subtitle Studio";

/// Resolve a model id to its on-disk weights file.
///
/// Accepts either a path to a model file or a short id such as `base` or
/// `large-v3`, which maps to `ggml-<id>.bin` under `cache_dir` (default:
/// [`model_cache_dir`]). Nothing is downloaded; a missing or truncated file
/// is a load error.
pub fn resolve_model_path(
    model_id: &str,
    cache_dir: Option<&Path>,
) -> Result<PathBuf, ModelLoadError> {
    let direct = Path::new(model_id);
    let (path, dir) = if direct.extension().is_some_and(|e| e == "bin") || direct.is_file() {
        let dir = direct.parent().map(Path::to_path_buf).unwrap_or_default();
        (direct.to_path_buf(), dir)
    } else {
        let dir = match cache_dir {
            Some(dir) => dir.to_path_buf(),
            None => model_cache_dir()?,
        };
        (dir.join(model_file_name(model_id)), dir)
    };

    let metadata = match fs::metadata(&path) {
        Ok(m) if m.is_file() => m,
        _ => {
            return Err(ModelLoadError::ModelNotFound {
                model: model_id.to_string(),
                dir,
            })
        }
    };
    if metadata.len() <= MIN_MODEL_FILE_BYTES {
        return Err(ModelLoadError::IncompleteModel {
            model: model_id.to_string(),
            path,
        });
    }
    Ok(path)
}

pub fn model_file_name(model_id: &str) -> String {
    format!("ggml-{model_id}.bin")
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/Subtitle Studio/models/`
/// - Linux: `$XDG_CACHE_HOME/Subtitle Studio/models/` or `~/.cache/Subtitle Studio/models/`
/// - Windows: `%LOCALAPPDATA%/Subtitle Studio/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelLoadError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR).join("models"))
            .ok_or(ModelLoadError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join(APP_DIR).join("models"))
            .ok_or(ModelLoadError::NoCacheDir)
    }
}
