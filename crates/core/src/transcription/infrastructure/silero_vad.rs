use std::ops::Range;
use std::path::{Path, PathBuf};

use whisper_rs::{WhisperVadContext, WhisperVadContextParams, WhisperVadParams};

use super::model_resolver::resolve_model_path;
use crate::shared::constants::{VAD_MODEL_ID, WHISPER_SAMPLE_RATE};
use crate::transcription::domain::speech_model::{InferenceError, ModelLoadError};
use crate::transcription::domain::transcription_config::VadParameters;

/// whisper.cpp's Silero voice activity detector.
#[derive(Debug, Clone)]
pub struct SileroVad {
    model_path: PathBuf,
    use_gpu: bool,
}

impl SileroVad {
    /// Looks for `ggml-silero-*.bin` next to the speech models.
    pub fn locate(cache_dir: Option<&Path>, use_gpu: bool) -> Result<Self, ModelLoadError> {
        let model_path = resolve_model_path(VAD_MODEL_ID, cache_dir)?;
        Ok(Self {
            model_path,
            use_gpu,
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Sample ranges of `samples` (16 kHz mono) that contain speech.
    pub fn speech_regions(
        &self,
        samples: &[f32],
        params: &VadParameters,
    ) -> Result<Vec<Range<usize>>, InferenceError> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        let path = self.model_path.to_str().ok_or_else(|| {
            InferenceError::Vad(format!(
                "model path is not valid UTF-8: {}",
                self.model_path.display()
            ))
        })?;

        let mut ctx_params = WhisperVadContextParams::new();
        ctx_params.set_use_gpu(self.use_gpu);
        let threads = std::thread::available_parallelism().map_or(1, |n| n.get());
        ctx_params.set_n_threads(threads.min(4) as i32);
        let mut ctx = WhisperVadContext::new(path, ctx_params)
            .map_err(|e| InferenceError::Vad(format!("failed to load model: {e}")))?;

        let segments = ctx
            .segments_from_samples(detector_params(params), samples)
            .map_err(|e| InferenceError::Vad(e.to_string()))?;
        let regions = regions_from_centiseconds(
            segments.map(|segment| (segment.start, segment.end)),
            samples.len(),
        );
        log::debug!(
            "speech detection: {} region(s), threshold {:.2}",
            regions.len(),
            params.threshold
        );
        Ok(regions)
    }
}

fn detector_params(params: &VadParameters) -> WhisperVadParams {
    let mut vad = WhisperVadParams::new();
    vad.set_threshold(params.threshold);
    vad.set_min_speech_duration(clamp_ms(params.min_speech_ms));
    vad.set_min_silence_duration(clamp_ms(params.min_silence_ms));
    vad.set_max_speech_duration(if params.max_speech_s.is_finite() && params.max_speech_s > 0.0 {
        params.max_speech_s
    } else {
        f32::MAX
    });
    vad.set_speech_pad(clamp_ms(params.speech_pad_ms));
    vad
}

fn clamp_ms(ms: u32) -> i32 {
    i32::try_from(ms).unwrap_or(i32::MAX)
}

/// Detector timestamps are centiseconds. Spans are clipped to the audio,
/// empty ones dropped and overlapping ones merged.
fn regions_from_centiseconds(
    spans: impl IntoIterator<Item = (f32, f32)>,
    len: usize,
) -> Vec<Range<usize>> {
    let to_sample = |cs: f32| {
        let sample = (cs.max(0.0) as f64 / 100.0 * WHISPER_SAMPLE_RATE as f64).round() as usize;
        sample.min(len)
    };

    let mut regions: Vec<Range<usize>> = Vec::new();
    for (start, end) in spans {
        let region = to_sample(start)..to_sample(end);
        if region.is_empty() {
            continue;
        }
        match regions.last_mut() {
            Some(last) if region.start <= last.end => last.end = last.end.max(region.end),
            _ => regions.push(region),
        }
    }
    regions
}
