use std::collections::VecDeque;
use std::ops::Range;
use std::path::{Path, PathBuf};

use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
};

use super::model_resolver::{model_file_name, resolve_model_path};
use super::silero_vad::SileroVad;
use crate::audio::infrastructure::ffmpeg_decoder::decode_mono;
use crate::shared::constants::{VAD_MODEL_ID, WHISPER_SAMPLE_RATE};
use crate::transcription::domain::segment::{Segment, Word};
use crate::transcription::domain::speech_model::{
    InferenceError, ModelLoadError, ModelProvider, SpeechModel, Transcription, TranscriptionInfo,
};
use crate::transcription::domain::transcription_config::{
    ComputeType, Device, Task, TranscribeOptions,
};

/// whisper.cpp rejects very short inputs, so regions are zero-padded to this.
const MIN_REGION_SAMPLES: usize = WHISPER_SAMPLE_RATE as usize;

/// Loads whisper.cpp models from the local model cache.
#[derive(Debug, Default)]
pub struct WhisperModelProvider;

impl WhisperModelProvider {
    pub fn new() -> Self {
        Self
    }
}

impl ModelProvider for WhisperModelProvider {
    fn load(
        &self,
        model_id: &str,
        device: Device,
        compute_type: ComputeType,
        cache_dir: Option<&Path>,
    ) -> Result<Box<dyn SpeechModel>, ModelLoadError> {
        let path = resolve_weights(model_id, compute_type, cache_dir)?;
        let path_str = path.to_str().ok_or_else(|| {
            ModelLoadError::Backend(format!("model path is not valid UTF-8: {}", path.display()))
        })?;

        let mut params = WhisperContextParameters::default();
        params.use_gpu(device.wants_gpu());
        let ctx = WhisperContext::new_with_params(path_str, params)
            .map_err(|e| classify_load_error(device, compute_type, &e.to_string()))?;

        log::info!("whisper model loaded from {}", path.display());

        // Only needed when a pass asks for VAD filtering.
        let vad = match SileroVad::locate(cache_dir, device.wants_gpu()) {
            Ok(vad) => Some(vad),
            Err(e) => {
                log::warn!("voice activity detection unavailable: {e}");
                None
            }
        };
        Ok(Box::new(WhisperModel { ctx, path, vad }))
    }
}

/// int8 prefers a `q8_0` quantized file when one is present.
fn resolve_weights(
    model_id: &str,
    compute_type: ComputeType,
    cache_dir: Option<&Path>,
) -> Result<PathBuf, ModelLoadError> {
    if compute_type == ComputeType::Int8 {
        let quantized = format!("{model_id}-q8_0");
        if let Ok(path) = resolve_model_path(&quantized, cache_dir) {
            return Ok(path);
        }
        log::debug!(
            "no {} found, using full precision weights",
            model_file_name(&quantized)
        );
    }
    resolve_model_path(model_id, cache_dir)
}

fn classify_load_error(device: Device, compute_type: ComputeType, detail: &str) -> ModelLoadError {
    let lower = detail.to_lowercase();
    if device.wants_gpu()
        && ["cuda", "cublas", "cudnn", "libcu", "gpu"]
            .iter()
            .any(|k| lower.contains(k))
    {
        ModelLoadError::RuntimeUnavailable(detail.to_string())
    } else if lower.contains("compute type") || lower.contains("unsupported type") {
        ModelLoadError::UnsupportedComputeType {
            compute: compute_type,
            device,
        }
    } else {
        ModelLoadError::Backend(detail.to_string())
    }
}

/// A loaded whisper.cpp model.
pub struct WhisperModel {
    ctx: WhisperContext,
    path: PathBuf,
    vad: Option<SileroVad>,
}

impl WhisperModel {
    pub fn model_path(&self) -> &Path {
        &self.path
    }

    fn regions(
        &self,
        samples: &[f32],
        options: &TranscribeOptions,
    ) -> Result<VecDeque<Range<usize>>, InferenceError> {
        match &options.vad_parameters {
            Some(params) if options.vad_filter => {
                let vad = self.vad.as_ref().ok_or_else(missing_vad_model)?;
                Ok(vad.speech_regions(samples, params)?.into())
            }
            _ => Ok(whole_audio(samples.len())),
        }
    }
}

fn missing_vad_model() -> InferenceError {
    InferenceError::Vad(format!(
        "{} not found in the model cache. Download it or turn off VAD filtering.",
        model_file_name(VAD_MODEL_ID)
    ))
}

fn whole_audio(len: usize) -> VecDeque<Range<usize>> {
    if len == 0 {
        VecDeque::new()
    } else {
        VecDeque::from([0..len])
    }
}

impl SpeechModel for WhisperModel {
    fn transcribe<'a>(
        &'a self,
        audio_path: &Path,
        options: &TranscribeOptions,
    ) -> Result<Transcription<'a>, InferenceError> {
        let samples = decode_mono(audio_path, WHISPER_SAMPLE_RATE)
            .map_err(|e| InferenceError::Decode(e.to_string()))?
            .ok_or_else(|| InferenceError::Decode("no audio stream".to_string()))?;
        let duration = samples.len() as f64 / WHISPER_SAMPLE_RATE as f64;

        let regions = self.regions(&samples, options)?;
        log::debug!(
            "transcribing {duration:.1}s of audio in {} region(s)",
            regions.len()
        );

        let state = self
            .ctx
            .create_state()
            .map_err(|e| InferenceError::Backend(format!("failed to create state: {e}")))?;

        let mut stream = RegionSegments {
            state,
            samples,
            regions,
            options: options.clone(),
            pending: VecDeque::new(),
            failed: false,
        };

        // The first region runs eagerly so the detected language is known
        // before any segment is handed out.
        stream.fill_next_region()?;
        let language = options.language.clone().or_else(|| stream.detected_language());

        Ok(Transcription {
            info: TranscriptionInfo { language, duration },
            segments: Box::new(stream),
        })
    }
}

/// Yields segments region by region; a region is only decoded once the
/// previous one's segments have been consumed.
struct RegionSegments {
    state: WhisperState,
    samples: Vec<f32>,
    regions: VecDeque<Range<usize>>,
    options: TranscribeOptions,
    pending: VecDeque<Segment>,
    failed: bool,
}

impl RegionSegments {
    fn fill_next_region(&mut self) -> Result<(), InferenceError> {
        while self.pending.is_empty() {
            let Some(region) = self.regions.pop_front() else {
                return Ok(());
            };
            let offset = region.start as f64 / WHISPER_SAMPLE_RATE as f64;
            let mut audio = self.samples[region].to_vec();
            if audio.len() < MIN_REGION_SAMPLES {
                audio.resize(MIN_REGION_SAMPLES, 0.0);
            }

            self.state
                .full(full_params(&self.options), &audio)
                .map_err(|e| InferenceError::Backend(e.to_string()))?;
            self.collect_segments(offset)?;
        }
        Ok(())
    }

    fn collect_segments(&mut self, offset: f64) -> Result<(), InferenceError> {
        let num_segments = self.state.full_n_segments();
        for seg_idx in 0..num_segments {
            let Some(segment) = self.state.get_segment(seg_idx) else {
                continue;
            };
            let text = segment
                .to_str_lossy()
                .map_err(|e| InferenceError::Backend(e.to_string()))?
                .trim()
                .to_string();
            if is_non_speech(&text) {
                continue;
            }

            // Timestamps are in centiseconds relative to the region.
            let start = offset + segment.start_timestamp() as f64 / 100.0;
            let end = offset + segment.end_timestamp() as f64 / 100.0;

            let mut words: Vec<Word> = Vec::new();
            if self.options.word_timestamps {
                for tok_idx in 0..segment.n_tokens() {
                    let Some(token) = segment.get_token(tok_idx) else {
                        continue;
                    };
                    let Ok(piece) = token.to_str() else {
                        continue;
                    };
                    let trimmed = piece.trim();
                    if trimmed.is_empty() || trimmed.starts_with('[') || trimmed.starts_with('<') {
                        continue;
                    }
                    let data = token.token_data();
                    let t0 = offset + data.t0 as f64 / 100.0;
                    let t1 = offset + data.t1 as f64 / 100.0;

                    // Sub-word pieces carry no leading space.
                    match words.last_mut() {
                        Some(word) if !piece.starts_with(' ') => {
                            word.text.push_str(trimmed);
                            word.end = word.end.max(t1);
                        }
                        _ => words.push(Word {
                            text: trimmed.to_string(),
                            start: t0,
                            end: t1.max(t0),
                        }),
                    }
                }
            }

            let segment = Segment::new(start, end, text);
            self.pending.push_back(if words.is_empty() {
                segment
            } else {
                segment.with_words(words)
            });
        }
        Ok(())
    }

    fn detected_language(&self) -> Option<String> {
        let id = self.state.full_lang_id_from_state();
        if id < 0 {
            return None;
        }
        whisper_rs::get_lang_str(id).map(str::to_string)
    }
}

impl Iterator for RegionSegments {
    type Item = Result<Segment, InferenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Err(e) = self.fill_next_region() {
            self.failed = true;
            return Some(Err(e));
        }
        self.pending.pop_front().map(Ok)
    }
}

fn full_params(options: &TranscribeOptions) -> FullParams<'_, '_> {
    let strategy = match options.beam_size {
        Some(beam_size) if beam_size > 1 => SamplingStrategy::BeamSearch {
            beam_size: beam_size as i32,
            patience: -1.0,
        },
        _ => SamplingStrategy::Greedy { best_of: 1 },
    };
    let mut params = FullParams::new(strategy);
    params.set_language(Some(options.language.as_deref().unwrap_or("auto")));
    params.set_translate(options.task == Task::Translate);
    params.set_token_timestamps(options.word_timestamps);
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    params.set_n_threads(num_cpus().min(8) as i32);
    params
}

/// Whisper marks silence and noise with bracketed tags such as `[BLANK_AUDIO]`.
fn is_non_speech(text: &str) -> bool {
    text.is_empty()
        || (text.starts_with('[') && text.ends_with(']'))
        || (text.starts_with('(') && text.ends_with(')'))
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
