//! In-process stand-ins for the model, extractor and separator.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::audio::domain::audio_extractor::{AudioExtractor, ExtractedAudio, ExtractionError};
use crate::audio::domain::vocal_separator::{SeparatedAudio, SeparationError, VocalSeparator};
use crate::transcription::domain::segment::Segment;
use crate::transcription::domain::speech_model::{
    InferenceError, ModelLoadError, ModelProvider, SpeechModel, Transcription, TranscriptionInfo,
};
use crate::transcription::domain::transcription_config::{
    ComputeType, Device, TranscribeOptions,
};

type Script = dyn Fn(&TranscribeOptions) -> Vec<Segment> + Send + Sync;

/// 3 segments, 12 words, 2 seconds of speech.
pub fn poor_segments() -> Vec<Segment> {
    (0..3)
        .map(|i| {
            let start = i as f64 * 30.0;
            Segment::new(start, start + 2.0 / 3.0, "alpha beta gamma delta")
        })
        .collect()
}

/// 15 segments, 60 words, 40 seconds of speech.
pub fn rich_segments() -> Vec<Segment> {
    (0..15)
        .map(|i| {
            let start = i as f64 * 8.0;
            Segment::new(start, start + 40.0 / 15.0, "one two three four")
        })
        .collect()
}

/// Provider whose models answer each pass from a script.
pub struct ScriptedProvider {
    script: Arc<Script>,
    audio_duration: f64,
    language: Option<String>,
    segment_delay: Duration,
    fail_with: Option<fn() -> ModelLoadError>,
    pub loads: Arc<Mutex<usize>>,
    pub calls: Arc<Mutex<Vec<TranscribeOptions>>>,
    pub audio_paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScriptedProvider {
    pub fn new(
        audio_duration: f64,
        script: impl Fn(&TranscribeOptions) -> Vec<Segment> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Arc::new(script),
            audio_duration,
            language: None,
            segment_delay: Duration::ZERO,
            fail_with: None,
            loads: Arc::new(Mutex::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
            audio_paths: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn fixed(segments: Vec<Segment>, audio_duration: f64) -> Self {
        Self::new(audio_duration, move |_| segments.clone())
    }

    pub fn failing(fail_with: fn() -> ModelLoadError) -> Self {
        let mut provider = Self::fixed(Vec::new(), 0.0);
        provider.fail_with = Some(fail_with);
        provider
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn with_segment_delay(mut self, delay: Duration) -> Self {
        self.segment_delay = delay;
        self
    }
}

impl ModelProvider for ScriptedProvider {
    fn load(
        &self,
        _model_id: &str,
        _device: Device,
        _compute_type: ComputeType,
        _cache_dir: Option<&Path>,
    ) -> Result<Box<dyn SpeechModel>, ModelLoadError> {
        *self.loads.lock().unwrap() += 1;
        if let Some(fail) = self.fail_with {
            return Err(fail());
        }
        Ok(Box::new(ScriptedModel {
            script: self.script.clone(),
            audio_duration: self.audio_duration,
            language: self.language.clone(),
            segment_delay: self.segment_delay,
            calls: self.calls.clone(),
            audio_paths: self.audio_paths.clone(),
        }))
    }
}

struct ScriptedModel {
    script: Arc<Script>,
    audio_duration: f64,
    language: Option<String>,
    segment_delay: Duration,
    calls: Arc<Mutex<Vec<TranscribeOptions>>>,
    audio_paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl SpeechModel for ScriptedModel {
    fn transcribe<'a>(
        &'a self,
        audio_path: &Path,
        options: &TranscribeOptions,
    ) -> Result<Transcription<'a>, InferenceError> {
        self.calls.lock().unwrap().push(options.clone());
        self.audio_paths.lock().unwrap().push(audio_path.to_path_buf());
        let delay = self.segment_delay;
        let segments = (self.script)(options).into_iter().map(move |seg| {
            std::thread::sleep(delay);
            Ok::<_, InferenceError>(seg)
        });
        Ok(Transcription {
            info: TranscriptionInfo {
                language: self.language.clone(),
                duration: self.audio_duration,
            },
            segments: Box::new(segments),
        })
    }
}

/// Writes a placeholder file per extraction and remembers where.
#[derive(Default)]
pub struct RecordingExtractor {
    pub dir: Option<PathBuf>,
    pub extracted: Arc<Mutex<Vec<PathBuf>>>,
}

impl AudioExtractor for RecordingExtractor {
    fn extract(&self, _source: &Path) -> Result<ExtractedAudio, ExtractionError> {
        let dir = self.dir.clone().unwrap_or_else(std::env::temp_dir);
        let file = tempfile::Builder::new()
            .prefix("extract-")
            .suffix(".wav")
            .tempfile_in(dir)?;
        let path = file
            .into_temp_path()
            .keep()
            .map_err(|e| ExtractionError::Write(e.to_string()))?;
        self.extracted.lock().unwrap().push(path.clone());
        Ok(ExtractedAudio::new(path))
    }
}

pub struct FailingExtractor;

impl AudioExtractor for FailingExtractor {
    fn extract(&self, source: &Path) -> Result<ExtractedAudio, ExtractionError> {
        Err(ExtractionError::Decode {
            path: source.to_path_buf(),
            reason: "invalid data found when processing input".to_string(),
        })
    }
}

/// Separator that either fails or returns a fixed path.
pub struct StubSeparator {
    pub output: Option<PathBuf>,
}

impl VocalSeparator for StubSeparator {
    fn separate(&self, _audio: &Path) -> Result<SeparatedAudio, SeparationError> {
        match &self.output {
            Some(path) => Ok(SeparatedAudio::new(path.clone(), None)),
            None => Err(SeparationError::Failed("model crashed".to_string())),
        }
    }
}
