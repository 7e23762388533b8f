use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Auto,
    Cpu,
    Cuda,
}

impl Device {
    pub fn wants_gpu(self) -> bool {
        !matches!(self, Device::Cpu)
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Auto => write!(f, "auto"),
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeType {
    Default,
    Int8,
    Float16,
    Float32,
}

impl std::fmt::Display for ComputeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeType::Default => write!(f, "default"),
            ComputeType::Int8 => write!(f, "int8"),
            ComputeType::Float16 => write!(f, "float16"),
            ComputeType::Float32 => write!(f, "float32"),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => Err(format!("unknown device '{other}' (expected auto, cpu or cuda)")),
        }
    }
}

impl FromStr for ComputeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(ComputeType::Default),
            "int8" => Ok(ComputeType::Int8),
            "float16" => Ok(ComputeType::Float16),
            "float32" => Ok(ComputeType::Float32),
            other => Err(format!(
                "unknown compute type '{other}' (expected default, int8, float16 or float32)"
            )),
        }
    }
}

/// Pick the compute type actually used on `device`.
///
/// float16 has no efficient CPU path, so it drops to int8 there.
pub fn resolve_compute_type(device: Device, requested: ComputeType) -> ComputeType {
    if device == Device::Cpu && requested == ComputeType::Float16 {
        log::warn!("float16 is not supported on CPU, falling back to int8");
        return ComputeType::Int8;
    }
    requested
}

/// Voice-activity filter tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VadParameters {
    /// Speech probability threshold; lower is more sensitive.
    pub threshold: f32,
    pub min_speech_ms: u32,
    pub min_silence_ms: u32,
    pub max_speech_s: f32,
    pub speech_pad_ms: u32,
}

impl Default for VadParameters {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_speech_ms: 250,
            min_silence_ms: 2000,
            max_speech_s: 15.0,
            speech_pad_ms: 400,
        }
    }
}

/// Sub-range of the source to transcribe, in seconds.
///
/// A window whose end is not after its start means "the whole source".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn is_active(&self) -> bool {
        self.end > self.start
    }
}

/// Everything one transcription session needs. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub model: String,
    pub device: Device,
    pub compute_type: ComputeType,
    /// ISO language code, or `"auto"` to detect.
    pub language: String,
    pub translate: bool,
    pub beam_size: u32,
    pub word_timestamps: bool,
    pub vad_filter: bool,
    pub vad_parameters: VadParameters,
    pub auto_retry_on_low_recall: bool,
    pub separate_vocals: bool,
    /// 0 disables splitting.
    pub max_words_per_unit: usize,
    pub source_path: PathBuf,
    pub window: Option<TimeWindow>,
    pub models_dir: Option<PathBuf>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: "base".to_string(),
            device: Device::Auto,
            compute_type: ComputeType::Default,
            language: "auto".to_string(),
            translate: false,
            beam_size: 5,
            word_timestamps: false,
            vad_filter: true,
            vad_parameters: VadParameters::default(),
            auto_retry_on_low_recall: true,
            separate_vocals: false,
            max_words_per_unit: 7,
            source_path: PathBuf::new(),
            window: None,
            models_dir: None,
        }
    }
}

impl TranscriptionConfig {
    pub fn window(&self) -> TimeWindow {
        self.window.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Transcribe,
    Translate,
}

/// Options handed to the model for a single pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribeOptions {
    /// `None` lets the model detect the language.
    pub language: Option<String>,
    pub task: Task,
    /// `None` leaves the model's own default.
    pub beam_size: Option<u32>,
    pub word_timestamps: bool,
    pub vad_filter: bool,
    /// Only present when `vad_filter` is on.
    pub vad_parameters: Option<VadParameters>,
}

/// Build the per-pass model options from the session config.
///
/// The VAD switch and parameters are passed separately because retry passes
/// override them.
pub fn build_transcribe_options(
    config: &TranscriptionConfig,
    vad_filter: bool,
    vad_parameters: VadParameters,
) -> TranscribeOptions {
    let language = match config.language.trim() {
        "" | "auto" => None,
        lang => Some(lang.to_string()),
    };
    TranscribeOptions {
        language,
        task: if config.translate {
            Task::Translate
        } else {
            Task::Transcribe
        },
        beam_size: (config.beam_size > 0).then_some(config.beam_size),
        word_timestamps: config.word_timestamps,
        vad_filter,
        vad_parameters: vad_filter.then_some(vad_parameters),
    }
}
