mod settings;

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use subtitle_studio_core::audio::infrastructure::command_vocal_separator::CommandVocalSeparator;
use subtitle_studio_core::audio::infrastructure::wav_audio_extractor::WavAudioExtractor;
use subtitle_studio_core::shared::constants::DEFAULT_POLL_INTERVAL;
use subtitle_studio_core::transcription::domain::transcription_config::{
    ComputeType, Device, TimeWindow,
};
use subtitle_studio_core::transcription::infrastructure::whisper_model::WhisperModelProvider;
use subtitle_studio_core::{SessionController, TerminalOutcome, TranscriptionConfig};

use settings::Settings;

const EXIT_ERROR: i32 = 1;
const EXIT_CANCELLED: i32 = 2;

/// Transcribe a media file into timed subtitle segments.
#[derive(Parser)]
#[command(name = "subtitle-studio")]
struct Cli {
    /// Input video or audio file.
    input: PathBuf,

    /// Model id (tiny, base, small, medium, large-v3...) or path to a model file.
    #[arg(long)]
    model: Option<String>,

    /// Device: auto, cpu or cuda.
    #[arg(long)]
    device: Option<Device>,

    /// Compute type: default, int8, float16 or float32.
    #[arg(long)]
    compute_type: Option<ComputeType>,

    /// Language code, or "auto" to detect.
    #[arg(long)]
    language: Option<String>,

    /// Translate to English instead of transcribing.
    #[arg(long)]
    translate: bool,

    /// Beam size (0 uses the model default, 1 is greedy).
    #[arg(long)]
    beam_size: Option<u32>,

    /// Attach per-word timings to segments.
    #[arg(long)]
    word_timestamps: bool,

    /// Disable the voice-activity filter.
    #[arg(long)]
    no_vad: bool,

    /// VAD speech threshold (0.0-1.0); lower is more sensitive.
    #[arg(long)]
    vad_threshold: Option<f32>,

    /// Shortest speech region kept, in milliseconds.
    #[arg(long)]
    min_speech_ms: Option<u32>,

    /// Silence needed to end a speech region, in milliseconds.
    #[arg(long)]
    min_silence_ms: Option<u32>,

    /// Longest speech region before it is split, in seconds.
    #[arg(long)]
    max_speech_s: Option<f32>,

    /// Padding added around speech regions, in milliseconds.
    #[arg(long)]
    speech_pad_ms: Option<u32>,

    /// Do not retry when the first pass finds too little speech.
    #[arg(long)]
    no_auto_retry: bool,

    /// Isolate vocals before transcribing (requires demucs).
    #[arg(long)]
    separate_vocals: bool,

    /// Maximum words per subtitle (0 disables splitting).
    #[arg(long)]
    max_words: Option<usize>,

    /// Only keep segments from this time on, in seconds.
    #[arg(long)]
    start: Option<f64>,

    /// Only keep segments up to this time, in seconds.
    #[arg(long)]
    end: Option<f64>,

    /// Directory holding ggml model files.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Cancel the transcription after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Store these options as the defaults for later runs.
    #[arg(long)]
    save_defaults: bool,

    /// Write segments as JSON here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(EXIT_ERROR);
        }
    }
}

fn run() -> Result<i32, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let settings = Settings::load();
    let config = build_config(&cli, settings.transcription.clone());
    log::debug!("session config: {config:?}");

    if cli.save_defaults {
        let path = Settings::config_path().ok_or("could not determine config directory")?;
        defaults_from(&config, &settings).save_to(&path)?;
        log::info!("defaults saved to {}", path.display());
    }

    let mut controller = SessionController::new(
        Arc::new(WhisperModelProvider::new()),
        Arc::new(WavAudioExtractor::new()),
    );
    if config.separate_vocals {
        let separator = settings
            .separator_command
            .map(CommandVocalSeparator::new)
            .unwrap_or_default();
        controller = controller.with_separator(Arc::new(separator));
    }

    let handle = controller.start(config)?;
    let timeout = cli.timeout_secs.map(Duration::from_secs);
    let started = Instant::now();
    let mut cancel_sent = false;

    let terminal = loop {
        let poll = controller.poll(handle)?;
        eprint!(
            "\r[{:>3.0}%] {:<60}",
            poll.progress * 100.0,
            truncate(&poll.status_text, 60)
        );
        if let Some(terminal) = poll.terminal {
            break terminal;
        }
        if let Some(limit) = timeout {
            if !cancel_sent && started.elapsed() >= limit {
                log::warn!("timeout of {}s reached, cancelling", limit.as_secs());
                controller.request_cancel(handle)?;
                cancel_sent = true;
            }
        }
        thread::sleep(DEFAULT_POLL_INTERVAL);
    };
    eprintln!();

    match controller.finalize(handle, terminal)? {
        TerminalOutcome::Complete { segments } => {
            let json = serde_json::to_string_pretty(&segments)?;
            match &cli.output {
                Some(path) => {
                    fs::write(path, json)?;
                    log::info!("{} segments written to {}", segments.len(), path.display());
                }
                None => println!("{json}"),
            }
            Ok(0)
        }
        TerminalOutcome::Error { message } => Err(message.into()),
        TerminalOutcome::Cancelled { message } => {
            eprintln!("{message}");
            Ok(EXIT_CANCELLED)
        }
    }
}

/// Overlay command-line flags on the saved defaults.
fn build_config(cli: &Cli, mut config: TranscriptionConfig) -> TranscriptionConfig {
    config.source_path = cli.input.clone();
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(device) = cli.device {
        config.device = device;
    }
    if let Some(compute_type) = cli.compute_type {
        config.compute_type = compute_type;
    }
    if let Some(language) = &cli.language {
        config.language = language.clone();
    }
    if let Some(beam_size) = cli.beam_size {
        config.beam_size = beam_size;
    }
    config.translate |= cli.translate;
    config.word_timestamps |= cli.word_timestamps;
    config.separate_vocals |= cli.separate_vocals;
    if cli.no_vad {
        config.vad_filter = false;
    }
    if cli.no_auto_retry {
        config.auto_retry_on_low_recall = false;
    }

    let vad = &mut config.vad_parameters;
    if let Some(threshold) = cli.vad_threshold {
        vad.threshold = threshold;
    }
    if let Some(ms) = cli.min_speech_ms {
        vad.min_speech_ms = ms;
    }
    if let Some(ms) = cli.min_silence_ms {
        vad.min_silence_ms = ms;
    }
    if let Some(s) = cli.max_speech_s {
        vad.max_speech_s = s;
    }
    if let Some(ms) = cli.speech_pad_ms {
        vad.speech_pad_ms = ms;
    }

    if let Some(max_words) = cli.max_words {
        config.max_words_per_unit = max_words;
    }
    if cli.start.is_some() || cli.end.is_some() {
        config.window = Some(TimeWindow::new(
            cli.start.unwrap_or(0.0),
            cli.end.unwrap_or(f64::INFINITY),
        ));
    }
    if let Some(dir) = &cli.models_dir {
        config.models_dir = Some(dir.clone());
    }
    config
}

/// Settings to persist: the run's options without the per-run input and window.
fn defaults_from(config: &TranscriptionConfig, current: &Settings) -> Settings {
    Settings {
        transcription: TranscriptionConfig {
            source_path: PathBuf::new(),
            window: None,
            ..config.clone()
        },
        separator_command: current.separator_command.clone(),
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input file not found: {}", cli.input.display()).into());
    }
    if let Some(t) = cli.vad_threshold {
        if !(0.0..=1.0).contains(&t) {
            return Err(format!("VAD threshold must be between 0.0 and 1.0, got {t}").into());
        }
    }
    if let Some(s) = cli.max_speech_s {
        if s <= 0.0 {
            return Err(format!("Max speech duration must be positive, got {s}").into());
        }
    }
    if let (Some(start), Some(end)) = (cli.start, cli.end) {
        if end <= start {
            return Err(format!("--end ({end}) must be after --start ({start})").into());
        }
    }
    if cli.start.is_some_and(|s| s < 0.0) {
        return Err("--start must not be negative".into());
    }
    Ok(())
}

/// Shorten to at most `max_chars` characters, ending in "..." when cut.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let cut = text.char_indices().nth(keep).map_or(text.len(), |(idx, _)| idx);
    format!("{}...", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["subtitle-studio"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_flags_override_saved_defaults() {
        let saved = TranscriptionConfig {
            model: "small".to_string(),
            language: "fr".to_string(),
            ..Default::default()
        };
        let cli = parse(&[
            "clip.mp4",
            "--language",
            "en",
            "--device",
            "cpu",
            "--compute-type",
            "float16",
            "--no-vad",
            "--vad-threshold",
            "0.3",
            "--max-words",
            "0",
        ]);

        let config = build_config(&cli, saved);
        assert_eq!(config.model, "small");
        assert_eq!(config.language, "en");
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.compute_type, ComputeType::Float16);
        assert!(!config.vad_filter);
        assert_eq!(config.vad_parameters.threshold, 0.3);
        assert_eq!(config.max_words_per_unit, 0);
        assert_eq!(config.source_path, PathBuf::from("clip.mp4"));
        assert!(config.window.is_none());
    }

    #[test]
    fn test_saved_defaults_drop_per_run_fields() {
        let cli = parse(&["clip.mp4", "--model", "small", "--start", "3", "--save-defaults"]);
        assert!(cli.save_defaults);
        let current = Settings {
            separator_command: Some(PathBuf::from("/opt/demucs")),
            ..Default::default()
        };
        let config = build_config(&cli, current.transcription.clone());

        let saved = defaults_from(&config, &current);
        assert_eq!(saved.transcription.model, "small");
        assert_eq!(saved.transcription.source_path, PathBuf::new());
        assert!(saved.transcription.window.is_none());
        assert_eq!(saved.separator_command, current.separator_command);

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        saved.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), saved);
    }

    #[test]
    fn test_start_only_window_is_open_ended() {
        let cli = parse(&["clip.mp4", "--start", "12.5"]);
        let window = build_config(&cli, TranscriptionConfig::default()).window();
        assert_eq!(window.start, 12.5);
        assert!(window.end.is_infinite());
        assert!(window.is_active());
    }

    #[test]
    fn test_validate_rejects_reversed_window() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let cli = parse(&[path, "--start", "10", "--end", "5"]);
        assert!(validate(&cli).is_err());
        let cli = parse(&[path, "--start", "5", "--end", "10"]);
        assert!(validate(&cli).is_ok());
    }

    #[test]
    fn test_validate_missing_input() {
        let cli = parse(&["/nonexistent/clip.mp4"]);
        assert!(validate(&cli).is_err());
    }

    #[test]
    fn test_unknown_device_rejected_by_parser() {
        let result = Cli::try_parse_from(["subtitle-studio", "clip.mp4", "--device", "tpu"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 10), "abcdefg...");
    }

    #[test]
    fn test_truncate_multibyte_text() {
        let long = "é".repeat(70);
        let out = truncate(&long, 60);
        assert_eq!(out.chars().count(), 60);
        assert!(out.ends_with("..."));
        assert_eq!(truncate("Error: ошибка", 60), "Error: ошибка");
    }
}
