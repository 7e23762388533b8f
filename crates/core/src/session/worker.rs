use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;

use super::message::WorkerMessage;
use crate::audio::domain::audio_extractor::{is_raw_audio, AudioExtractor};
use crate::audio::domain::vocal_separator::VocalSeparator;
use crate::shared::constants::PASS_PROGRESS_START;
use crate::transcription::domain::recall_policy::{
    build_relaxed_vad_parameters, compute_recall_metrics, is_candidate_better, is_low_recall,
    should_retry_without_vad, RecallMetrics,
};
use crate::transcription::domain::segment::Segment;
use crate::transcription::domain::speech_model::{ModelProvider, SpeechModel};
use crate::transcription::domain::transcription_config::{
    build_transcribe_options, resolve_compute_type, TranscriptionConfig, VadParameters,
};

const CANCELLED_TEXT: &str = "Transcription cancelled.";

/// Everything the worker thread owns for one session.
pub struct WorkerContext {
    pub config: Arc<TranscriptionConfig>,
    pub models: Arc<dyn ModelProvider>,
    pub extractor: Arc<dyn AudioExtractor>,
    pub separator: Option<Arc<dyn VocalSeparator>>,
    pub cancelled: Arc<AtomicBool>,
    pub tx: Sender<WorkerMessage>,
}

/// Why the pipeline stopped early.
#[derive(Debug, PartialEq)]
enum Stop {
    Cancelled,
    /// Already sanitized for display.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Primary,
    RelaxedVad,
    NoVad,
}

impl Pass {
    fn status_prefix(self) -> &'static str {
        match self {
            Pass::Primary => "",
            Pass::RelaxedVad => "Retry (relaxed VAD): ",
            Pass::NoVad => "Retry (no VAD): ",
        }
    }
}

struct PassResult {
    segments: Vec<Segment>,
    audio_duration: f64,
}

/// Spawn the transcription worker. It sends zero or more progress messages
/// followed by exactly one terminal message, then exits.
pub fn spawn(ctx: WorkerContext) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("transcribe-worker".to_string())
        .spawn(move || run(&ctx))
}

fn run(ctx: &WorkerContext) {
    // Temporary audio is scoped to run_pipeline, so it is gone before the
    // terminal message goes out.
    let terminal = match run_pipeline(ctx) {
        Ok(segments) => {
            log::info!("transcription complete: {} segments", segments.len());
            WorkerMessage::Complete { segments }
        }
        Err(Stop::Cancelled) => {
            log::info!("transcription cancelled");
            WorkerMessage::Cancelled {
                text: CANCELLED_TEXT.to_string(),
            }
        }
        Err(Stop::Failed(text)) => WorkerMessage::Error { text },
    };
    if ctx.tx.send(terminal).is_err() {
        log::debug!("session dropped before worker finished");
    }
}

impl WorkerContext {
    fn checkpoint(&self) -> Result<(), Stop> {
        if self.cancelled.load(Ordering::Relaxed) {
            Err(Stop::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Failures observed after a cancel request are reported as cancellation.
    fn fail(&self, user_message: String, detail: &dyn std::fmt::Display) -> Stop {
        if self.cancelled.load(Ordering::Relaxed) {
            log::debug!("error after cancellation ignored: {detail}");
            return Stop::Cancelled;
        }
        log::error!("transcription failed: {detail}");
        Stop::Failed(user_message)
    }

    fn progress(&self, fraction: f64, text: impl Into<String>) {
        let _ = self.tx.send(WorkerMessage::Progress {
            fraction: fraction.clamp(0.0, 1.0),
            text: text.into(),
        });
    }
}

fn run_pipeline(ctx: &WorkerContext) -> Result<Vec<Segment>, Stop> {
    let config = &ctx.config;

    // 1. Model
    ctx.checkpoint()?;
    ctx.progress(0.0, "Loading model...");
    let compute_type = resolve_compute_type(config.device, config.compute_type);
    let model = ctx
        .models
        .load(
            &config.model,
            config.device,
            compute_type,
            config.models_dir.as_deref(),
        )
        .map_err(|e| ctx.fail(e.user_message(), &e))?;
    log::info!(
        "loaded model '{}' (device {}, compute {compute_type})",
        config.model,
        config.device
    );

    // 2. Audio
    ctx.checkpoint()?;
    let source = config.source_path.as_path();
    let extracted = if is_raw_audio(source) {
        None
    } else {
        ctx.progress(0.0, "Extracting audio...");
        Some(
            ctx.extractor
                .extract(source)
                .map_err(|e| ctx.fail(e.user_message(), &e))?,
        )
    };
    let audio_path = extracted.as_ref().map_or(source, |a| a.path());

    // 3. Optional separation; failure keeps the unseparated audio.
    ctx.checkpoint()?;
    let separated = if config.separate_vocals {
        match &ctx.separator {
            Some(separator) => {
                ctx.progress(0.05, "Separating vocals...");
                match separator.separate(audio_path) {
                    Ok(separated) => Some(separated),
                    Err(e) => {
                        log::warn!("vocal separation failed, using original audio: {e}");
                        None
                    }
                }
            }
            None => {
                log::warn!("vocal separation requested but no separator is configured");
                None
            }
        }
    } else {
        None
    };
    let audio_path = separated.as_ref().map_or(audio_path, |s| s.path());

    // 4-5. Passes
    ctx.checkpoint()?;
    run_passes(ctx, model.as_ref(), audio_path)
}

fn run_passes(
    ctx: &WorkerContext,
    model: &dyn SpeechModel,
    audio_path: &Path,
) -> Result<Vec<Segment>, Stop> {
    let config = &ctx.config;
    let vad = config.vad_parameters;

    let primary = run_pass(ctx, model, audio_path, Pass::Primary, config.vad_filter, vad)?;
    if !(config.vad_filter && config.auto_retry_on_low_recall) {
        return Ok(primary.segments);
    }

    let audio_duration = primary.audio_duration;
    let mut best_metrics = compute_recall_metrics(&primary.segments, audio_duration);
    let mut best = primary.segments;
    if !is_low_recall(audio_duration, &best_metrics) {
        return Ok(best);
    }
    log_metrics("low recall on primary pass", &best_metrics);

    let relaxed_vad = build_relaxed_vad_parameters(&vad);
    let relaxed = run_pass(ctx, model, audio_path, Pass::RelaxedVad, true, relaxed_vad)?;
    keep_better(&mut best, &mut best_metrics, relaxed, Pass::RelaxedVad);

    if !should_retry_without_vad(audio_duration, &best_metrics) {
        return Ok(best);
    }
    log_metrics("recall still low after relaxed VAD", &best_metrics);

    let unfiltered = run_pass(ctx, model, audio_path, Pass::NoVad, false, vad)?;
    keep_better(&mut best, &mut best_metrics, unfiltered, Pass::NoVad);
    Ok(best)
}

fn keep_better(
    best: &mut Vec<Segment>,
    best_metrics: &mut RecallMetrics,
    candidate: PassResult,
    pass: Pass,
) {
    let metrics = compute_recall_metrics(&candidate.segments, candidate.audio_duration);
    if is_candidate_better(best_metrics, &metrics) {
        log::info!(
            "{pass:?} pass kept: {} words vs {}",
            metrics.word_count,
            best_metrics.word_count
        );
        *best = candidate.segments;
        *best_metrics = metrics;
    } else {
        log::info!("{pass:?} pass discarded");
    }
}

fn log_metrics(context: &str, metrics: &RecallMetrics) {
    log::info!(
        "{context}: {} segments, {} words, {:.1}s speech, coverage {:.3}",
        metrics.segment_count,
        metrics.word_count,
        metrics.speech_duration,
        metrics.coverage
    );
}

fn run_pass(
    ctx: &WorkerContext,
    model: &dyn SpeechModel,
    audio_path: &Path,
    pass: Pass,
    vad_filter: bool,
    vad: VadParameters,
) -> Result<PassResult, Stop> {
    ctx.checkpoint()?;
    let prefix = pass.status_prefix();
    let options = build_transcribe_options(&ctx.config, vad_filter, vad);
    log::debug!("{pass:?} pass options: {options:?}");

    let transcription = model
        .transcribe(audio_path, &options)
        .map_err(|e| ctx.fail(e.user_message(), &e))?;
    let audio_duration = transcription.info.duration;
    if let Some(language) = &transcription.info.language {
        ctx.progress(
            PASS_PROGRESS_START,
            format!("{prefix}Detected language: {language}"),
        );
    }

    let mut segments = Vec::new();
    for item in transcription.segments {
        let mut segment = item.map_err(|e| ctx.fail(e.user_message(), &e))?;
        segment.text = segment.text.trim().to_string();
        if segment.end > segment.start {
            let end = segment.end;
            segments.push(segment);
            if audio_duration > 0.0 {
                let fraction = PASS_PROGRESS_START + (end / audio_duration) * (1.0 - PASS_PROGRESS_START);
                ctx.progress(
                    fraction.min(1.0),
                    format!("{prefix}Processing segment {}...", segments.len()),
                );
            }
        } else {
            log::debug!("dropping empty segment at {:.2}s", segment.start);
        }
        ctx.checkpoint()?;
    }

    ctx.progress(
        1.0,
        format!("{prefix}Transcription complete ({} segments)", segments.len()),
    );
    Ok(PassResult {
        segments,
        audio_duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::{
        poor_segments, rich_segments, FailingExtractor, RecordingExtractor, ScriptedProvider,
    };
    use crossbeam_channel::Receiver;
    use std::path::PathBuf;

    fn context(
        config: TranscriptionConfig,
        provider: ScriptedProvider,
    ) -> (WorkerContext, Receiver<WorkerMessage>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let ctx = WorkerContext {
            config: Arc::new(config),
            models: Arc::new(provider),
            extractor: Arc::new(RecordingExtractor::default()),
            separator: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            tx,
        };
        (ctx, rx)
    }

    fn wav_config() -> TranscriptionConfig {
        TranscriptionConfig {
            source_path: PathBuf::from("clip.wav"),
            ..Default::default()
        }
    }

    fn drain(rx: &Receiver<WorkerMessage>) -> Vec<WorkerMessage> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_terminal_message_is_last_and_unique() {
        let provider = ScriptedProvider::fixed(rich_segments(), 120.0);
        let (ctx, rx) = context(wav_config(), provider);
        run(&ctx);

        let messages = drain(&rx);
        let terminals = messages
            .iter()
            .filter(|m| m.kind().as_terminal().is_some())
            .count();
        assert_eq!(terminals, 1);
        assert!(matches!(messages.last(), Some(WorkerMessage::Complete { .. })));
    }

    #[test]
    fn test_segment_text_trimmed_and_empty_segments_dropped() {
        let segments = vec![
            Segment::new(0.0, 1.0, "  padded  "),
            Segment::new(2.0, 2.0, "empty"),
        ];
        let provider = ScriptedProvider::fixed(segments, 10.0);
        let (ctx, _rx) = context(wav_config(), provider);

        let result = run_pipeline(&ctx).unwrap();
        assert_eq!(result, vec![Segment::new(0.0, 1.0, "padded")]);
    }

    #[test]
    fn test_cancel_before_start_skips_model_load() {
        let provider = ScriptedProvider::fixed(rich_segments(), 120.0);
        let loads = provider.loads.clone();
        let (ctx, _rx) = context(wav_config(), provider);
        ctx.cancelled.store(true, Ordering::Relaxed);

        assert_eq!(run_pipeline(&ctx), Err(Stop::Cancelled));
        assert_eq!(*loads.lock().unwrap(), 0);
    }

    #[test]
    fn test_no_retry_when_auto_retry_disabled() {
        let provider = ScriptedProvider::fixed(poor_segments(), 120.0);
        let calls = provider.calls.clone();
        let config = TranscriptionConfig {
            auto_retry_on_low_recall: false,
            ..wav_config()
        };
        let (ctx, _rx) = context(config, provider);

        run_pipeline(&ctx).unwrap();
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_no_retry_when_vad_disabled() {
        let provider = ScriptedProvider::fixed(poor_segments(), 120.0);
        let calls = provider.calls.clone();
        let config = TranscriptionConfig {
            vad_filter: false,
            ..wav_config()
        };
        let (ctx, _rx) = context(config, provider);

        run_pipeline(&ctx).unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].vad_filter);
    }

    #[test]
    fn test_three_passes_when_relaxed_still_poor() {
        let provider = ScriptedProvider::new(120.0, |options| {
            if options.vad_filter {
                poor_segments()
            } else {
                rich_segments()
            }
        });
        let calls = provider.calls.clone();
        let (ctx, _rx) = context(wav_config(), provider);

        let result = run_pipeline(&ctx).unwrap();
        assert_eq!(result, rich_segments());

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].vad_filter && calls[1].vad_filter && !calls[2].vad_filter);
        let relaxed = calls[1].vad_parameters.unwrap();
        assert!(relaxed.threshold < calls[0].vad_parameters.unwrap().threshold);
    }

    #[test]
    fn test_cancel_during_relaxed_pass_skips_no_vad_pass() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let default_threshold = VadParameters::default().threshold;
        let provider = ScriptedProvider::new(120.0, move |options| {
            let relaxed = options
                .vad_parameters
                .is_some_and(|vad| vad.threshold < default_threshold);
            if relaxed {
                flag.store(true, Ordering::Relaxed);
            }
            poor_segments()
        });
        let calls = provider.calls.clone();
        let (mut ctx, rx) = context(wav_config(), provider);
        ctx.cancelled = cancelled;
        run(&ctx);

        let messages = drain(&rx);
        assert!(matches!(messages.last(), Some(WorkerMessage::Cancelled { .. })));
        assert!(!messages
            .iter()
            .any(|m| matches!(m, WorkerMessage::Complete { .. })));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.vad_filter));
    }

    #[test]
    fn test_tie_keeps_primary_pass() {
        let provider = ScriptedProvider::fixed(poor_segments(), 120.0);
        let calls = provider.calls.clone();
        let (ctx, _rx) = context(wav_config(), provider);

        let result = run_pipeline(&ctx).unwrap();
        assert_eq!(result, poor_segments());
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_extraction_failure_is_sanitized_error() {
        let provider = ScriptedProvider::fixed(rich_segments(), 120.0);
        let (mut ctx, rx) = context(
            TranscriptionConfig {
                source_path: PathBuf::from("/videos/private/clip.mp4"),
                ..Default::default()
            },
            provider,
        );
        ctx.extractor = Arc::new(FailingExtractor);
        run(&ctx);

        match drain(&rx).pop() {
            Some(WorkerMessage::Error { text }) => {
                assert!(text.starts_with("Audio extraction failed"));
                assert!(!text.contains("/videos"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_progress_reports_segments() {
        let provider = ScriptedProvider::fixed(rich_segments(), 120.0).with_language("en");
        let (ctx, rx) = context(wav_config(), provider);
        run(&ctx);

        let texts: Vec<String> = drain(&rx)
            .into_iter()
            .filter_map(|m| match m {
                WorkerMessage::Progress { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(texts[0], "Loading model...");
        assert!(texts.contains(&"Detected language: en".to_string()));
        assert!(texts.contains(&"Processing segment 1...".to_string()));
        assert_eq!(
            texts.last().map(String::as_str),
            Some("Transcription complete (15 segments)")
        );
    }
}
