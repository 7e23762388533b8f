//! Heuristics deciding whether a transcription pass captured enough speech
//! and, if not, how to retry.

use super::segment::Segment;
use super::transcription_config::VadParameters;
use crate::shared::constants::{
    LOW_RECALL_COVERAGE, NO_VAD_RETRY_COVERAGE, RECALL_MIN_AUDIO_SECONDS, RECALL_MIN_SEGMENTS,
    RECALL_MIN_WORDS, RELAXED_MIN_SILENCE_MS, RELAXED_MIN_SPEECH_MS, RELAXED_PAD_CEILING_MS,
    RELAXED_PAD_STEP_MS, RELAXED_THRESHOLD_FLOOR, RELAXED_THRESHOLD_STEP,
};

/// Aggregate recall signals for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RecallMetrics {
    pub segment_count: usize,
    pub speech_duration: f64,
    pub word_count: usize,
    pub coverage: f64,
}

pub fn compute_recall_metrics(segments: &[Segment], audio_duration: f64) -> RecallMetrics {
    let speech_duration: f64 = segments.iter().map(Segment::duration).sum();
    let word_count = segments.iter().map(Segment::word_count).sum();
    let coverage = if audio_duration > 0.0 {
        speech_duration / audio_duration.max(0.001)
    } else {
        0.0
    };
    RecallMetrics {
        segment_count: segments.len(),
        speech_duration,
        word_count,
        coverage,
    }
}

fn under_captured(audio_duration: f64, metrics: &RecallMetrics, min_coverage: f64) -> bool {
    if audio_duration < RECALL_MIN_AUDIO_SECONDS {
        return false;
    }
    metrics.segment_count < RECALL_MIN_SEGMENTS
        || metrics.word_count < RECALL_MIN_WORDS
        || metrics.coverage < min_coverage
}

/// Whether a VAD pass likely dropped too much speech.
pub fn is_low_recall(audio_duration: f64, metrics: &RecallMetrics) -> bool {
    under_captured(audio_duration, metrics, LOW_RECALL_COVERAGE)
}

/// Whether the relaxed-VAD result is still poor enough to justify a pass
/// with VAD disabled.
pub fn should_retry_without_vad(audio_duration: f64, metrics: &RecallMetrics) -> bool {
    under_captured(audio_duration, metrics, NO_VAD_RETRY_COVERAGE)
}

/// Parameters for the second, more permissive VAD pass.
pub fn build_relaxed_vad_parameters(original: &VadParameters) -> VadParameters {
    VadParameters {
        threshold: (original.threshold - RELAXED_THRESHOLD_STEP).max(RELAXED_THRESHOLD_FLOOR),
        min_speech_ms: original.min_speech_ms.min(RELAXED_MIN_SPEECH_MS),
        min_silence_ms: original.min_silence_ms.min(RELAXED_MIN_SILENCE_MS),
        max_speech_s: original.max_speech_s,
        speech_pad_ms: (original.speech_pad_ms + RELAXED_PAD_STEP_MS).min(RELAXED_PAD_CEILING_MS),
    }
}

/// Ties keep the baseline.
pub fn is_candidate_better(baseline: &RecallMetrics, candidate: &RecallMetrics) -> bool {
    candidate.word_count > baseline.word_count
        || candidate.speech_duration > baseline.speech_duration
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn metrics(segment_count: usize, word_count: usize, speech_duration: f64) -> RecallMetrics {
        RecallMetrics {
            segment_count,
            speech_duration,
            word_count,
            coverage: speech_duration / 120.0,
        }
    }

    #[test]
    fn test_compute_recall_metrics() {
        let segments = vec![
            Segment::new(0.0, 1.0, "one two"),
            Segment::new(1.0, 3.0, "three"),
        ];
        let m = compute_recall_metrics(&segments, 10.0);
        assert_eq!(m.segment_count, 2);
        assert_eq!(m.word_count, 3);
        assert_relative_eq!(m.speech_duration, 3.0);
        assert_relative_eq!(m.coverage, 0.3);
    }

    #[test]
    fn test_compute_recall_metrics_zero_duration_has_no_coverage() {
        let m = compute_recall_metrics(&[Segment::new(0.0, 2.0, "a b")], 0.0);
        assert_eq!(m.coverage, 0.0);
        assert_relative_eq!(m.speech_duration, 2.0);
    }

    #[test]
    fn test_compute_recall_metrics_empty() {
        assert_eq!(compute_recall_metrics(&[], 60.0), RecallMetrics::default());
    }

    #[rstest]
    #[case::empty(RecallMetrics::default())]
    #[case::poor(metrics(1, 1, 0.4))]
    #[case::rich(metrics(50, 500, 100.0))]
    fn test_short_audio_never_low_recall(#[case] m: RecallMetrics) {
        assert!(!is_low_recall(30.0, &m));
        assert!(!should_retry_without_vad(30.0, &m));
    }

    #[test]
    fn test_low_recall_thresholds_and_retry_without_vad() {
        let low = compute_recall_metrics(&[Segment::new(0.0, 0.4, "few")], 120.0);
        assert!(is_low_recall(120.0, &low));
        assert!(should_retry_without_vad(120.0, &low));
    }

    #[rstest]
    #[case::few_segments(metrics(7, 100, 60.0), true)]
    #[case::few_words(metrics(20, 24, 60.0), true)]
    #[case::enough(metrics(8, 25, 60.0), false)]
    fn test_is_low_recall_counts(#[case] m: RecallMetrics, #[case] expected: bool) {
        assert_eq!(is_low_recall(120.0, &m), expected);
    }

    #[test]
    fn test_coverage_band_between_retry_thresholds() {
        // 3s over 120s = 0.025: low recall, but not bad enough to drop VAD.
        let m = metrics(10, 40, 3.0);
        assert!(is_low_recall(120.0, &m));
        assert!(!should_retry_without_vad(120.0, &m));
    }

    #[test]
    fn test_build_relaxed_vad_parameters() {
        let params = build_relaxed_vad_parameters(&VadParameters {
            threshold: 0.5,
            min_speech_ms: 140,
            min_silence_ms: 900,
            max_speech_s: 18.0,
            speech_pad_ms: 400,
        });
        assert_relative_eq!(params.threshold, 0.4, epsilon = 1e-6);
        assert_eq!(params.min_speech_ms, 80);
        assert_eq!(params.min_silence_ms, 350);
        assert_eq!(params.max_speech_s, 18.0);
        assert_eq!(params.speech_pad_ms, 600);
    }

    #[test]
    fn test_build_relaxed_vad_parameters_respects_bounds() {
        let params = build_relaxed_vad_parameters(&VadParameters {
            threshold: 0.2,
            min_speech_ms: 50,
            min_silence_ms: 100,
            max_speech_s: 15.0,
            speech_pad_ms: 800,
        });
        assert_relative_eq!(params.threshold, 0.18, epsilon = 1e-6);
        assert_eq!(params.min_speech_ms, 50);
        assert_eq!(params.min_silence_ms, 100);
        assert_eq!(params.speech_pad_ms, 900);
    }

    #[test]
    fn test_candidate_comparison_prefers_more_words_or_duration() {
        let base = compute_recall_metrics(&[Segment::new(0.0, 1.0, "one")], 60.0);
        let better = compute_recall_metrics(&[Segment::new(0.0, 2.0, "one two")], 60.0);
        assert!(is_candidate_better(&base, &better));
        assert!(!is_candidate_better(&better, &base));
    }

    #[test]
    fn test_candidate_tie_keeps_baseline() {
        let base = RecallMetrics {
            segment_count: 3,
            speech_duration: 5.0,
            word_count: 10,
            coverage: 0.1,
        };
        let candidate = RecallMetrics {
            segment_count: 9,
            ..base
        };
        assert!(!is_candidate_better(&base, &candidate));
    }
}
