//! Turns raw model segments into display units: clipping to the requested
//! window and splitting long segments into bounded word groups.

use super::segment::{Segment, Word};

/// Shortest display unit produced when word timings collapse to a point.
const MIN_UNIT_SECONDS: f64 = 0.01;

/// Clip segments to `[window_start, window_end]` and rebase times to the
/// window start. An empty or inverted window leaves the input untouched.
///
/// Segments with word timings keep only the words that overlap the window,
/// and their text is rebuilt from those words; a segment with no word left in
/// the window is dropped.
pub fn trim_to_window(segments: &[Segment], window_start: f64, window_end: f64) -> Vec<Segment> {
    if window_end <= window_start {
        return segments.to_vec();
    }

    segments
        .iter()
        .filter_map(|seg| {
            let start = seg.start.max(window_start);
            let end = seg.end.min(window_end);
            if end <= start {
                return None;
            }
            let rebase = |t: f64| t - window_start;

            let Some(words) = seg.timed_words() else {
                return Some(Segment {
                    start: rebase(start),
                    end: rebase(end),
                    text: seg.text.clone(),
                    words: seg.words.clone(),
                });
            };

            let kept: Vec<Word> = words
                .iter()
                .filter_map(|w| {
                    let ws = w.start.max(window_start);
                    let we = w.end.min(window_end);
                    (we > ws).then(|| Word {
                        text: w.text.clone(),
                        start: rebase(ws),
                        end: rebase(we),
                    })
                })
                .collect();
            if kept.is_empty() {
                return None;
            }
            Some(Segment {
                start: rebase(start),
                end: rebase(end),
                text: join_words(&kept),
                words: Some(kept),
            })
        })
        .collect()
}

/// Break segments with more than `max_words` words into consecutive units.
///
/// With word timings each unit spans its first to last word; otherwise the
/// segment's time is shared out linearly by word index. Chunk texts joined
/// with single spaces give back the segment's words in order. `0` disables
/// splitting.
pub fn split_by_max_words(segments: &[Segment], max_words: usize) -> Vec<Segment> {
    if max_words == 0 {
        return segments.to_vec();
    }

    let mut out = Vec::with_capacity(segments.len());
    for seg in segments {
        // Word timings that do not spell out the text would lose words.
        let timed = seg.timed_words().filter(|words| words_cover_text(seg, words));
        match timed {
            Some(words) if words.len() > max_words => {
                out.extend(split_timed(seg, words, max_words));
            }
            Some(_) => out.push(seg.clone()),
            None if seg.word_count() > max_words => {
                out.extend(split_interpolated(seg, max_words));
            }
            None => out.push(seg.clone()),
        }
    }
    out
}

fn words_cover_text(seg: &Segment, words: &[Word]) -> bool {
    words
        .iter()
        .flat_map(|w| w.text.split_whitespace())
        .eq(seg.text.split_whitespace())
}

fn join_words(words: &[Word]) -> String {
    words
        .iter()
        .map(|w| w.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn split_timed(seg: &Segment, words: &[Word], max_words: usize) -> Vec<Segment> {
    let chunks: Vec<&[Word]> = words.chunks(max_words).collect();
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            // chunks() never yields an empty slice
            let start = chunk[0].start;
            let mut end = chunk[chunk.len() - 1].end;
            if end <= start {
                // Zero-length word timings: stretch up to the next unit.
                let next_start = chunks.get(i + 1).map_or(seg.end, |next| next[0].start);
                end = if next_start > start {
                    next_start
                } else {
                    start + MIN_UNIT_SECONDS
                };
            }
            Segment {
                start,
                end,
                text: join_words(chunk),
                words: Some(chunk.to_vec()),
            }
        })
        .collect()
}

fn split_interpolated(seg: &Segment, max_words: usize) -> Vec<Segment> {
    let tokens: Vec<&str> = seg.text.split_whitespace().collect();
    let total = tokens.len() as f64;
    let duration = seg.end - seg.start;

    tokens
        .chunks(max_words)
        .enumerate()
        .map(|(i, chunk)| {
            let first = (i * max_words) as f64;
            let last = first + chunk.len() as f64;
            Segment {
                start: seg.start + duration * first / total,
                end: seg.start + duration * last / total,
                text: chunk.join(" "),
                words: None,
            }
        })
        .collect()
}
