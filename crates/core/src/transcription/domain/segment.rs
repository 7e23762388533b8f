use serde::{Deserialize, Serialize};

/// A single recognized word with its own timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// A unit of recognized speech. Times are in seconds from the start of the
/// transcribed audio.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<Word>>,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            words: None,
        }
    }

    pub fn with_words(mut self, words: Vec<Word>) -> Self {
        self.words = Some(words);
        self
    }

    /// Length in seconds; zero for malformed segments.
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Whitespace-delimited word count of the text.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Word timings, if present and non-empty.
    pub fn timed_words(&self) -> Option<&[Word]> {
        self.words.as_deref().filter(|w| !w.is_empty())
    }
}
