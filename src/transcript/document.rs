//! Transcript document consumed by players.
//!
//! ```json
//! { "version": 1, "title": "...",
//!   "words": [{ "text": "Hello", "start_ts": 0.0, "end_ts": 0.45 }],
//!   "chapters": [{ "title": "Intro", "start_ts": 0.0, "word_index": 0 }] }
//! ```

use crate::defaults;
use crate::error::Result;
use crate::transcript::{Chapter, ChapterMarker, TranscriptWord, map_chapters};
use serde::{Deserialize, Serialize};

/// Versioned transcript with words and chapters on the global timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptDocument {
    pub version: u32,
    pub title: String,
    pub words: Vec<TranscriptWord>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl TranscriptDocument {
    /// Builds a document, mapping heading markers onto the words.
    pub fn build(
        title: impl Into<String>,
        words: Vec<TranscriptWord>,
        markers: &[ChapterMarker],
    ) -> Result<Self> {
        let chapters = map_chapters(markers, &words)?;
        Ok(Self {
            version: defaults::TRANSCRIPT_VERSION,
            title: title.into(),
            words,
            chapters,
        })
    }

    /// End time of the last word, or 0.0 for an empty transcript.
    pub fn duration_seconds(&self) -> f64 {
        self.words.last().map(|w| w.end_ts).unwrap_or(0.0)
    }

    /// Returns true if every word has `start_ts <= end_ts` and no word starts
    /// before the previous one ends.
    pub fn is_monotonic(&self) -> bool {
        self.words.iter().all(|w| w.start_ts <= w.end_ts)
            && self
                .words
                .windows(2)
                .all(|pair| pair[0].end_ts <= pair[1].start_ts)
    }

    /// Serialize the document to a JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a document from a JSON string.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
