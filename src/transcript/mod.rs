//! Word-timed transcripts on a single global timeline.
//!
//! ```text
//! chunk 0 words ─┐
//! chunk 2 words ─┼──▶ Stitcher (reorder buffer) ──▶ global words ──▶ Chapter mapper ──▶ document
//! chunk 1 words ─┘        applies in index order
//! ```

pub mod chapters;
pub mod document;
pub mod stitcher;

pub use chapters::{locate_headings, map_chapters};
pub use document::TranscriptDocument;
pub use stitcher::TranscriptStitcher;

use serde::{Deserialize, Serialize};

/// One spoken word with its timing in seconds.
///
/// Inside a chunk the timings are local to that chunk's audio; after stitching
/// they are on the stream's global timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptWord {
    pub text: String,
    pub start_ts: f64,
    pub end_ts: f64,
}

impl TranscriptWord {
    pub fn new(text: impl Into<String>, start_ts: f64, end_ts: f64) -> Self {
        Self {
            text: text.into(),
            start_ts,
            end_ts,
        }
    }

    /// Returns this word moved forward by `offset` seconds.
    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            text: self.text.clone(),
            start_ts: offset + self.start_ts,
            end_ts: offset + self.end_ts,
        }
    }

    /// Returns true if `position` falls inside `[start_ts, end_ts)`.
    pub fn contains(&self, position: f64) -> bool {
        position >= self.start_ts && position < self.end_ts
    }
}

/// A navigable point in the transcript, derived from a heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub start_ts: f64,
    pub word_index: usize,
}

/// A heading position in the flattened document text, before mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterMarker {
    pub title: String,
    pub char_index: usize,
}

impl ChapterMarker {
    pub fn new(title: impl Into<String>, char_index: usize) -> Self {
        Self {
            title: title.into(),
            char_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shifted_moves_both_bounds() {
        let word = TranscriptWord::new("how", 0.0, 0.3);
        let shifted = word.shifted(0.92);
        assert_eq!(shifted.text, "how");
        assert!((shifted.start_ts - 0.92).abs() < 1e-9);
        assert!((shifted.end_ts - 1.22).abs() < 1e-9);
    }

    #[test]
    fn test_contains_is_half_open() {
        let word = TranscriptWord::new("world", 1.0, 2.0);
        assert!(word.contains(1.0));
        assert!(word.contains(1.999));
        assert!(!word.contains(2.0));
        assert!(!word.contains(0.5));
    }

    #[test]
    fn test_word_serializes_with_snake_case_fields() {
        let word = TranscriptWord::new("Hello", 0.0, 0.45);
        let json = serde_json::to_value(&word).unwrap();
        assert_eq!(json["text"], "Hello");
        assert_eq!(json["start_ts"], 0.0);
        assert_eq!(json["end_ts"], 0.45);
    }
}
