//! Stitcher for merging per-chunk word timings into one global timeline.
//!
//! Chunks are synthesized concurrently and complete in any order, but their
//! words must be laid end to end in chunk-index order. The stitcher buffers
//! early arrivals and applies each chunk once every lower index is applied.
//!
//! Each chunk is offset by the global end time of the previous chunk's last
//! word, not by the previous chunk's reported audio duration. Trailing silence
//! after the last word is therefore not counted, and chapter and seek math
//! downstream relies on that.

use crate::error::{Result, VoxcastError};
use crate::transcript::TranscriptWord;
use std::collections::BTreeMap;

/// Stitcher that lays chunk-local word timings onto the global timeline.
#[derive(Debug, Default)]
pub struct TranscriptStitcher {
    /// Early arrivals indexed by chunk index.
    pending: BTreeMap<u32, Vec<TranscriptWord>>,
    /// Next chunk index to apply.
    next_index: u32,
    /// Global end time of the last applied word.
    cumulative_time: f64,
    /// Global word list, in index order.
    words: Vec<TranscriptWord>,
}

impl TranscriptStitcher {
    /// Creates an empty stitcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a chunk's local words and applies every chunk that is now in order.
    ///
    /// Returns the number of chunks applied by this call (0 when the chunk was
    /// buffered behind a missing lower index).
    pub fn append(&mut self, chunk_index: u32, local_words: Vec<TranscriptWord>) -> Result<usize> {
        if chunk_index < self.next_index || self.pending.contains_key(&chunk_index) {
            return Err(VoxcastError::DuplicateChunk { index: chunk_index });
        }
        self.pending.insert(chunk_index, local_words);

        let mut applied = 0;
        while let Some(local) = self.pending.remove(&self.next_index) {
            self.apply(local);
            self.next_index += 1;
            applied += 1;
        }
        Ok(applied)
    }

    fn apply(&mut self, local: Vec<TranscriptWord>) {
        let offset = self.cumulative_time;
        let start = self.words.len();
        self.words.extend(local.iter().map(|w| w.shifted(offset)));

        // A chunk with no words leaves the offset where it was
        if let Some(last) = self.words[start..].last() {
            self.cumulative_time = last.end_ts;
        }
    }

    /// Global words applied so far.
    pub fn words(&self) -> &[TranscriptWord] {
        &self.words
    }

    /// Consumes the stitcher and returns the global word list.
    pub fn into_words(self) -> Vec<TranscriptWord> {
        self.words
    }

    /// End time of the last applied word, in seconds.
    pub fn cumulative_time(&self) -> f64 {
        self.cumulative_time
    }

    /// Number of chunks applied to the timeline.
    pub fn applied_chunks(&self) -> u32 {
        self.next_index
    }

    /// Number of chunks buffered behind a missing lower index.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Resets the stitcher state.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.next_index = 0;
        self.cumulative_time = 0.0;
        self.words.clear();
    }
}
