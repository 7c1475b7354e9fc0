//! Text preparation ahead of synthesis.

pub mod chunker;

use sha2::{Digest, Sha256};

pub use chunker::{
    ChunkingOptions, TextChunk, chunk_text, count_words, estimate_duration_seconds,
    estimate_total_duration, split_sentences, text_preview,
};

/// Identity of a source text: hex SHA-256 over its whitespace-normalized words.
///
/// Reflowed copies of the same text hash the same.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    for (i, word) in text.split_whitespace().enumerate() {
        if i > 0 {
            hasher.update(b" ");
        }
        hasher.update(word.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
