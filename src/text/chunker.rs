//! Splits long text into synthesis-sized chunks at sentence boundaries.
//!
//! The first chunk is kept short so its audio is ready quickly; later chunks
//! are larger. A chunk closes when the next sentence would push it past
//! `target * 1.2` words, but never before it holds `min_chunk_words`.

use crate::defaults;
use serde::{Deserialize, Serialize};

/// Abbreviations whose trailing period does not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "vs", "etc", "i.e", "e.g", "inc", "ltd", "co",
    "st", "ave", "blvd", "fig", "vol", "no", "pp", "ed", "al",
];

/// One chunk of input text, in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub index: u32,
    pub text: String,
    pub word_count: usize,
    pub is_first: bool,
    pub is_last: bool,
}

/// Word-count targets for chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingOptions {
    pub first_chunk_words: usize,
    pub chunk_words: usize,
    pub min_chunk_words: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            first_chunk_words: defaults::FIRST_CHUNK_WORDS,
            chunk_words: defaults::CHUNK_WORDS,
            min_chunk_words: defaults::MIN_CHUNK_WORDS,
        }
    }
}

impl ChunkingOptions {
    fn target_for(&self, index: u32) -> usize {
        if index == 0 {
            self.first_chunk_words
        } else {
            self.chunk_words
        }
    }
}

/// Splits `text` into chunks. Returns an empty list for blank input.
pub fn chunk_text(text: &str, options: &ChunkingOptions) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_words = 0usize;

    for sentence in split_sentences(text) {
        let sentence_words = count_words(&sentence);
        let limit = options.target_for(chunks.len() as u32) as f64 * defaults::CHUNK_OVERSHOOT;
        let would_exceed = (current_words + sentence_words) as f64 > limit;

        if would_exceed && current_words >= options.min_chunk_words {
            push_chunk(&mut chunks, &current, current_words);
            current.clear();
            current_words = 0;
        }

        current.push(sentence);
        current_words += sentence_words;
    }

    if !current.is_empty() {
        push_chunk(&mut chunks, &current, current_words);
    }

    if let Some(last) = chunks.last_mut() {
        last.is_last = true;
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<TextChunk>, sentences: &[String], word_count: usize) {
    let index = chunks.len() as u32;
    chunks.push(TextChunk {
        index,
        text: sentences.join(" "),
        word_count,
        is_first: index == 0,
        is_last: false,
    });
}

/// Splits text into sentences on `.`, `!` or `?` followed by whitespace.
///
/// Whitespace is collapsed to single spaces. Periods after common
/// abbreviations ("Dr.", "e.g.") do not end a sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for token in text.split_whitespace() {
        current.push(token);
        if ends_sentence(token) {
            sentences.push(current.join(" "));
            current.clear();
        }
    }

    if !current.is_empty() {
        sentences.push(current.join(" "));
    }

    sentences
}

fn ends_sentence(token: &str) -> bool {
    match token.chars().last() {
        Some('!' | '?') => true,
        Some('.') => !is_abbreviation(&token[..token.len() - 1]),
        _ => false,
    }
}

fn is_abbreviation(stem: &str) -> bool {
    let stem = stem.trim_start_matches(|c: char| !c.is_alphanumeric());
    ABBREVIATIONS
        .iter()
        .any(|abbr| stem.eq_ignore_ascii_case(abbr))
}

/// Counts whitespace-separated words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Truncates `text` to at most `max_chars` characters, ending in "..." when cut.
pub fn text_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut preview: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    preview.push_str("...");
    preview
}

/// Rough narration length for `word_count` words, in whole seconds.
pub fn estimate_duration_seconds(word_count: usize) -> u64 {
    (word_count * 60).div_ceil(defaults::WORDS_PER_MINUTE) as u64
}

/// Rough narration length for a chunked text, in whole seconds.
pub fn estimate_total_duration(chunks: &[TextChunk]) -> u64 {
    estimate_duration_seconds(chunks.iter().map(|c| c.word_count).sum())
}
