//! Word lookup and seek for a transcript that follows playback.
//!
//! Transcripts run to many thousands of words and the play-head moves several
//! times per second, so the active word is found by binary search.

use crate::defaults;
use crate::transcript::{Chapter, TranscriptDocument, TranscriptWord};

/// Finds the word being spoken at `position` seconds.
///
/// Words are sorted, non-overlapping `[start_ts, end_ts)` intervals.
/// Before the first word resolves to 0; at or past the last word's end
/// resolves to the last index; a position in a gap between two words resolves
/// to the next word. Returns `None` only for an empty transcript.
pub fn find_word_at(words: &[TranscriptWord], position: f64) -> Option<usize> {
    let (first, last) = (words.first()?, words.last()?);
    let last_index = words.len() - 1;

    if position < first.start_ts {
        return Some(0);
    }
    if position >= last.end_ts {
        return Some(last_index);
    }

    let mut left = 0usize;
    let mut right = words.len();
    while left < right {
        let mid = left + (right - left) / 2;
        let word = &words[mid];
        if word.contains(position) {
            return Some(mid);
        } else if position < word.start_ts {
            right = mid;
        } else {
            left = mid + 1;
        }
    }

    // Landed in a gap: `left` is the first word starting after `position`
    Some(left.min(last_index))
}

/// One block of the rendered transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptBlock {
    /// Chapter header shown before the word at `word_index`.
    Chapter { title: String, word_index: usize },
    /// A run of consecutive words starting at `first_word`.
    Paragraph { first_word: usize, word_count: usize },
}

impl TranscriptBlock {
    /// Returns true if this paragraph holds the word at `word_index`.
    pub fn holds_word(&self, word_index: usize) -> bool {
        match self {
            TranscriptBlock::Paragraph {
                first_word,
                word_count,
            } => word_index >= *first_word && word_index < first_word + word_count,
            TranscriptBlock::Chapter { .. } => false,
        }
    }
}

/// Splits the transcript into render blocks of at most `words_per_paragraph`
/// words, breaking early at chapter boundaries and emitting a chapter header
/// before the chapter's first word.
///
/// Segmentation only bounds render cost; word lookup does not depend on it.
pub fn build_paragraphs(
    word_count: usize,
    chapters: &[Chapter],
    words_per_paragraph: usize,
) -> Vec<TranscriptBlock> {
    let per_paragraph = words_per_paragraph.max(1);
    let mut sorted: Vec<&Chapter> = chapters.iter().collect();
    sorted.sort_by_key(|c| c.word_index);

    let mut blocks = Vec::new();
    let mut word_index = 0;
    let mut next_chapter = 0;

    while word_index < word_count {
        if let Some(chapter) = sorted.get(next_chapter)
            && chapter.word_index <= word_index
        {
            blocks.push(TranscriptBlock::Chapter {
                title: chapter.title.clone(),
                word_index,
            });
            next_chapter += 1;
            continue;
        }

        let boundary = sorted
            .get(next_chapter)
            .map(|c| c.word_index)
            .unwrap_or(word_count);
        let end = (word_index + per_paragraph).min(boundary).min(word_count);

        blocks.push(TranscriptBlock::Paragraph {
            first_word: word_index,
            word_count: end - word_index,
        });
        word_index = end;
    }

    blocks
}

/// What the renderer should do after a play-head update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackCursor {
    /// Active word index.
    pub word_index: usize,
    /// Block to scroll into view, set only when the active word moved into
    /// a different paragraph.
    pub scroll_to_block: Option<usize>,
}

/// Tracks the active word of a transcript as playback advances.
#[derive(Debug, Clone)]
pub struct PlaybackIndexer {
    document: TranscriptDocument,
    blocks: Vec<TranscriptBlock>,
    last_scrolled_block: Option<usize>,
}

impl PlaybackIndexer {
    /// Creates an indexer with the default paragraph size.
    pub fn new(document: TranscriptDocument) -> Self {
        Self::with_paragraph_size(document, defaults::WORDS_PER_PARAGRAPH)
    }

    /// Creates an indexer with a custom paragraph size.
    pub fn with_paragraph_size(document: TranscriptDocument, words_per_paragraph: usize) -> Self {
        let blocks = build_paragraphs(
            document.words.len(),
            &document.chapters,
            words_per_paragraph,
        );
        Self {
            document,
            blocks,
            last_scrolled_block: None,
        }
    }

    /// Render blocks for the transcript.
    pub fn blocks(&self) -> &[TranscriptBlock] {
        &self.blocks
    }

    pub fn document(&self) -> &TranscriptDocument {
        &self.document
    }

    /// Active word at `position` seconds.
    pub fn word_at(&self, position: f64) -> Option<usize> {
        find_word_at(&self.document.words, position)
    }

    /// Updates the cursor for a new play-head position.
    pub fn on_position(&mut self, position: f64) -> Option<PlaybackCursor> {
        let word_index = self.word_at(position)?;
        let block = self.block_of_word(word_index);

        let scroll_to_block = match block {
            Some(b) if self.last_scrolled_block != Some(b) => {
                self.last_scrolled_block = Some(b);
                Some(b)
            }
            _ => None,
        };

        Some(PlaybackCursor {
            word_index,
            scroll_to_block,
        })
    }

    /// Index of the paragraph block holding `word_index`.
    ///
    /// Blocks are in word order, so the paragraph is found by binary search
    /// over the paragraph start indices.
    pub fn block_of_word(&self, word_index: usize) -> Option<usize> {
        let position = self.blocks.partition_point(|block| match block {
            TranscriptBlock::Paragraph { first_word, .. } => *first_word <= word_index,
            TranscriptBlock::Chapter {
                word_index: start, ..
            } => *start <= word_index,
        });
        self.blocks[..position]
            .iter()
            .rposition(|block| block.holds_word(word_index))
    }

    /// Timestamp to seek to when a word is tapped.
    pub fn seek_to_word(&self, word_index: usize) -> Option<f64> {
        self.document.words.get(word_index).map(|w| w.start_ts)
    }

    /// Timestamp to seek to when a chapter is selected.
    pub fn seek_to_chapter(&self, chapter_index: usize) -> Option<f64> {
        self.document.chapters.get(chapter_index).map(|c| c.start_ts)
    }

    /// Chapter containing the word at `word_index`, if any.
    pub fn chapter_of_word(&self, word_index: usize) -> Option<&Chapter> {
        self.document
            .chapters
            .iter()
            .filter(|c| c.word_index <= word_index)
            .max_by_key(|c| c.word_index)
    }
}
