//! Chapter mapping from heading positions to transcript words.
//!
//! Headings are located by character offset in the flattened document text.
//! Each word of the transcript occupies its own length plus one separating
//! space, so walking the words accumulates the offset at which every word
//! starts. A chapter lands on the first word starting at or after its heading.

use crate::error::{Result, VoxcastError};
use crate::transcript::{Chapter, ChapterMarker, TranscriptWord};

/// Maps heading markers onto word indices and timestamps.
///
/// Markers must be sorted by `char_index`. Both lists are sorted by position,
/// so a single forward pass over the words serves every chapter. Markers past
/// the end of the transcript land on the last word; an empty transcript yields
/// no chapters.
pub fn map_chapters(markers: &[ChapterMarker], words: &[TranscriptWord]) -> Result<Vec<Chapter>> {
    if let Some(pair) = markers
        .windows(2)
        .find(|pair| pair[1].char_index < pair[0].char_index)
    {
        return Err(VoxcastError::InvalidChapters {
            message: format!(
                "markers must be sorted by position: '{}' at {} follows '{}' at {}",
                pair[1].title, pair[1].char_index, pair[0].title, pair[0].char_index
            ),
        });
    }

    let Some(last_index) = words.len().checked_sub(1) else {
        return Ok(Vec::new());
    };

    let mut chapters = Vec::with_capacity(markers.len());
    let mut word_index = 0;
    // Character offset at which `words[word_index]` starts
    let mut word_offset = 0;

    for marker in markers {
        while word_index < words.len() && word_offset < marker.char_index {
            word_offset += words[word_index].text.chars().count() + 1;
            word_index += 1;
        }

        let target = word_index.min(last_index);
        chapters.push(Chapter {
            title: marker.title.clone(),
            start_ts: words[target].start_ts,
            word_index: target,
        });
    }

    Ok(chapters)
}

/// Finds each heading's first occurrence in the flattened text.
///
/// Headings that are blank or missing from the text are dropped. The result
/// is sorted by position, ready for [`map_chapters`]. Offsets are counted in
/// characters, matching the word walk in [`map_chapters`].
pub fn locate_headings<S: AsRef<str>>(text: &str, titles: &[S]) -> Vec<ChapterMarker> {
    let mut markers: Vec<ChapterMarker> = titles
        .iter()
        .filter_map(|title| {
            let title = title.as_ref().trim();
            if title.is_empty() {
                return None;
            }
            text.find(title).map(|byte_offset| {
                ChapterMarker::new(title, text[..byte_offset].chars().count())
            })
        })
        .collect();

    markers.sort_by_key(|m| m.char_index);
    markers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_words() -> Vec<TranscriptWord> {
        vec![
            TranscriptWord::new("Hello", 0.0, 0.45),
            TranscriptWord::new("world", 0.45, 0.9),
            TranscriptWord::new("Introduction", 0.9, 1.5),
            TranscriptWord::new("content", 1.5, 2.0),
            TranscriptWord::new("here", 2.0, 2.3),
        ]
    }

    #[test]
    fn test_maps_heading_to_first_word_at_offset() {
        let markers = vec![ChapterMarker::new("Introduction", 12)];
        let chapters = map_chapters(&markers, &sample_words()).unwrap();

        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Introduction");
        assert_eq!(chapters[0].word_index, 2);
        assert_eq!(chapters[0].start_ts, 0.9);
    }

    #[test]
    fn test_heading_at_start_maps_to_first_word() {
        let markers = vec![ChapterMarker::new("Hello", 0)];
        let chapters = map_chapters(&markers, &sample_words()).unwrap();

        assert_eq!(chapters[0].word_index, 0);
        assert_eq!(chapters[0].start_ts, 0.0);
    }

    #[test]
    fn test_offset_inside_word_maps_to_next_word() {
        // Offset 3 is inside "Hello"; the next word starting at or after it is "world"
        let markers = vec![ChapterMarker::new("lo", 3)];
        let chapters = map_chapters(&markers, &sample_words()).unwrap();

        assert_eq!(chapters[0].word_index, 1);
    }

    #[test]
    fn test_multiple_chapters_in_one_pass() {
        let markers = vec![
            ChapterMarker::new("Start", 0),
            ChapterMarker::new("Introduction", 12),
            ChapterMarker::new("Body", 25),
        ];
        let chapters = map_chapters(&markers, &sample_words()).unwrap();

        let indices: Vec<usize> = chapters.iter().map(|c| c.word_index).collect();
        assert_eq!(indices, vec![0, 2, 3]);
        assert_eq!(chapters[2].start_ts, 1.5);
    }

    #[test]
    fn test_chapter_past_end_maps_to_last_word() {
        let markers = vec![ChapterMarker::new("Appendix", 10_000)];
        let chapters = map_chapters(&markers, &sample_words()).unwrap();

        assert_eq!(chapters[0].word_index, 4);
        assert_eq!(chapters[0].start_ts, 2.0);
    }

    #[test]
    fn test_mapped_word_offset_is_not_before_heading() {
        let words = sample_words();
        let markers: Vec<ChapterMarker> = (0..40)
            .map(|offset| ChapterMarker::new(format!("h{}", offset), offset))
            .collect();
        let chapters = map_chapters(&markers, &words).unwrap();

        let offset_of = |index: usize| -> usize {
            words[..index]
                .iter()
                .map(|w| w.text.chars().count() + 1)
                .sum()
        };
        let last_start = offset_of(words.len() - 1);

        for (marker, chapter) in markers.iter().zip(&chapters) {
            let word_offset = offset_of(chapter.word_index);
            if marker.char_index <= last_start {
                assert!(
                    word_offset >= marker.char_index,
                    "chapter at {} mapped to word at {}",
                    marker.char_index,
                    word_offset
                );
            } else {
                assert_eq!(chapter.word_index, words.len() - 1);
            }
        }
    }

    #[test]
    fn test_empty_transcript_yields_no_chapters() {
        let markers = vec![ChapterMarker::new("Intro", 0)];
        assert!(map_chapters(&markers, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_unsorted_markers_rejected() {
        let markers = vec![
            ChapterMarker::new("Later", 20),
            ChapterMarker::new("Earlier", 5),
        ];
        let result = map_chapters(&markers, &sample_words());
        assert!(matches!(result, Err(VoxcastError::InvalidChapters { .. })));
    }

    #[test]
    fn test_locate_headings_sorts_and_drops_missing() {
        let text = "Introduction Some intro text here. Main Topic Main content goes here.";
        let markers = locate_headings(text, &["Main Topic", "Missing Heading", "Introduction", "  "]);

        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0], ChapterMarker::new("Introduction", 0));
        assert_eq!(markers[1], ChapterMarker::new("Main Topic", 35));
    }

    #[test]
    fn test_locate_headings_counts_characters_not_bytes() {
        let text = "Café au lait. Chapter Two follows.";
        let markers = locate_headings(text, &["Chapter Two"]);

        assert_eq!(markers[0].char_index, 14);
    }
}
