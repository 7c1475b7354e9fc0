//! Client-side playback helpers: active-word lookup, transcript paragraphs,
//! and single-owner playback.

pub mod exclusive;
pub mod indexer;

pub use exclusive::{PlaybackArbiter, PlaybackLease, SlotOwner};
pub use indexer::{
    PlaybackCursor, PlaybackIndexer, TranscriptBlock, build_paragraphs, find_word_at,
};
