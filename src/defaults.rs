//! Default configuration constants for voxcast.
//!
//! Shared by the config layer, the orchestrator and the text chunker so the
//! same numbers are not repeated across modules.

/// Maximum number of chunks synthesized at the same time.
///
/// The bound is a resource limit on the speech backend, not a sequencing
/// guarantee; chunks still finish in any order.
pub const MAX_CONCURRENT_CHUNKS: usize = 3;

/// Target word count for the first chunk.
///
/// Kept small so the first segment is ready quickly and playback can start.
pub const FIRST_CHUNK_WORDS: usize = 150;

/// Target word count for every chunk after the first (~2-3 minutes of audio).
pub const CHUNK_WORDS: usize = 450;

/// A chunk is never closed before it holds this many words.
pub const MIN_CHUNK_WORDS: usize = 50;

/// A sentence may overshoot the target by this factor before a chunk is closed.
pub const CHUNK_OVERSHOOT: f64 = 1.2;

/// Maximum length of the diagnostic text preview stored per chunk.
pub const TEXT_PREVIEW_CHARS: usize = 100;

/// Average speaking rate used for duration estimates.
pub const WORDS_PER_MINUTE: usize = 150;

/// Transcript document schema version.
pub const TRANSCRIPT_VERSION: u32 = 1;

/// Words per rendered transcript paragraph.
pub const WORDS_PER_PARAGRAPH: usize = 50;

/// Floor for the HLS target duration, in seconds.
pub const MIN_TARGET_DURATION_SECS: f64 = 30.0;

/// Default voice for the HTTP synthesis backend.
pub const DEFAULT_VOICE: &str = "am_adam";

/// Default MP3 bitrate requested from the synthesis backend, in kbps.
pub const DEFAULT_MP3_BITRATE: u32 = 64;

/// Content type of synthesized segments.
pub const SEGMENT_CONTENT_TYPE: &str = "audio/mpeg";

/// Content type of HLS playlists.
pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Content type of transcript documents.
pub const TRANSCRIPT_CONTENT_TYPE: &str = "application/json";
