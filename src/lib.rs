//! voxcast - Progressive text-to-speech streams with a word-synced transcript
//!
//! Long text is split into chunks, synthesized with bounded concurrency, and
//! published as a growing HLS playlist plus a transcript on one timeline.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod fs;
pub mod manifest;
pub mod playback;
pub mod stream;
pub mod synth;
pub mod text;
pub mod transcript;
pub mod upload;

// Core traits (synthesize → upload → record)
pub use stream::store::StreamStore;
pub use synth::Synthesizer;
pub use upload::Uploader;

// Stream workflow
pub use stream::{
    CapacityPolicy, DispatchHandle, DispatchRequest, OrchestratorOptions, StreamOrchestrator,
    StreamOutcome, StreamRecord, StreamStatus,
};

// Transcript and playback
pub use playback::{PlaybackArbiter, PlaybackIndexer, find_word_at};
pub use transcript::{TranscriptDocument, TranscriptWord};

// Error handling
pub use error::{Result, VoxcastError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_carries_hash_only_when_built_from_git() {
        let ver = version_string();
        match option_env!("GIT_HASH") {
            Some(hash) if !hash.is_empty() => {
                assert_eq!(ver, format!("{}+{}", env!("CARGO_PKG_VERSION"), hash));
            }
            _ => assert_eq!(ver, env!("CARGO_PKG_VERSION")),
        }
    }
}
