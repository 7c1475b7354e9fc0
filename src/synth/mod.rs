//! Speech synthesis backends.
//!
//! A [`Synthesizer`] turns one chunk of text into encoded audio plus word
//! timings relative to the start of that audio. Backends do not retry; a
//! failure is reported on the chunk by the orchestrator.

#[cfg(feature = "http")]
pub mod http;
pub mod mock;

#[cfg(feature = "http")]
pub use http::HttpSynthesizer;
pub use mock::MockSynthesizer;

use crate::error::Result;
use crate::transcript::TranscriptWord;
use async_trait::async_trait;
use std::sync::Arc;

/// Audio and timings for one synthesized chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOutput {
    /// Encoded audio (MP3 for the HTTP backend).
    pub audio: Vec<u8>,
    /// Word timings local to this chunk, starting near 0.0.
    pub words: Vec<TranscriptWord>,
    /// Length of the audio in seconds as reported by the backend.
    pub duration_seconds: f64,
}

/// Trait for text-to-speech synthesis.
///
/// This trait allows swapping implementations (remote endpoint vs mock).
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into audio with word timings.
    async fn synthesize(&self, text: &str) -> Result<SynthesisOutput>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

/// Implement Synthesizer for Arc<T> to allow sharing across streams.
#[async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    async fn synthesize(&self, text: &str) -> Result<SynthesisOutput> {
        (**self).synthesize(text).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
