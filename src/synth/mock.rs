use crate::error::{Result, VoxcastError};
use crate::synth::{SynthesisOutput, Synthesizer};
use crate::transcript::TranscriptWord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Mock synthesizer for testing.
///
/// Every whitespace-separated word becomes one timed word of `word_seconds`,
/// back to back from 0.0. The reported duration adds `trailing_silence` after
/// the last word. Delays and failures can be attached to specific texts to
/// force out-of-order completion or chunk failures.
#[derive(Debug)]
pub struct MockSynthesizer {
    word_seconds: f64,
    trailing_silence: f64,
    default_delay: Duration,
    delays: HashMap<String, Duration>,
    failures: HashMap<String, String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockSynthesizer {
    /// Create a new mock with 0.3s words and no delays
    pub fn new() -> Self {
        Self {
            word_seconds: 0.3,
            trailing_silence: 0.0,
            default_delay: Duration::ZERO,
            delays: HashMap::new(),
            failures: HashMap::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_word_seconds(mut self, seconds: f64) -> Self {
        self.word_seconds = seconds;
        self
    }

    /// Silence appended after the last word, reflected only in the duration.
    pub fn with_trailing_silence(mut self, seconds: f64) -> Self {
        self.trailing_silence = seconds;
        self
    }

    /// Delay applied to every call without a specific delay.
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Delay applied when synthesizing exactly `text`.
    pub fn with_delay_for(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    /// Fail with `message` when synthesizing exactly `text`.
    pub fn with_failure_for(mut self, text: &str, message: &str) -> Self {
        self.failures.insert(text.to_string(), message.to_string());
        self
    }

    /// Number of synthesize calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn timed_words(&self, text: &str) -> Vec<TranscriptWord> {
        text.split_whitespace()
            .enumerate()
            .map(|(i, word)| {
                let start = i as f64 * self.word_seconds;
                TranscriptWord::new(word, start, start + self.word_seconds)
            })
            .collect()
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter even if the call is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesisOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let delay = self.delays.get(text).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failures.get(text) {
            return Err(VoxcastError::Synthesis {
                message: message.clone(),
            });
        }

        let words = self.timed_words(text);
        let spoken = words.last().map(|w| w.end_ts).unwrap_or(0.0);
        Ok(SynthesisOutput {
            audio: format!("mock-audio:{}", text).into_bytes(),
            words,
            duration_seconds: spoken + self.trailing_silence,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mock_produces_back_to_back_words() {
        let synth = MockSynthesizer::new().with_word_seconds(0.5);
        let output = synth.synthesize("Hello there world").await.unwrap();

        assert_eq!(output.words.len(), 3);
        assert_eq!(output.words[0], TranscriptWord::new("Hello", 0.0, 0.5));
        assert_eq!(output.words[2], TranscriptWord::new("world", 1.0, 1.5));
        assert_eq!(output.duration_seconds, 1.5);
        assert!(!output.audio.is_empty());
    }

    #[tokio::test]
    async fn test_trailing_silence_only_affects_duration() {
        let synth = MockSynthesizer::new()
            .with_word_seconds(0.5)
            .with_trailing_silence(2.0);
        let output = synth.synthesize("one two").await.unwrap();

        assert_eq!(output.words.last().map(|w| w.end_ts), Some(1.0));
        assert_eq!(output.duration_seconds, 3.0);
    }

    #[tokio::test]
    async fn test_failure_for_specific_text() {
        let synth = MockSynthesizer::new().with_failure_for("bad text", "voice unavailable");

        assert!(synth.synthesize("good text").await.is_ok());
        match synth.synthesize("bad text").await {
            Err(VoxcastError::Synthesis { message }) => assert_eq!(message, "voice unavailable"),
            other => panic!("Expected Synthesis error, got {:?}", other),
        }
        assert_eq!(synth.calls(), 2);
    }

    #[tokio::test]
    async fn test_tracks_peak_concurrency() {
        let synth = Arc::new(MockSynthesizer::new().with_default_delay(Duration::from_millis(30)));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let synth = synth.clone();
                tokio::spawn(async move { synth.synthesize(&format!("text {}", i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(synth.peak_in_flight(), 4);
        assert_eq!(synth.calls(), 4);
    }

    #[tokio::test]
    async fn test_synthesizer_trait_is_object_safe() {
        let synth: Box<dyn Synthesizer> = Box::new(MockSynthesizer::new());
        assert_eq!(synth.name(), "mock");
        assert!(synth.synthesize("boxed").await.is_ok());
    }
}
