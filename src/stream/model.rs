//! Persisted stream and chunk records.

use crate::defaults;
use crate::text::{TextChunk, text_preview};
use crate::transcript::TranscriptWord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a stream. `Ready`, `Failed` and `Partial` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Processing,
    Ready,
    Failed,
    Partial,
}

impl StreamStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StreamStatus::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamStatus::Processing => "processing",
            StreamStatus::Ready => "ready",
            StreamStatus::Failed => "failed",
            StreamStatus::Partial => "partial",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Processing => "processing",
            ChunkStatus::Ready => "ready",
            ChunkStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub id: String,
    pub url_hash: String,
    pub cache_id: Option<String>,
    pub total_chunks: u32,
    pub chunks_completed: u32,
    pub status: StreamStatus,
    pub manifest_url: Option<String>,
    pub transcript_url: Option<String>,
    pub total_duration_seconds: Option<f64>,
    pub failed_chunk: Option<u32>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StreamRecord {
    pub(crate) fn new(id: String, url_hash: String, total_chunks: u32, now: DateTime<Utc>) -> Self {
        Self {
            id,
            url_hash,
            cache_id: None,
            total_chunks,
            chunks_completed: 0,
            status: StreamStatus::Processing,
            manifest_url: None,
            transcript_url: None,
            total_duration_seconds: None,
            failed_chunk: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Returns true once every chunk has completed.
    pub fn all_chunks_completed(&self) -> bool {
        self.chunks_completed >= self.total_chunks
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub stream_id: String,
    pub chunk_index: u32,
    pub word_count: usize,
    pub text_preview: String,
    pub status: ChunkStatus,
    pub duration_seconds: Option<f64>,
    pub segment_url: Option<String>,
    pub segment_size_bytes: Option<u64>,
    pub error_message: Option<String>,
    /// Word timings relative to the start of this chunk's audio.
    #[serde(default)]
    pub words: Vec<TranscriptWord>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ChunkRecord {
    pub(crate) fn pending(
        id: String,
        stream_id: String,
        chunk_index: u32,
        input: &NewChunk,
    ) -> Self {
        Self {
            id,
            stream_id,
            chunk_index,
            word_count: input.word_count,
            text_preview: input.text_preview.clone(),
            status: ChunkStatus::Pending,
            duration_seconds: None,
            segment_url: None,
            segment_size_bytes: None,
            error_message: None,
            words: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Chunk metadata supplied when a stream is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChunk {
    pub word_count: usize,
    pub text_preview: String,
}

impl NewChunk {
    pub fn new(word_count: usize, text_preview: impl Into<String>) -> Self {
        Self {
            word_count,
            text_preview: text_preview.into(),
        }
    }
}

impl From<&TextChunk> for NewChunk {
    fn from(chunk: &TextChunk) -> Self {
        Self::new(
            chunk.word_count,
            text_preview(&chunk.text, defaults::TEXT_PREVIEW_CHARS),
        )
    }
}

/// Result of a successful synthesis and upload, recorded on the chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkCompletion {
    pub duration_seconds: f64,
    pub segment_url: String,
    pub segment_size_bytes: u64,
    pub words: Vec<TranscriptWord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&StreamStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(
            serde_json::from_str::<ChunkStatus>("\"ready\"").unwrap(),
            ChunkStatus::Ready
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!StreamStatus::Processing.is_terminal());
        assert!(StreamStatus::Ready.is_terminal());
        assert!(StreamStatus::Failed.is_terminal());
        assert!(StreamStatus::Partial.is_terminal());
    }

    #[test]
    fn test_new_stream_starts_processing() {
        let record = StreamRecord::new("s".into(), "h".into(), 3, Utc::now());

        assert_eq!(record.status, StreamStatus::Processing);
        assert_eq!(record.chunks_completed, 0);
        assert!(!record.all_chunks_completed());
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn test_new_chunk_from_text_chunk_truncates_preview() {
        let chunk = TextChunk {
            index: 0,
            text: "word ".repeat(60),
            word_count: 60,
            is_first: true,
            is_last: true,
        };
        let input = NewChunk::from(&chunk);

        assert_eq!(input.word_count, 60);
        assert_eq!(input.text_preview.chars().count(), 100);
        assert!(input.text_preview.ends_with("..."));
    }

    #[test]
    fn test_chunk_without_words_field_deserializes() {
        let json = r#"{
            "id": "c", "stream_id": "s", "chunk_index": 0, "word_count": 10,
            "text_preview": "Hello", "status": "pending",
            "duration_seconds": null, "segment_url": null, "segment_size_bytes": null,
            "error_message": null, "started_at": null, "completed_at": null
        }"#;
        let chunk: ChunkRecord = serde_json::from_str(json).unwrap();

        assert!(chunk.words.is_empty());
        assert_eq!(chunk.status, ChunkStatus::Pending);
    }
}
