//! Stream and chunk persistence.
//!
//! [`StreamStore`] is the contract the orchestrator relies on: the completion
//! counter is incremented under the store's own lock, and the terminal
//! transitions (`fail_stream`, `complete_stream`) are conditional updates that
//! only apply while the stream is still processing.
//!
//! Both implementations keep one [`StreamDocument`] per stream (the stream row
//! plus its chunk rows). [`MemoryStore`] keeps them in memory only;
//! [`FileStore`] also writes each document to `{root}/{stream_id}.json` after
//! every change and reloads them on [`FileStore::open`].

use crate::error::{Result, VoxcastError};
use crate::stream::model::{
    ChunkCompletion, ChunkRecord, ChunkStatus, NewChunk, StreamRecord, StreamStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Creates a processing stream and one pending chunk per input.
    ///
    /// If the chunk rows cannot be written the stream row is removed again.
    async fn create_stream(&self, url_hash: &str, chunks: &[NewChunk]) -> Result<StreamRecord>;

    /// Marks a chunk as processing and records `started_at`.
    async fn start_chunk(&self, stream_id: &str, chunk_index: u32) -> Result<()>;

    /// Marks a chunk as ready with its segment and local word timings.
    async fn complete_chunk(
        &self,
        stream_id: &str,
        chunk_index: u32,
        completion: ChunkCompletion,
    ) -> Result<()>;

    /// Atomically increments `chunks_completed` and returns the new value.
    async fn increment_completed(&self, stream_id: &str) -> Result<u32>;

    /// Raises `chunks_completed` to the number of ready chunks when it lags
    /// behind (a completion whose increment was never written). Only applies
    /// while the stream is processing. Returns the resulting count.
    async fn reconcile_completed(&self, stream_id: &str) -> Result<u32>;

    /// Marks a chunk as failed. Does not touch the stream.
    async fn fail_chunk(&self, stream_id: &str, chunk_index: u32, message: &str) -> Result<()>;

    /// Fails the stream if it is still processing. Returns false when another
    /// failure (or a terminal state) got there first.
    async fn fail_stream(&self, stream_id: &str, chunk_index: u32, message: &str) -> Result<bool>;

    /// Marks the stream ready if it is still processing and every chunk has
    /// completed. Returns false otherwise.
    async fn complete_stream(&self, stream_id: &str, total_duration_seconds: f64) -> Result<bool>;

    /// Accepts a stream with at least one ready chunk as partial.
    async fn mark_partial(&self, stream_id: &str) -> Result<StreamRecord>;

    async fn update_manifest_url(&self, stream_id: &str, url: &str) -> Result<()>;

    async fn set_transcript_url(&self, stream_id: &str, url: &str) -> Result<()>;

    /// Attaches the cache entry that owns this stream.
    async fn link_cache(&self, stream_id: &str, cache_id: &str) -> Result<()>;

    async fn get_stream(&self, stream_id: &str) -> Result<Option<StreamRecord>>;

    /// Most recently created stream for a source URL hash.
    async fn get_by_url_hash(&self, url_hash: &str) -> Result<Option<StreamRecord>>;

    /// Chunks of a stream, ordered by index.
    async fn list_chunks(&self, stream_id: &str) -> Result<Vec<ChunkRecord>>;
}

/// A stream row together with its chunk rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDocument {
    pub stream: StreamRecord,
    pub chunks: Vec<ChunkRecord>,
}

impl StreamDocument {
    fn chunk_mut(&mut self, chunk_index: u32) -> Result<&mut ChunkRecord> {
        let stream_id = &self.stream.id;
        self.chunks
            .get_mut(chunk_index as usize)
            .ok_or_else(|| VoxcastError::ChunkNotFound {
                stream_id: stream_id.clone(),
                index: chunk_index,
            })
    }

    fn touch(&mut self) {
        self.stream.updated_at = Utc::now();
    }
}

/// Where documents go after each change.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save(&self, document: &StreamDocument) -> Result<()>;
    async fn remove(&self, stream_id: &str) -> Result<()>;
}

/// No persistence; documents live as long as the store.
#[derive(Debug, Default, Clone, Copy)]
pub struct Volatile;

#[async_trait]
impl Persistence for Volatile {
    async fn save(&self, _document: &StreamDocument) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _stream_id: &str) -> Result<()> {
        Ok(())
    }
}

/// One pretty-printed JSON file per stream.
#[derive(Debug, Clone)]
pub struct JsonFiles {
    root: PathBuf,
}

impl JsonFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, stream_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", stream_id))
    }
}

#[async_trait]
impl Persistence for JsonFiles {
    async fn save(&self, document: &StreamDocument) -> Result<()> {
        let json = serde_json::to_vec_pretty(document)?;
        crate::fs::atomic_write(&self.path_for(&document.stream.id), &json).await?;
        Ok(())
    }

    async fn remove(&self, stream_id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(stream_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Document-per-stream store, generic over where documents are persisted.
pub struct DocumentStore<P> {
    documents: Mutex<HashMap<String, StreamDocument>>,
    persistence: P,
}

pub type MemoryStore = DocumentStore<Volatile>;
pub type FileStore = DocumentStore<JsonFiles>;

impl DocumentStore<Volatile> {
    pub fn new() -> Self {
        Self::with_persistence(Volatile)
    }
}

impl Default for DocumentStore<Volatile> {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore<JsonFiles> {
    /// Opens (creating if needed) a store directory and loads every stream
    /// document in it. Unreadable documents are skipped with a warning.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let files = JsonFiles::new(root);
        tokio::fs::create_dir_all(files.root()).await?;

        let mut documents = HashMap::new();
        let mut entries = tokio::fs::read_dir(files.root()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<StreamDocument>(&content) {
                Ok(document) => {
                    documents.insert(document.stream.id.clone(), document);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable stream document");
                }
            }
        }

        tracing::debug!(root = %files.root().display(), streams = documents.len(), "stream store opened");
        Ok(Self {
            documents: Mutex::new(documents),
            persistence: files,
        })
    }

    pub fn root(&self) -> &Path {
        self.persistence.root()
    }
}

impl<P: Persistence> DocumentStore<P> {
    pub fn with_persistence(persistence: P) -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            persistence,
        }
    }

    /// Applies `change` to a copy of the document, persists it if it changed,
    /// then publishes it. A failed save leaves the stored document untouched.
    async fn update<R, F>(&self, stream_id: &str, change: F) -> Result<R>
    where
        F: FnOnce(&mut StreamDocument) -> Result<R> + Send,
        R: Send,
    {
        let mut documents = self.documents.lock().await;
        let current = documents
            .get(stream_id)
            .ok_or_else(|| VoxcastError::StreamNotFound {
                id: stream_id.to_string(),
            })?;

        let mut next = current.clone();
        let value = change(&mut next)?;
        if next != *current {
            self.persistence.save(&next).await?;
            documents.insert(stream_id.to_string(), next);
        }
        Ok(value)
    }

    async fn read<R>(&self, stream_id: &str, f: impl FnOnce(&StreamDocument) -> R) -> Result<R> {
        let documents = self.documents.lock().await;
        documents
            .get(stream_id)
            .map(f)
            .ok_or_else(|| VoxcastError::StreamNotFound {
                id: stream_id.to_string(),
            })
    }
}

fn invalid_transition(id: &str, from: impl ToString, to: impl ToString) -> VoxcastError {
    VoxcastError::InvalidTransition {
        id: id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

#[async_trait]
impl<P: Persistence> StreamStore for DocumentStore<P> {
    async fn create_stream(&self, url_hash: &str, chunks: &[NewChunk]) -> Result<StreamRecord> {
        if chunks.is_empty() {
            return Err(VoxcastError::EmptyChunkList);
        }

        let stream_id = Uuid::new_v4().to_string();
        let stream = StreamRecord::new(
            stream_id.clone(),
            url_hash.to_string(),
            chunks.len() as u32,
            Utc::now(),
        );
        let mut document = StreamDocument {
            stream: stream.clone(),
            chunks: Vec::new(),
        };

        let mut documents = self.documents.lock().await;
        self.persistence.save(&document).await?;
        documents.insert(stream_id.clone(), document.clone());

        document.chunks = chunks
            .iter()
            .enumerate()
            .map(|(index, input)| {
                ChunkRecord::pending(
                    Uuid::new_v4().to_string(),
                    stream_id.clone(),
                    index as u32,
                    input,
                )
            })
            .collect();

        if let Err(e) = self.persistence.save(&document).await {
            documents.remove(&stream_id);
            if let Err(cleanup) = self.persistence.remove(&stream_id).await {
                tracing::error!(stream_id = %stream_id, error = %cleanup, "failed to remove stream after chunk creation failed");
            }
            return Err(e);
        }
        documents.insert(stream_id, document);

        Ok(stream)
    }

    async fn start_chunk(&self, stream_id: &str, chunk_index: u32) -> Result<()> {
        self.update(stream_id, |doc| {
            let chunk = doc.chunk_mut(chunk_index)?;
            match chunk.status {
                ChunkStatus::Pending | ChunkStatus::Processing => {
                    chunk.status = ChunkStatus::Processing;
                    chunk.started_at = Some(Utc::now());
                }
                other => {
                    return Err(invalid_transition(&chunk.id, other, ChunkStatus::Processing));
                }
            }
            doc.touch();
            Ok(())
        })
        .await
    }

    async fn complete_chunk(
        &self,
        stream_id: &str,
        chunk_index: u32,
        completion: ChunkCompletion,
    ) -> Result<()> {
        self.update(stream_id, |doc| {
            let chunk = doc.chunk_mut(chunk_index)?;
            if chunk.status == ChunkStatus::Ready {
                return Err(invalid_transition(&chunk.id, chunk.status, ChunkStatus::Ready));
            }
            chunk.status = ChunkStatus::Ready;
            chunk.duration_seconds = Some(completion.duration_seconds);
            chunk.segment_url = Some(completion.segment_url);
            chunk.segment_size_bytes = Some(completion.segment_size_bytes);
            chunk.words = completion.words;
            chunk.error_message = None;
            chunk.completed_at = Some(Utc::now());
            doc.touch();
            Ok(())
        })
        .await
    }

    async fn increment_completed(&self, stream_id: &str) -> Result<u32> {
        self.update(stream_id, |doc| {
            if doc.stream.chunks_completed >= doc.stream.total_chunks {
                return Err(VoxcastError::Store {
                    message: format!(
                        "stream {} already has all {} chunks completed",
                        doc.stream.id, doc.stream.total_chunks
                    ),
                });
            }
            doc.stream.chunks_completed += 1;
            doc.touch();
            Ok(doc.stream.chunks_completed)
        })
        .await
    }

    async fn reconcile_completed(&self, stream_id: &str) -> Result<u32> {
        self.update(stream_id, |doc| {
            let ready = doc
                .chunks
                .iter()
                .filter(|c| c.status == ChunkStatus::Ready)
                .count() as u32;
            if doc.stream.status == StreamStatus::Processing && doc.stream.chunks_completed < ready {
                tracing::warn!(
                    stream_id = %doc.stream.id,
                    recorded = doc.stream.chunks_completed,
                    ready,
                    "completion counter behind ready chunks; reconciling"
                );
                doc.stream.chunks_completed = ready;
                doc.touch();
            }
            Ok(doc.stream.chunks_completed)
        })
        .await
    }

    async fn fail_chunk(&self, stream_id: &str, chunk_index: u32, message: &str) -> Result<()> {
        self.update(stream_id, |doc| {
            let chunk = doc.chunk_mut(chunk_index)?;
            if chunk.status == ChunkStatus::Ready {
                return Err(invalid_transition(&chunk.id, chunk.status, ChunkStatus::Failed));
            }
            chunk.status = ChunkStatus::Failed;
            chunk.error_message = Some(message.to_string());
            chunk.completed_at = Some(Utc::now());
            doc.touch();
            Ok(())
        })
        .await
    }

    async fn fail_stream(&self, stream_id: &str, chunk_index: u32, message: &str) -> Result<bool> {
        self.update(stream_id, |doc| {
            if doc.stream.status != StreamStatus::Processing {
                return Ok(false);
            }
            let now = Utc::now();
            doc.stream.status = StreamStatus::Failed;
            doc.stream.failed_chunk = Some(chunk_index);
            doc.stream.error_message = Some(message.to_string());
            doc.stream.completed_at = Some(now);
            doc.stream.updated_at = now;
            Ok(true)
        })
        .await
    }

    async fn complete_stream(&self, stream_id: &str, total_duration_seconds: f64) -> Result<bool> {
        self.update(stream_id, |doc| {
            if doc.stream.status != StreamStatus::Processing || !doc.stream.all_chunks_completed() {
                return Ok(false);
            }
            let now = Utc::now();
            doc.stream.status = StreamStatus::Ready;
            doc.stream.total_duration_seconds = Some(total_duration_seconds);
            doc.stream.completed_at = Some(now);
            doc.stream.updated_at = now;
            Ok(true)
        })
        .await
    }

    async fn mark_partial(&self, stream_id: &str) -> Result<StreamRecord> {
        self.update(stream_id, |doc| {
            let status = doc.stream.status;
            let accepts = matches!(status, StreamStatus::Processing | StreamStatus::Failed);
            if !accepts || doc.stream.chunks_completed == 0 {
                return Err(invalid_transition(&doc.stream.id, status, StreamStatus::Partial));
            }
            let now = Utc::now();
            doc.stream.status = StreamStatus::Partial;
            doc.stream.completed_at.get_or_insert(now);
            doc.stream.updated_at = now;
            Ok(doc.stream.clone())
        })
        .await
    }

    async fn update_manifest_url(&self, stream_id: &str, url: &str) -> Result<()> {
        self.update(stream_id, |doc| {
            if doc.stream.manifest_url.as_deref() != Some(url) {
                doc.stream.manifest_url = Some(url.to_string());
                doc.touch();
            }
            Ok(())
        })
        .await
    }

    async fn set_transcript_url(&self, stream_id: &str, url: &str) -> Result<()> {
        self.update(stream_id, |doc| {
            doc.stream.transcript_url = Some(url.to_string());
            doc.touch();
            Ok(())
        })
        .await
    }

    async fn link_cache(&self, stream_id: &str, cache_id: &str) -> Result<()> {
        self.update(stream_id, |doc| {
            doc.stream.cache_id = Some(cache_id.to_string());
            doc.touch();
            Ok(())
        })
        .await
    }

    async fn get_stream(&self, stream_id: &str) -> Result<Option<StreamRecord>> {
        let documents = self.documents.lock().await;
        Ok(documents.get(stream_id).map(|doc| doc.stream.clone()))
    }

    async fn get_by_url_hash(&self, url_hash: &str) -> Result<Option<StreamRecord>> {
        let documents = self.documents.lock().await;
        Ok(documents
            .values()
            .filter(|doc| doc.stream.url_hash == url_hash)
            .max_by_key(|doc| doc.stream.created_at)
            .map(|doc| doc.stream.clone()))
    }

    async fn list_chunks(&self, stream_id: &str) -> Result<Vec<ChunkRecord>> {
        self.read(stream_id, |doc| doc.chunks.clone()).await
    }
}
