//! Drives a stream from pending chunks to a ready, playable stream.
//!
//! ```text
//!                 ┌──────────────┐   permit    ┌────────────────────────┐
//!  chunk texts ──▶│  dispatcher  │────────────▶│ worker: synth + upload │──┐
//!  (index order)  └──────────────┘  (bounded)  └────────────────────────┘  │ ChunkEvent
//!                                                                          ▼
//!                        ┌───────────────────────────────────────────────────────┐
//!                        │ consumer: stitcher + manifest builder (index order)   │
//!                        │ publishes manifest, finalizes, publishes transcript   │
//!                        └───────────────────────────────────────────────────────┘
//! ```
//!
//! Workers finish in any order. Each worker records its own chunk in the
//! store (ready or failed) and increments the completion counter; the single
//! consumer task owns the stitcher and the manifest builder, so transcript
//! and playlist only ever grow in chunk-index order.

use crate::defaults;
use crate::error::{Result, VoxcastError};
use crate::manifest::{ManifestBuilder, Segment};
use crate::stream::model::{ChunkCompletion, ChunkRecord, ChunkStatus, NewChunk, StreamRecord, StreamStatus};
use crate::stream::store::StreamStore;
use crate::synth::Synthesizer;
use crate::text::TextChunk;
use crate::transcript::{ChapterMarker, TranscriptDocument, TranscriptStitcher, TranscriptWord, map_chapters};
use crate::upload::{UploadHints, Uploader, segment_key, transcript_key};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;

/// What to do with a chunk when every synthesis slot is taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityPolicy {
    /// Wait for a free slot.
    #[default]
    Queue,
    /// Refuse a dispatch with [`VoxcastError::Busy`] when no slot is free
    /// as it starts. An admitted dispatch queues its remaining chunks.
    Reject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorOptions {
    /// Chunks synthesized at once, shared by every stream of the orchestrator.
    pub max_concurrent_chunks: usize,
    pub capacity_policy: CapacityPolicy,
    /// Limit for synthesis plus upload of one chunk.
    pub chunk_timeout: Option<Duration>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_concurrent_chunks: defaults::MAX_CONCURRENT_CHUNKS,
            capacity_policy: CapacityPolicy::Queue,
            chunk_timeout: None,
        }
    }
}

/// Texts and transcript metadata for dispatching a stream's chunks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchRequest {
    /// Title written into the transcript document.
    pub title: String,
    /// One text per chunk, in chunk-index order.
    pub texts: Vec<String>,
    /// Heading positions, sorted by `char_index`.
    pub chapters: Vec<ChapterMarker>,
}

impl DispatchRequest {
    pub fn new(texts: Vec<String>) -> Self {
        Self {
            texts,
            ..Self::default()
        }
    }

    pub fn from_chunks(chunks: &[TextChunk]) -> Self {
        Self::new(chunks.iter().map(|c| c.text.clone()).collect())
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_chapters(mut self, chapters: Vec<ChapterMarker>) -> Self {
        self.chapters = chapters;
        self
    }
}

/// Final state of a dispatch once no more chunk results can arrive.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    /// Stream record as stored after the last update.
    pub stream: StreamRecord,
    /// Chunks known to be ready, including ones restored on resume.
    pub ready_chunks: usize,
    /// Stitched words of the contiguous ready prefix, on the global timeline.
    pub words: Vec<TranscriptWord>,
}

impl StreamOutcome {
    pub fn status(&self) -> StreamStatus {
        self.stream.status
    }

    pub fn manifest_url(&self) -> Option<&str> {
        self.stream.manifest_url.as_deref()
    }
}

/// Handle to a running dispatch.
///
/// Dropping the handle detaches the dispatch; it keeps running.
#[derive(Debug)]
pub struct DispatchHandle {
    stream_id: String,
    cancel: Arc<watch::Sender<bool>>,
    task: JoinHandle<Result<StreamOutcome>>,
}

impl DispatchHandle {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Stops dispatching new chunks. Chunks already running finish and
    /// record their own results; ready chunks are never retracted.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// A cloneable way to cancel this dispatch from another task.
    pub fn canceller(&self) -> Canceller {
        Canceller(self.cancel.clone())
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits until every dispatched chunk has reported back.
    pub async fn wait(self) -> Result<StreamOutcome> {
        self.task
            .await
            .map_err(|e| VoxcastError::Other(format!("Dispatch task failed: {}", e)))?
    }
}

/// Cancels a dispatch; see [`DispatchHandle::cancel`].
#[derive(Debug, Clone)]
pub struct Canceller(Arc<watch::Sender<bool>>);

impl Canceller {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

enum ChunkEvent {
    Ready {
        index: u32,
        segment: Segment,
        words: Vec<TranscriptWord>,
    },
    Failed {
        index: u32,
        message: String,
    },
}

/// Everything the dispatcher task owns for one run.
struct DispatchRun {
    stream_id: String,
    texts: Vec<String>,
    work: Vec<u32>,
    /// Slot taken at admission, used by the first chunk.
    reserved: Option<OwnedSemaphorePermit>,
    events: mpsc::Sender<ChunkEvent>,
    cancel: watch::Receiver<bool>,
    // Keeps the cancel channel open if the handle is dropped
    _cancel_tx: Arc<watch::Sender<bool>>,
    halted: Arc<AtomicBool>,
}

type ActiveStreams = Arc<Mutex<HashSet<String>>>;

/// Claim on a stream while a dispatch runs for it; released on drop.
struct ActiveDispatch {
    streams: ActiveStreams,
    stream_id: String,
}

impl ActiveDispatch {
    fn claim(streams: &ActiveStreams, stream_id: &str) -> Result<Self> {
        let mut active = streams.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(stream_id.to_string()) {
            return Err(VoxcastError::DispatchInProgress {
                id: stream_id.to_string(),
            });
        }
        Ok(Self {
            streams: streams.clone(),
            stream_id: stream_id.to_string(),
        })
    }
}

impl Drop for ActiveDispatch {
    fn drop(&mut self) {
        let mut active = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        active.remove(&self.stream_id);
    }
}

/// Stitcher and manifest state rebuilt from, and advanced past, ready chunks.
struct Progress {
    total_chunks: usize,
    stitcher: TranscriptStitcher,
    manifest: ManifestBuilder,
    ready_chunks: usize,
}

impl Progress {
    /// Replays every ready chunk of a stream.
    fn seed(stream: &StreamRecord, chunks: &[ChunkRecord]) -> Result<Self> {
        let mut progress = Self {
            total_chunks: stream.total_chunks as usize,
            stitcher: TranscriptStitcher::default(),
            manifest: ManifestBuilder::new(&stream.id, stream.total_chunks),
            ready_chunks: 0,
        };

        for chunk in chunks.iter().filter(|c| c.status == ChunkStatus::Ready) {
            let url = chunk.segment_url.clone().ok_or_else(|| VoxcastError::Store {
                message: format!(
                    "ready chunk {} of stream {} has no segment URL",
                    chunk.chunk_index, stream.id
                ),
            })?;
            let duration = chunk.duration_seconds.unwrap_or(0.0);
            progress.stitcher.append(chunk.chunk_index, chunk.words.clone())?;
            progress
                .manifest
                .add_segment(Segment::new(chunk.chunk_index, url, duration))?;
            progress.ready_chunks += 1;
        }

        Ok(progress)
    }

    fn is_complete(&self) -> bool {
        self.manifest.segments().len() == self.total_chunks
    }

    /// End of the last stitched word, or the summed segment durations when
    /// no chunk reported any words.
    fn total_duration(&self) -> f64 {
        if self.stitcher.words().is_empty() {
            self.manifest.listed_duration()
        } else {
            self.stitcher.cumulative_time()
        }
    }
}

/// Runs synthesis and upload for streams, bounded by a shared pool of slots.
#[derive(Clone)]
pub struct StreamOrchestrator {
    store: Arc<dyn StreamStore>,
    synthesizer: Arc<dyn Synthesizer>,
    uploader: Arc<dyn Uploader>,
    permits: Arc<Semaphore>,
    active: ActiveStreams,
    options: OrchestratorOptions,
}

impl StreamOrchestrator {
    pub fn new(
        store: Arc<dyn StreamStore>,
        synthesizer: Arc<dyn Synthesizer>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        Self::with_options(store, synthesizer, uploader, OrchestratorOptions::default())
    }

    pub fn with_options(
        store: Arc<dyn StreamStore>,
        synthesizer: Arc<dyn Synthesizer>,
        uploader: Arc<dyn Uploader>,
        options: OrchestratorOptions,
    ) -> Self {
        let slots = options.max_concurrent_chunks.max(1);
        Self {
            store,
            synthesizer,
            uploader,
            permits: Arc::new(Semaphore::new(slots)),
            active: Arc::default(),
            options,
        }
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn StreamStore> {
        &self.store
    }

    /// Creates a processing stream with one pending chunk per input.
    pub async fn create(&self, url_hash: &str, chunks: &[NewChunk]) -> Result<String> {
        if chunks.is_empty() {
            return Err(VoxcastError::EmptyChunkList);
        }

        let stream = self.store.create_stream(url_hash, chunks).await?;
        tracing::info!(
            stream_id = %stream.id,
            url_hash,
            total_chunks = stream.total_chunks,
            "stream created"
        );
        Ok(stream.id)
    }

    /// Creates a stream for already chunked text and starts dispatching it.
    pub async fn generate(
        &self,
        url_hash: &str,
        chunks: &[TextChunk],
        title: &str,
        chapters: Vec<ChapterMarker>,
    ) -> Result<DispatchHandle> {
        // Validate chapters and capacity before any state exists
        map_chapters(&chapters, &[])?;
        let reserved = self.reserve_slot()?;

        let inputs: Vec<NewChunk> = chunks.iter().map(NewChunk::from).collect();
        let stream_id = self.create(url_hash, &inputs).await?;
        let request = DispatchRequest::from_chunks(chunks)
            .with_title(title)
            .with_chapters(chapters);
        self.start_dispatch(&stream_id, request, reserved).await
    }

    /// Dispatches every chunk that is not ready yet, in index order.
    ///
    /// Ready chunks already in the store are replayed into the stitcher and
    /// manifest first, so the same call serves fresh streams and restarts.
    /// Only one dispatch may run per stream at a time.
    pub async fn dispatch(&self, stream_id: &str, request: DispatchRequest) -> Result<DispatchHandle> {
        self.start_dispatch(stream_id, request, None).await
    }

    async fn start_dispatch(
        &self,
        stream_id: &str,
        request: DispatchRequest,
        reserved: Option<OwnedSemaphorePermit>,
    ) -> Result<DispatchHandle> {
        let stream = self.processing_stream(stream_id).await?;
        if request.texts.len() != stream.total_chunks as usize {
            return Err(VoxcastError::ChunkCountMismatch {
                expected: stream.total_chunks as usize,
                actual: request.texts.len(),
            });
        }
        map_chapters(&request.chapters, &[])?;
        let active = ActiveDispatch::claim(&self.active, stream_id)?;

        let chunks = self.store.list_chunks(stream_id).await?;
        if let Some(failed) = chunks.iter().find(|c| c.status == ChunkStatus::Failed) {
            // A failed chunk on a processing stream means the escalation was lost
            let message = failed
                .error_message
                .clone()
                .unwrap_or_else(|| "chunk failed".to_string());
            self.store
                .fail_stream(stream_id, failed.chunk_index, &message)
                .await?;
            return Err(VoxcastError::InvalidTransition {
                id: stream_id.to_string(),
                from: StreamStatus::Failed.to_string(),
                to: StreamStatus::Processing.to_string(),
            });
        }

        let completed = self.store.reconcile_completed(stream_id).await?;
        let progress = Progress::seed(&stream, &chunks)?;
        let work: Vec<u32> = chunks
            .iter()
            .filter(|c| matches!(c.status, ChunkStatus::Pending | ChunkStatus::Processing))
            .map(|c| c.chunk_index)
            .collect();

        let reserved = match reserved {
            Some(permit) => Some(permit),
            None if work.is_empty() => None,
            None => self.reserve_slot().inspect_err(|_| {
                tracing::info!(stream_id, "dispatch refused; synthesis capacity exhausted");
            })?,
        };

        tracing::info!(
            stream_id,
            chunks = work.len(),
            already_ready = progress.ready_chunks,
            chunks_completed = completed,
            "dispatching chunks"
        );

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel = Arc::new(cancel_tx);
        // Capacity covers every chunk, so workers never wait on the consumer
        let (events_tx, events_rx) = mpsc::channel(work.len().max(1));
        let halted = Arc::new(AtomicBool::new(false));

        let DispatchRequest {
            title,
            texts,
            chapters,
        } = request;

        tokio::spawn(self.clone().run_dispatcher(DispatchRun {
            stream_id: stream.id.clone(),
            texts,
            work,
            reserved,
            events: events_tx,
            cancel: cancel_rx,
            _cancel_tx: cancel.clone(),
            halted,
        }));
        let task = tokio::spawn(self.clone().run_consumer(
            stream.clone(),
            progress,
            events_rx,
            title,
            chapters,
            active,
        ));

        Ok(DispatchHandle {
            stream_id: stream.id,
            cancel,
            task,
        })
    }

    /// Continues a stream after a restart. The caller resupplies the chunk
    /// texts; chunks already ready are not synthesized again.
    pub async fn resume(&self, stream_id: &str, request: DispatchRequest) -> Result<DispatchHandle> {
        let stream = self.processing_stream(stream_id).await?;
        tracing::info!(
            stream_id,
            chunks_completed = stream.chunks_completed,
            total_chunks = stream.total_chunks,
            "resuming stream"
        );
        self.dispatch(stream_id, request).await
    }

    /// Marks a stream ready if every chunk is ready and it is still
    /// processing. Returns false if the stream is not finished yet or
    /// already left processing.
    pub async fn finalize(
        &self,
        stream_id: &str,
        title: &str,
        chapters: &[ChapterMarker],
    ) -> Result<bool> {
        let stream = self.require_stream(stream_id).await?;
        let chunks = self.store.list_chunks(stream_id).await?;
        let progress = Progress::seed(&stream, &chunks)?;
        if !progress.is_complete() {
            return Ok(false);
        }
        self.finish(stream_id, &progress, title, chapters).await
    }

    /// Accepts whatever contiguous prefix is ready as the final stream and
    /// publishes a closed playlist for it.
    pub async fn accept_partial(&self, stream_id: &str) -> Result<StreamRecord> {
        let record = self.store.mark_partial(stream_id).await?;
        tracing::info!(
            stream_id,
            chunks_completed = record.chunks_completed,
            total_chunks = record.total_chunks,
            "stream accepted as partial"
        );

        let chunks = self.store.list_chunks(stream_id).await?;
        let mut progress = Progress::seed(&record, &chunks)?;
        progress.manifest.seal();
        if !progress.manifest.segments().is_empty() {
            self.publish_manifest(stream_id, &progress.manifest).await;
        }

        self.require_stream(stream_id).await
    }

    /// Attaches the cache entry that owns this stream.
    pub async fn link_cache(&self, stream_id: &str, cache_id: &str) -> Result<()> {
        self.store.link_cache(stream_id, cache_id).await?;
        tracing::debug!(stream_id, cache_id, "stream linked to cache entry");
        Ok(())
    }

    async fn require_stream(&self, stream_id: &str) -> Result<StreamRecord> {
        self.store
            .get_stream(stream_id)
            .await?
            .ok_or_else(|| VoxcastError::StreamNotFound {
                id: stream_id.to_string(),
            })
    }

    async fn processing_stream(&self, stream_id: &str) -> Result<StreamRecord> {
        let stream = self.require_stream(stream_id).await?;
        if stream.status != StreamStatus::Processing {
            return Err(VoxcastError::InvalidTransition {
                id: stream_id.to_string(),
                from: stream.status.to_string(),
                to: StreamStatus::Processing.to_string(),
            });
        }
        Ok(stream)
    }

    async fn run_dispatcher(self, run: DispatchRun) {
        let DispatchRun {
            stream_id,
            mut texts,
            work,
            mut reserved,
            events,
            mut cancel,
            _cancel_tx,
            halted,
        } = run;

        for index in work {
            if *cancel.borrow() {
                tracing::info!(stream_id = %stream_id, next_chunk = index, "dispatch cancelled");
                break;
            }
            if halted.load(Ordering::SeqCst) {
                tracing::debug!(stream_id = %stream_id, next_chunk = index, "dispatch halted after failure");
                break;
            }

            let permit = match reserved.take() {
                Some(permit) => permit,
                None => match self.acquire_slot(&mut cancel).await {
                    Some(permit) => permit,
                    None => {
                        tracing::info!(stream_id = %stream_id, next_chunk = index, "dispatch cancelled");
                        break;
                    }
                },
            };

            // State may have changed while waiting for a slot
            if *cancel.borrow() || halted.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.store.start_chunk(&stream_id, index).await {
                self.record_failure(&stream_id, index, &e, &halted, &events)
                    .await;
                break;
            }
            tracing::debug!(stream_id = %stream_id, chunk_index = index, "chunk started");

            let text = texts
                .get_mut(index as usize)
                .map(std::mem::take)
                .unwrap_or_default();
            let worker = self.clone();
            let stream_id = stream_id.clone();
            let events = events.clone();
            let halted = halted.clone();
            tokio::spawn(async move {
                let _permit = permit;
                worker
                    .run_chunk(&stream_id, index, &text, &halted, &events)
                    .await;
            });
        }
    }

    /// Takes a slot without waiting when the policy rejects on a full pool.
    fn reserve_slot(&self) -> Result<Option<OwnedSemaphorePermit>> {
        match self.options.capacity_policy {
            CapacityPolicy::Queue => Ok(None),
            CapacityPolicy::Reject => self
                .permits
                .clone()
                .try_acquire_owned()
                .map(Some)
                .map_err(|_| VoxcastError::Busy {
                    limit: self.options.max_concurrent_chunks,
                }),
        }
    }

    /// Waits for a slot; `None` once the dispatch is cancelled.
    async fn acquire_slot(&self, cancel: &mut watch::Receiver<bool>) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            permit = self.permits.clone().acquire_owned() => permit.ok(),
            _ = cancel.wait_for(|cancelled| *cancelled) => None,
        }
    }

    async fn run_chunk(
        &self,
        stream_id: &str,
        index: u32,
        text: &str,
        halted: &AtomicBool,
        events: &mpsc::Sender<ChunkEvent>,
    ) {
        let started = Instant::now();
        match self.produce_segment(stream_id, index, text).await {
            Ok((segment, words)) => {
                self.count_completion(stream_id, index).await;
                tracing::info!(
                    stream_id,
                    chunk_index = index,
                    duration_seconds = segment.duration_seconds,
                    words = words.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "chunk ready"
                );
                let event = ChunkEvent::Ready {
                    index,
                    segment,
                    words,
                };
                if events.send(event).await.is_err() {
                    tracing::debug!(stream_id, chunk_index = index, "consumer gone; chunk result dropped");
                }
            }
            Err(e) => {
                self.record_failure(stream_id, index, &e, halted, events)
                    .await
            }
        }
    }

    /// Synthesizes and uploads one chunk, then records it as ready.
    async fn produce_segment(
        &self,
        stream_id: &str,
        index: u32,
        text: &str,
    ) -> Result<(Segment, Vec<TranscriptWord>)> {
        let work = async {
            let output = self.synthesizer.synthesize(text).await?;
            let hints = UploadHints::new(segment_key(stream_id, index), defaults::SEGMENT_CONTENT_TYPE);
            let receipt = self.uploader.upload(output.audio, &hints).await?;
            Ok::<_, VoxcastError>((output.words, output.duration_seconds, receipt))
        };

        let (words, duration_seconds, receipt) = match self.options.chunk_timeout {
            Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| {
                VoxcastError::ChunkTimeout {
                    index,
                    seconds: limit.as_secs(),
                }
            })??,
            None => work.await?,
        };

        self.store
            .complete_chunk(
                stream_id,
                index,
                ChunkCompletion {
                    duration_seconds,
                    segment_url: receipt.url.clone(),
                    segment_size_bytes: receipt.size_bytes,
                    words: words.clone(),
                },
            )
            .await?;

        Ok((Segment::new(index, receipt.url, duration_seconds), words))
    }

    /// Counts a chunk that is already ready. A failed write leaves the chunk
    /// ready; the counter catches up in `reconcile_completed`.
    async fn count_completion(&self, stream_id: &str, index: u32) {
        match self.store.increment_completed(stream_id).await {
            Ok(completed) => {
                tracing::debug!(stream_id, chunk_index = index, completed, "completion counter advanced");
            }
            Err(e) => {
                tracing::error!(stream_id, chunk_index = index, error = %e, "completion counter not advanced");
            }
        }
    }

    /// Records a chunk failure and escalates it to the stream unless another
    /// failure got there first.
    async fn record_failure(
        &self,
        stream_id: &str,
        index: u32,
        error: &VoxcastError,
        halted: &AtomicBool,
        events: &mpsc::Sender<ChunkEvent>,
    ) {
        halted.store(true, Ordering::SeqCst);
        let message = error.to_string();
        tracing::warn!(stream_id, chunk_index = index, error = %message, "chunk failed");

        if let Err(e) = self.store.fail_chunk(stream_id, index, &message).await {
            tracing::error!(stream_id, chunk_index = index, error = %e, "failed to record chunk failure");
        }
        match self.store.fail_stream(stream_id, index, &message).await {
            Ok(true) => {
                tracing::warn!(stream_id, failed_chunk = index, "stream failed");
            }
            Ok(false) => {
                tracing::debug!(stream_id, chunk_index = index, "stream already terminal; failure kept on chunk");
            }
            Err(e) => {
                tracing::error!(stream_id, chunk_index = index, error = %e, "failed to record stream failure");
            }
        }

        if events.send(ChunkEvent::Failed { index, message }).await.is_err() {
            tracing::debug!(stream_id, chunk_index = index, "consumer gone; failure event dropped");
        }
    }

    async fn run_consumer(
        self,
        stream: StreamRecord,
        mut progress: Progress,
        mut events: mpsc::Receiver<ChunkEvent>,
        title: String,
        chapters: Vec<ChapterMarker>,
        _active: ActiveDispatch,
    ) -> Result<StreamOutcome> {
        let stream_id = stream.id.as_str();

        // Everything was ready before a restart; only finalization is missing
        if progress.is_complete() {
            self.finish(stream_id, &progress, &title, &chapters).await?;
        }

        while let Some(event) = events.recv().await {
            match event {
                ChunkEvent::Ready {
                    index,
                    segment,
                    words,
                } => {
                    progress.ready_chunks += 1;
                    if let Err(e) = progress.stitcher.append(index, words) {
                        tracing::warn!(stream_id, chunk_index = index, error = %e, "transcript not extended");
                    }
                    let grew = match progress.manifest.add_segment(segment) {
                        Ok(added) => added > 0,
                        Err(e) => {
                            tracing::warn!(stream_id, chunk_index = index, error = %e, "segment not added to playlist");
                            false
                        }
                    };

                    if progress.is_complete() {
                        self.finish(stream_id, &progress, &title, &chapters).await?;
                    } else if grew {
                        self.publish_manifest(stream_id, &progress.manifest).await;
                    }
                }
                ChunkEvent::Failed { index, message } => {
                    tracing::debug!(stream_id, chunk_index = index, error = %message, "chunk failure observed");
                }
            }
        }

        let record = self.require_stream(stream_id).await?;
        Ok(StreamOutcome {
            stream: record,
            ready_chunks: progress.ready_chunks,
            words: progress.stitcher.into_words(),
        })
    }

    /// Marks the stream ready, then writes the final playlist and transcript.
    async fn finish(
        &self,
        stream_id: &str,
        progress: &Progress,
        title: &str,
        chapters: &[ChapterMarker],
    ) -> Result<bool> {
        let total_duration = progress.total_duration();
        self.store.reconcile_completed(stream_id).await?;
        let completed = self.store.complete_stream(stream_id, total_duration).await?;
        if !completed {
            tracing::warn!(stream_id, "all chunks ready but stream could not be completed");
            return Ok(false);
        }
        tracing::info!(
            stream_id,
            total_duration_seconds = total_duration,
            chunks = progress.total_chunks,
            "stream ready"
        );

        self.publish_manifest(stream_id, &progress.manifest).await;
        if !progress.stitcher.words().is_empty() {
            self.publish_transcript(stream_id, title, progress.stitcher.words(), chapters)
                .await;
        }
        Ok(true)
    }

    /// Uploads the playlist and records its URL. Failures keep the previous
    /// playlist and never touch chunk state.
    async fn publish_manifest(&self, stream_id: &str, manifest: &ManifestBuilder) {
        let receipt = match manifest.publish(self.uploader.as_ref()).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(stream_id, error = %e, "playlist publish failed");
                return;
            }
        };

        if let Err(e) = self.store.update_manifest_url(stream_id, &receipt.url).await {
            tracing::error!(stream_id, error = %e, "failed to record playlist URL");
            return;
        }
        tracing::debug!(
            stream_id,
            segments = manifest.segments().len(),
            complete = manifest.is_complete(),
            "playlist published"
        );
    }

    async fn publish_transcript(
        &self,
        stream_id: &str,
        title: &str,
        words: &[TranscriptWord],
        chapters: &[ChapterMarker],
    ) {
        let document = match TranscriptDocument::build(title, words.to_vec(), chapters) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(stream_id, error = %e, "chapters dropped from transcript");
                match TranscriptDocument::build(title, words.to_vec(), &[]) {
                    Ok(document) => document,
                    Err(e) => {
                        tracing::warn!(stream_id, error = %e, "transcript not built");
                        return;
                    }
                }
            }
        };

        let json = match document.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(stream_id, error = %e, "transcript not serialized");
                return;
            }
        };

        let hints = UploadHints::new(transcript_key(stream_id), defaults::TRANSCRIPT_CONTENT_TYPE);
        match self.uploader.upload(json.into_bytes(), &hints).await {
            Ok(receipt) => {
                if let Err(e) = self.store.set_transcript_url(stream_id, &receipt.url).await {
                    tracing::error!(stream_id, error = %e, "failed to record transcript URL");
                } else {
                    tracing::info!(
                        stream_id,
                        words = document.words.len(),
                        chapters = document.chapters.len(),
                        "transcript published"
                    );
                }
            }
            Err(e) => tracing::warn!(stream_id, error = %e, "transcript publish failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::store::MemoryStore;
    use crate::synth::MockSynthesizer;
    use crate::upload::MemoryUploader;

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("chunk {} says hello", i)).collect()
    }

    fn inputs(texts: &[String]) -> Vec<NewChunk> {
        texts
            .iter()
            .map(|t| NewChunk::new(t.split_whitespace().count(), t.clone()))
            .collect()
    }

    fn orchestrator(
        synth: MockSynthesizer,
        options: OrchestratorOptions,
    ) -> (StreamOrchestrator, Arc<MemoryStore>, MemoryUploader) {
        let store = Arc::new(MemoryStore::new());
        let uploader = MemoryUploader::new("mem://bucket");
        let orchestrator = StreamOrchestrator::with_options(
            store.clone(),
            Arc::new(synth),
            Arc::new(uploader.clone()),
            options,
        );
        (orchestrator, store, uploader)
    }

    #[tokio::test]
    async fn test_create_rejects_empty_input() {
        let (orchestrator, _, _) =
            orchestrator(MockSynthesizer::new(), OrchestratorOptions::default());
        assert!(matches!(
            orchestrator.create("hash", &[]).await,
            Err(VoxcastError::EmptyChunkList)
        ));
    }

    #[tokio::test]
    async fn test_dispatch_completes_stream() {
        let (orchestrator, store, uploader) =
            orchestrator(MockSynthesizer::new(), OrchestratorOptions::default());
        let texts = texts(3);
        let id = orchestrator.create("hash", &inputs(&texts)).await.unwrap();

        let outcome = orchestrator
            .dispatch(&id, DispatchRequest::new(texts).with_title("Title"))
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(outcome.status(), StreamStatus::Ready);
        assert_eq!(outcome.ready_chunks, 3);
        assert_eq!(outcome.words.len(), 12);
        assert_eq!(
            outcome.manifest_url(),
            Some(format!("mem://bucket/streams/{}/playlist.m3u8", id).as_str())
        );
        assert!(outcome.stream.transcript_url.is_some());

        let record = store.get_stream(&id).await.unwrap().unwrap();
        assert_eq!(record.chunks_completed, 3);
        let total = record.total_duration_seconds.unwrap();
        assert!((total - 3.6).abs() < 1e-9);

        let playlist = uploader
            .get_text(&format!("streams/{}/playlist.m3u8", id))
            .unwrap();
        assert!(playlist.ends_with("#EXT-X-ENDLIST"));
    }

    #[tokio::test]
    async fn test_dispatch_rejects_wrong_text_count() {
        let (orchestrator, _, _) =
            orchestrator(MockSynthesizer::new(), OrchestratorOptions::default());
        let id = orchestrator.create("hash", &inputs(&texts(3))).await.unwrap();

        let result = orchestrator
            .dispatch(&id, DispatchRequest::new(texts(2)))
            .await;
        assert!(matches!(
            result,
            Err(VoxcastError::ChunkCountMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_dispatch_rejects_unsorted_chapters() {
        let (orchestrator, _, _) =
            orchestrator(MockSynthesizer::new(), OrchestratorOptions::default());
        let texts = texts(1);
        let id = orchestrator.create("hash", &inputs(&texts)).await.unwrap();

        let request = DispatchRequest::new(texts).with_chapters(vec![
            ChapterMarker::new("b", 10),
            ChapterMarker::new("a", 1),
        ]);
        assert!(matches!(
            orchestrator.dispatch(&id, request).await,
            Err(VoxcastError::InvalidChapters { .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_fails_chunk() {
        let texts = texts(1);
        let synth = MockSynthesizer::new().with_delay_for(&texts[0], Duration::from_millis(200));
        let (orchestrator, store, _) = orchestrator(
            synth,
            OrchestratorOptions {
                chunk_timeout: Some(Duration::from_millis(20)),
                ..OrchestratorOptions::default()
            },
        );
        let id = orchestrator.create("hash", &inputs(&texts)).await.unwrap();

        let outcome = orchestrator
            .dispatch(&id, DispatchRequest::new(texts))
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(outcome.status(), StreamStatus::Failed);
        assert_eq!(outcome.stream.failed_chunk, Some(0));
        let chunks = store.list_chunks(&id).await.unwrap();
        assert_eq!(chunks[0].status, ChunkStatus::Failed);
        assert!(chunks[0].error_message.as_deref().unwrap_or("").contains("timed out"));
    }

    #[tokio::test]
    async fn test_dispatch_on_terminal_stream_rejected() {
        let (orchestrator, store, _) =
            orchestrator(MockSynthesizer::new(), OrchestratorOptions::default());
        let texts = texts(1);
        let id = orchestrator.create("hash", &inputs(&texts)).await.unwrap();
        store.fail_stream(&id, 0, "boom").await.unwrap();

        assert!(matches!(
            orchestrator.dispatch(&id, DispatchRequest::new(texts)).await,
            Err(VoxcastError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_link_cache() {
        let (orchestrator, store, _) =
            orchestrator(MockSynthesizer::new(), OrchestratorOptions::default());
        let id = orchestrator.create("hash", &inputs(&texts(1))).await.unwrap();

        orchestrator.link_cache(&id, "cache-9").await.unwrap();
        let record = store.get_stream(&id).await.unwrap().unwrap();
        assert_eq!(record.cache_id.as_deref(), Some("cache-9"));
    }

    #[test]
    fn test_capacity_policy_serde() {
        assert_eq!(
            serde_json::from_str::<CapacityPolicy>("\"reject\"").unwrap(),
            CapacityPolicy::Reject
        );
        assert_eq!(CapacityPolicy::default(), CapacityPolicy::Queue);
    }
}
