//! Streams: records, persistence and the chunk workflow.

pub mod model;
pub mod orchestrator;
pub mod store;

pub use model::{ChunkCompletion, ChunkRecord, ChunkStatus, NewChunk, StreamRecord, StreamStatus};
pub use orchestrator::{
    Canceller, CapacityPolicy, DispatchHandle, DispatchRequest, OrchestratorOptions,
    StreamOrchestrator, StreamOutcome,
};
pub use store::{
    DocumentStore, FileStore, JsonFiles, MemoryStore, Persistence, StreamStore, Volatile,
};
