//! Error types for voxcast.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxcastError {
    // Input errors: rejected before any state is created
    #[error("Cannot create a stream from an empty chunk list")]
    EmptyChunkList,

    #[error("Invalid chapter input: {message}")]
    InvalidChapters { message: String },

    #[error("Expected {expected} chunk texts, got {actual}")]
    ChunkCountMismatch { expected: usize, actual: usize },

    #[error("Chunk index {index} is out of range for a stream of {total} chunks")]
    ChunkOutOfRange { index: u32, total: u32 },

    #[error("Chunk {index} was already stitched")]
    DuplicateChunk { index: u32 },

    // Synthesis and upload failures: recorded per chunk
    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Upload failed for {key}: {message}")]
    Upload { key: String, message: String },

    #[error("Chunk {index} timed out after {seconds}s")]
    ChunkTimeout { index: u32, seconds: u64 },

    // Persistence failures
    #[error("Stream store error: {message}")]
    Store { message: String },

    #[error("Stream not found: {id}")]
    StreamNotFound { id: String },

    #[error("Chunk {index} not found in stream {stream_id}")]
    ChunkNotFound { stream_id: String, index: u32 },

    #[error("Cannot move {id} from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("Stream {id} is already being dispatched")]
    DispatchInProgress { id: String },

    // Capacity failures
    #[error("Synthesis capacity exhausted ({limit} chunks in flight); retry later")]
    Busy { limit: usize },

    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // General I/O and encoding errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl VoxcastError {
    /// Returns true for failures a caller may retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VoxcastError::Busy { .. }
                | VoxcastError::ChunkTimeout { .. }
                | VoxcastError::Synthesis { .. }
                | VoxcastError::Upload { .. }
                | VoxcastError::Store { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxcastError>;
