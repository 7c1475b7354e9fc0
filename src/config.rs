use crate::defaults;
use crate::error::{Result, VoxcastError};
use crate::stream::{CapacityPolicy, OrchestratorOptions};
use crate::text::ChunkingOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub chunking: ChunkingOptions,
    pub synthesis: SynthesisConfig,
    pub storage: StorageConfig,
}

/// Chunk dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub max_concurrent_chunks: usize,
    pub capacity_policy: CapacityPolicy,
    /// Per-chunk limit for synthesis plus upload; unset means no limit.
    pub chunk_timeout_secs: Option<u64>,
}

/// Speech synthesis endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub voice_id: String,
    pub mp3_bitrate: u32,
}

/// Where stream state and published objects live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub state_dir: Option<PathBuf>,
    pub object_dir: Option<PathBuf>,
    pub public_base_url: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_concurrent_chunks: defaults::MAX_CONCURRENT_CHUNKS,
            capacity_policy: CapacityPolicy::Queue,
            chunk_timeout_secs: None,
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            voice_id: defaults::DEFAULT_VOICE.to_string(),
            mp3_bitrate: defaults::DEFAULT_MP3_BITRATE,
        }
    }
}

impl StorageConfig {
    /// Stream state directory, defaulting to `<data dir>/voxcast/streams`.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("streams"))
    }

    /// Published object directory, defaulting to `<data dir>/voxcast/objects`.
    pub fn object_dir(&self) -> PathBuf {
        self.object_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("objects"))
    }

    /// Base URL for published objects, defaulting to a `file://` URL of the
    /// object directory.
    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("file://{}", self.object_dir().display()))
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voxcast")
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e.context(format!("Failed to load config from {}", path.display())))
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXCAST_SYNTH_ENDPOINT → synthesis.endpoint
    /// - VOXCAST_SYNTH_API_KEY → synthesis.api_key
    /// - VOXCAST_VOICE → synthesis.voice_id
    /// - VOXCAST_STATE_DIR → storage.state_dir
    /// - VOXCAST_PUBLIC_URL → storage.public_base_url
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("VOXCAST_SYNTH_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.synthesis.endpoint = Some(endpoint);
        }

        if let Ok(api_key) = std::env::var("VOXCAST_SYNTH_API_KEY")
            && !api_key.is_empty()
        {
            self.synthesis.api_key = Some(api_key);
        }

        if let Ok(voice) = std::env::var("VOXCAST_VOICE")
            && !voice.is_empty()
        {
            self.synthesis.voice_id = voice;
        }

        if let Ok(state_dir) = std::env::var("VOXCAST_STATE_DIR")
            && !state_dir.is_empty()
        {
            self.storage.state_dir = Some(PathBuf::from(state_dir));
        }

        if let Ok(url) = std::env::var("VOXCAST_PUBLIC_URL")
            && !url.is_empty()
        {
            self.storage.public_base_url = Some(url);
        }

        self
    }

    /// Reject values the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.stream.max_concurrent_chunks == 0 {
            return Err(invalid("stream.max_concurrent_chunks", "must be at least 1"));
        }
        if self.stream.chunk_timeout_secs == Some(0) {
            return Err(invalid("stream.chunk_timeout_secs", "must be greater than 0"));
        }
        if self.chunking.first_chunk_words == 0 {
            return Err(invalid("chunking.first_chunk_words", "must be at least 1"));
        }
        if self.chunking.chunk_words == 0 {
            return Err(invalid("chunking.chunk_words", "must be at least 1"));
        }
        if self.synthesis.mp3_bitrate == 0 {
            return Err(invalid("synthesis.mp3_bitrate", "must be greater than 0"));
        }
        if let Some(endpoint) = &self.synthesis.endpoint
            && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(invalid(
                "synthesis.endpoint",
                &format!("'{}' is not an http(s) URL", endpoint),
            ));
        }
        Ok(())
    }

    /// Orchestrator settings from the `[stream]` section.
    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            max_concurrent_chunks: self.stream.max_concurrent_chunks,
            capacity_policy: self.stream.capacity_policy,
            chunk_timeout: self.stream.chunk_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxcast/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxcast")
            .join("config.toml")
    }
}

fn invalid(key: &str, message: &str) -> VoxcastError {
    VoxcastError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
