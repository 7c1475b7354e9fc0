//! Command-line interface for voxcast
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Progressive text-to-speech streams with a word-synced transcript
#[derive(Parser, Debug)]
#[command(
    name = "voxcast",
    version,
    about = "Progressive text-to-speech streams with a word-synced transcript"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug logs, -vv: trace logs)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a per-chunk timeout string into a Duration.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`), and compound (`1m30s`).
pub fn parse_timeout(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    let duration = match s.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(s).map_err(|e| e.to_string())?,
    };
    if duration.is_zero() {
        return Err("timeout must be greater than zero".to_string());
    }
    Ok(duration)
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk a text file, synthesize it and publish the stream
    Generate {
        /// Text file to narrate
        file: PathBuf,

        /// Title stored in the transcript
        #[arg(long)]
        title: Option<String>,

        /// Identity of the source document (default: hash of the text)
        #[arg(long, value_name = "HASH")]
        url_hash: Option<String>,

        /// File with one chapter heading per line, in document order
        #[arg(long, value_name = "PATH")]
        headings: Option<PathBuf>,

        /// Chunks synthesized at once (overrides stream.max_concurrent_chunks)
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,

        /// Per-chunk timeout (e.g., 90s, 2m)
        #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
        timeout: Option<Duration>,
    },

    /// Show how a text file would be chunked, without synthesizing
    Plan {
        /// Text file to chunk
        file: PathBuf,
    },

    /// Show the status of a stream
    Status {
        /// Stream identifier
        stream_id: String,
    },

    /// List the chunks of a stream
    Chunks {
        /// Stream identifier
        stream_id: String,
    },

    /// Continue a stream that was interrupted while processing
    Resume {
        /// Stream identifier
        stream_id: String,

        /// The same text file the stream was generated from
        file: PathBuf,

        /// Title stored in the transcript
        #[arg(long)]
        title: Option<String>,

        /// File with one chapter heading per line, in document order
        #[arg(long, value_name = "PATH")]
        headings: Option<PathBuf>,
    },

    /// Accept the chunks completed so far as the final stream
    Partial {
        /// Stream identifier
        stream_id: String,
    },

    /// Find the word spoken at a playback position in a transcript
    Lookup {
        /// Transcript JSON file
        transcript: PathBuf,

        /// Playback position in seconds
        seconds: f64,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}
