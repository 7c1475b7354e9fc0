use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use voxcast::cli::{Cli, Commands, ConfigAction};
use voxcast::config::Config;
use voxcast::playback::PlaybackIndexer;
use voxcast::stream::{
    ChunkStatus, DispatchHandle, DispatchRequest, FileStore, StreamOrchestrator, StreamOutcome,
    StreamRecord, StreamStatus, StreamStore,
};
use voxcast::synth::HttpSynthesizer;
use voxcast::text::{TextChunk, chunk_text, content_hash, estimate_total_duration};
use voxcast::transcript::{ChapterMarker, TranscriptDocument, locate_headings};
use voxcast::upload::FsUploader;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Generate {
            file,
            title,
            url_hash,
            headings,
            concurrency,
            timeout,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(limit) = concurrency {
                config.stream.max_concurrent_chunks = limit;
            }
            if let Some(timeout) = timeout {
                config.stream.chunk_timeout_secs = Some(timeout.as_secs().max(1));
            }
            config.validate()?;

            let source = SourceText::read(&file, &config)?;
            let chapters = source.chapters(headings.as_deref())?;
            let title = title.unwrap_or_else(|| default_title(&file));
            let url_hash = url_hash.unwrap_or_else(|| content_hash(&source.flattened));

            let orchestrator = build_orchestrator(&config).await?;
            let handle = orchestrator
                .generate(&url_hash, &source.chunks, &title, chapters)
                .await?;
            if !cli.quiet {
                println!(
                    "{} {} ({} chunks, ~{}s of audio)",
                    "Stream:".dimmed(),
                    handle.stream_id(),
                    source.chunks.len(),
                    estimate_total_duration(&source.chunks)
                );
            }
            finish_dispatch(&orchestrator, handle, cli.quiet).await?;
        }
        Commands::Plan { file } => {
            let config = load_config(cli.config.as_deref())?;
            let source = SourceText::read(&file, &config)?;
            print_plan(&source.chunks);
        }
        Commands::Status { stream_id } => {
            let config = load_config(cli.config.as_deref())?;
            let store = open_store(&config).await?;
            let stream = require_stream(&store, &stream_id).await?;
            print_stream(&stream);
        }
        Commands::Chunks { stream_id } => {
            let config = load_config(cli.config.as_deref())?;
            let store = open_store(&config).await?;
            require_stream(&store, &stream_id).await?;
            for chunk in store.list_chunks(&stream_id).await? {
                let status = match chunk.status {
                    ChunkStatus::Ready => chunk.status.green().to_string(),
                    ChunkStatus::Failed => chunk.status.red().to_string(),
                    _ => chunk.status.yellow().to_string(),
                };
                let duration = chunk
                    .duration_seconds
                    .map(|d| format!("{:.2}s", d))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  [{:>3}] {:<10} {:>8}  {:>4} words  {}",
                    chunk.chunk_index,
                    status,
                    duration,
                    chunk.word_count,
                    chunk.text_preview.dimmed()
                );
                if let Some(error) = &chunk.error_message {
                    println!("        {} {}", "Error:".red(), error);
                }
            }
        }
        Commands::Resume {
            stream_id,
            file,
            title,
            headings,
        } => {
            let config = load_config(cli.config.as_deref())?;
            config.validate()?;
            let source = SourceText::read(&file, &config)?;
            let chapters = source.chapters(headings.as_deref())?;
            let title = title.unwrap_or_else(|| default_title(&file));

            let orchestrator = build_orchestrator(&config).await?;
            let request = DispatchRequest::from_chunks(&source.chunks)
                .with_title(title)
                .with_chapters(chapters);
            let handle = orchestrator.resume(&stream_id, request).await?;
            finish_dispatch(&orchestrator, handle, cli.quiet).await?;
        }
        Commands::Partial { stream_id } => {
            let config = load_config(cli.config.as_deref())?;
            let orchestrator = build_orchestrator(&config).await?;
            let stream = orchestrator.accept_partial(&stream_id).await?;
            if !cli.quiet {
                print_stream(&stream);
            }
        }
        Commands::Lookup {
            transcript,
            seconds,
        } => {
            let json = std::fs::read_to_string(&transcript)
                .with_context(|| format!("Failed to read {}", transcript.display()))?;
            let document = TranscriptDocument::from_json(&json)
                .with_context(|| format!("Invalid transcript {}", transcript.display()))?;
            let indexer = PlaybackIndexer::new(document);

            let Some(index) = indexer.word_at(seconds) else {
                bail!("Transcript {} has no words", transcript.display());
            };
            let word = &indexer.document().words[index];
            print!(
                "{} {} [{:.2}s - {:.2}s]",
                format!("#{}", index).dimmed(),
                word.text.bold(),
                word.start_ts,
                word.end_ts
            );
            match indexer.chapter_of_word(index) {
                Some(chapter) => println!("  {} {}", "Chapter:".dimmed(), chapter.title),
                None => println!(),
            }
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "voxcast",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Route logs to stderr. `RUST_LOG` wins over the verbosity flags.
fn init_logging(quiet: bool, verbose: u8) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "voxcast=debug",
        (false, _) => "voxcast=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Only fails if a subscriber is already set
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

/// Load configuration from custom path or default location
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path())?,
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}

async fn open_store(config: &Config) -> Result<Arc<FileStore>> {
    let state_dir = config.storage.state_dir();
    let store = FileStore::open(&state_dir)
        .await
        .with_context(|| format!("Failed to open stream state in {}", state_dir.display()))?;
    Ok(Arc::new(store))
}

async fn build_orchestrator(config: &Config) -> Result<StreamOrchestrator> {
    let Some(endpoint) = &config.synthesis.endpoint else {
        bail!(
            "No synthesis endpoint configured. Set synthesis.endpoint in {} or VOXCAST_SYNTH_ENDPOINT",
            Config::default_path().display()
        );
    };

    let mut synthesizer = HttpSynthesizer::new(endpoint)
        .with_voice(&config.synthesis.voice_id)
        .with_bitrate(config.synthesis.mp3_bitrate);
    if let Some(api_key) = &config.synthesis.api_key {
        synthesizer = synthesizer.with_api_key(api_key);
    }

    let uploader = FsUploader::new(
        config.storage.object_dir(),
        config.storage.public_base_url(),
    );
    let store = open_store(config).await?;

    Ok(StreamOrchestrator::with_options(
        store,
        Arc::new(synthesizer),
        Arc::new(uploader),
        config.orchestrator_options(),
    ))
}

async fn require_stream(store: &FileStore, stream_id: &str) -> Result<StreamRecord> {
    match store.get_stream(stream_id).await? {
        Some(stream) => Ok(stream),
        None => bail!("No stream with id {}", stream_id),
    }
}

/// Waits for a dispatch; Ctrl-C stops dispatching and then offers the
/// finished prefix as a partial stream.
async fn finish_dispatch(
    orchestrator: &StreamOrchestrator,
    handle: DispatchHandle,
    quiet: bool,
) -> Result<()> {
    let stream_id = handle.stream_id().to_string();
    let canceller = handle.canceller();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; waiting for running chunks");
            canceller.cancel();
            true
        } else {
            false
        }
    });

    let outcome = handle.wait().await;
    let interrupted = if interrupt.is_finished() {
        interrupt.await.unwrap_or(false)
    } else {
        interrupt.abort();
        false
    };
    let outcome = outcome?;

    if interrupted && outcome.status() == StreamStatus::Processing {
        if outcome.stream.chunks_completed == 0 {
            if !quiet {
                println!(
                    "{} nothing ready yet; resume with `voxcast resume {} <file>`",
                    "Interrupted:".yellow(),
                    stream_id
                );
            }
            return Ok(());
        }
        let stream = orchestrator.accept_partial(&stream_id).await?;
        if !quiet {
            print_stream(&stream);
        }
        return Ok(());
    }

    if !quiet {
        report_outcome(&outcome);
    }
    if outcome.status() == StreamStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

fn report_outcome(outcome: &StreamOutcome) {
    print_stream(&outcome.stream);
    if !outcome.words.is_empty() {
        println!("  {}     {}", "Words:".dimmed(), outcome.words.len());
    }
}

fn print_stream(stream: &StreamRecord) {
    let status = match stream.status {
        StreamStatus::Ready => stream.status.green().to_string(),
        StreamStatus::Failed => stream.status.red().to_string(),
        _ => stream.status.yellow().to_string(),
    };
    println!("  {}    {}", "Stream:".dimmed(), stream.id);
    println!("  {}    {}", "Status:".dimmed(), status);
    println!(
        "  {}    {}/{}",
        "Chunks:".dimmed(),
        stream.chunks_completed,
        stream.total_chunks
    );
    if let Some(duration) = stream.total_duration_seconds {
        println!("  {}  {:.1}s", "Duration:".dimmed(), duration);
    }
    if let Some(url) = &stream.manifest_url {
        println!("  {}  {}", "Playlist:".dimmed(), url);
    }
    if let Some(url) = &stream.transcript_url {
        println!("  {} {}", "Transcript:".dimmed(), url);
    }
    if let (Some(index), Some(error)) = (stream.failed_chunk, &stream.error_message) {
        println!("  {}     chunk {}: {}", "Error:".red(), index, error);
    }
}

fn print_plan(chunks: &[TextChunk]) {
    for chunk in chunks {
        println!(
            "  [{:>3}] {:>4} words  {}",
            chunk.index,
            chunk.word_count,
            voxcast::text::text_preview(&chunk.text, 60).dimmed()
        );
    }
    println!(
        "{} chunks, ~{}s of audio",
        chunks.len(),
        estimate_total_duration(chunks)
    );
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
    }
    Ok(())
}

fn default_title(file: &Path) -> String {
    file.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string())
}

/// A source file read and chunked with the configured targets.
struct SourceText {
    /// Words joined by single spaces; chapter offsets refer to this text.
    flattened: String,
    chunks: Vec<TextChunk>,
}

impl SourceText {
    fn read(path: &Path, config: &Config) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let flattened = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&flattened, &config.chunking);
        if chunks.is_empty() {
            bail!("{} contains no text", path.display());
        }
        Ok(Self { flattened, chunks })
    }

    /// Chapter markers for the headings listed one per line in `headings`.
    fn chapters(&self, headings: Option<&Path>) -> Result<Vec<ChapterMarker>> {
        let Some(path) = headings else {
            return Ok(Vec::new());
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let titles: Vec<&str> = contents.lines().collect();
        let markers = locate_headings(&self.flattened, &titles);
        let missing = titles
            .iter()
            .filter(|t| !t.trim().is_empty())
            .count()
            .saturating_sub(markers.len());
        if missing > 0 {
            tracing::warn!(missing, "some headings were not found in the text");
        }
        Ok(markers)
    }
}
