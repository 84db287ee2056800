use anyhow::{Context, Result};
use clap::Parser;
use dirlock::config::{self, Anchors, JsonConfigSource, RunOptions, DEFAULT_CONFIG_FILE};
use dirlock::key_manager::{KeyPersistence, KeySink};
use dirlock::pipeline::{Direction, TransformPipeline};
use dirlock::walker::DirectoryWalker;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// dirlock - Encrypt or decrypt every file below a directory, in place
#[derive(Parser, Debug)]
#[command(name = "dirlock")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file to use
    #[arg(short = 'f', long, default_value = DEFAULT_CONFIG_FILE)]
    config_file: PathBuf,

    /// Configuration section to use (defaults to the DEFAULT section)
    #[arg(short = 'c', long)]
    configuration: Option<String>,

    /// Decrypt files instead of encrypting them
    #[arg(short, long)]
    decode: bool,

    /// Gzip ciphertext after encryption (and gunzip before decryption)
    #[arg(short = 'z', long)]
    compress: bool,

    /// Activate verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Only report errors
    #[arg(long, conflicts_with = "verbose")]
    silent: bool,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        if self.silent {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --verbose / --silent
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let options = RunOptions {
        direction: Direction::from_decode_flag(cli.decode),
        compress: cli.compress,
    };
    debug!(?cli, "dirlock starting");

    let (source, config_file) = JsonConfigSource::load_with_env(&cli.config_file)?;
    debug!(sections = ?source.section_names().collect::<Vec<_>>(), "config sections");
    let anchors = Anchors::from_process(&config_file).context("locating the running executable")?;
    let resolution = config::resolve(&source, cli.configuration.as_deref(), &anchors, options)?;
    let cfg = resolution.config;

    // the key must be surfaced before any file is rewritten with it
    if resolution.generated_key {
        let sink = KeySink::new(cfg.backup.clone());
        if let KeyPersistence::Failed(reason) = sink.persist(&cfg.key, &mut tokio::io::stdout()).await {
            warn!(%reason, "generated key was not persisted");
        }
    }

    let pipeline = TransformPipeline::from_key(cfg.direction, &cfg.key).with_compression(cfg.compress);
    let walker = DirectoryWalker::new(pipeline, cfg.protected);

    let started = Instant::now();
    let report = walker
        .walk(&cfg.target)
        .await
        .with_context(|| format!("cannot {} {}", cfg.direction, cfg.target.display()))?;

    info!(
        transformed = report.transformed(),
        skipped = report.skipped(),
        failed = report.failed(),
        "done"
    );
    if report.failed() > 0 {
        warn!(failed = report.failed(), "some entries could not be processed, see errors above");
    }
    debug!(elapsed = ?started.elapsed(), "finished");

    Ok(())
}
