use anyhow::{Context, Result};
use clap::Parser;
use dirlock::fixtures::{create_files_with, FixtureSpec};
use dirlock::protect::lexical_absolute;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Create dummy files to exercise dirlock against
#[derive(Parser, Debug)]
#[command(name = "dirlock-fixtures")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory to create files in
    #[arg(short, long, default_value = ".")]
    directory: PathBuf,

    /// Number of files to create
    #[arg(short, long, default_value_t = 10)]
    number: usize,

    /// Size of each file in KiB
    #[arg(short, long, default_value_t = 1024)]
    size: usize,

    /// Text to put in the files instead of zero bytes
    #[arg(short, long)]
    text: Option<String>,

    /// Number of concurrent writers
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Activate verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Only report errors
    #[arg(short = 'S', long, conflicts_with = "verbose")]
    silent: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.silent {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .init();

    let directory = lexical_absolute(&cli.directory).context("resolving target directory")?;
    let mut spec = FixtureSpec::new(directory, cli.number, cli.size << 10).with_workers(cli.workers);
    if let Some(text) = cli.text {
        spec = spec.with_content(text.into_bytes());
    }

    let pb = if cli.silent {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(spec.count as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
            .context("building progress style")?
            .progress_chars("#>-"),
    );
    let tick = pb.clone();

    let started = Instant::now();
    let report = create_files_with(&spec, move || tick.inc(1)).await?;
    pb.finish_and_clear();

    info!(elapsed = ?started.elapsed(), "fixtures ready");
    println!(
        "Created {} files in {} ({} failed)",
        report.created.len(),
        spec.directory.display(),
        report.failed
    );
    Ok(())
}
