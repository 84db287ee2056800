//! Dummy file generator for building test trees.
//!
//! A fixed number of worker tasks drain a bounded job queue; every job writes
//! one file whose name is the SHA-1 hex digest of freshly generated random
//! bytes.

use anyhow::{bail, Context, Result};
use rand_core::{OsRng, RngCore};
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

const QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct FixtureSpec {
    pub directory: PathBuf,
    pub count: usize,
    /// Size in bytes of the random seed and of zero-filled content
    pub size: usize,
    /// File content; `size` zero bytes when absent
    pub content: Option<Vec<u8>>,
    pub workers: usize,
}

impl FixtureSpec {
    pub fn new(directory: impl Into<PathBuf>, count: usize, size: usize) -> Self {
        Self {
            directory: directory.into(),
            count,
            size,
            content: None,
            workers: 4,
        }
    }

    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

#[derive(Debug, Default)]
pub struct FixtureReport {
    pub created: Vec<PathBuf>,
    pub failed: usize,
}

/// Name derived from `size` random bytes
pub fn random_name(size: usize) -> String {
    let mut seed = vec![0u8; size.max(1)];
    OsRng.fill_bytes(&mut seed);
    hex::encode(Sha1::digest(&seed))
}

async fn create_one(directory: &Path, size: usize, content: &[u8]) -> Result<PathBuf> {
    let path = directory.join(random_name(size));
    fs::write(&path, content)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Create `spec.count` files. `on_done` is called once per finished job.
pub async fn create_files_with<F>(spec: &FixtureSpec, on_done: F) -> Result<FixtureReport>
where
    F: Fn() + Send + Sync + 'static,
{
    let meta = fs::metadata(&spec.directory)
        .await
        .with_context(|| format!("reading metadata for {}", spec.directory.display()))?;
    if !meta.is_dir() {
        bail!("{} is not a directory", spec.directory.display());
    }

    let content: Arc<Vec<u8>> = Arc::new(match &spec.content {
        Some(c) => c.clone(),
        None => vec![0u8; spec.size],
    });
    let (tx, rx) = mpsc::channel::<usize>(QUEUE_DEPTH);
    let rx = Arc::new(Mutex::new(rx));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Result<PathBuf>>();
    let on_done = Arc::new(on_done);

    let workers = spec.workers.clamp(1, spec.count.max(1));
    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let rx = rx.clone();
        let done_tx = done_tx.clone();
        let content = content.clone();
        let directory = spec.directory.clone();
        let size = spec.size;
        let on_done = on_done.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let job = rx.lock().await.recv().await;
                let Some(n) = job else { break };
                debug!(worker, job = n, "creating file");
                let result = create_one(&directory, size, &content).await;
                on_done();
                if done_tx.send(result).is_err() {
                    break;
                }
            }
        }));
    }
    drop(done_tx);

    for n in 0..spec.count {
        tx.send(n).await.context("fixture workers stopped early")?;
    }
    drop(tx);

    let mut report = FixtureReport::default();
    while let Some(result) = done_rx.recv().await {
        match result {
            Ok(path) => {
                info!(path = %path.display(), "created file");
                report.created.push(path);
            }
            Err(e) => {
                error!(error = %e, "failed to create file");
                report.failed += 1;
            }
        }
    }
    for handle in handles {
        handle.await.context("fixture worker panicked")?;
    }

    info!(
        created = report.created.len(),
        failed = report.failed,
        directory = %spec.directory.display(),
        "fixtures created"
    );
    Ok(report)
}

pub async fn create_files(spec: &FixtureSpec) -> Result<FixtureReport> {
    create_files_with(spec, || {}).await
}
