//! In-place transformation of a directory tree.
//!
//! This module provides [`DirectoryWalker`], which visits every entry below a
//! root directory depth-first and rewrites each regular file through a
//! [`TransformPipeline`].
//!
//! ## Guarantees
//!
//! - Protected paths are never read or written, and never descended into
//! - A failure on one entry is recorded and the walk moves on to its siblings
//! - Only a missing or non-directory root aborts the walk
//! - The walker never creates or deletes files; symlinks and special files
//!   are left alone
//!
//! Entries are processed strictly one after another. Open directory handles
//! live on an explicit stack, so tree depth is bounded by file descriptors
//! rather than by the call stack.

use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry, ReadDir};
use tracing::{debug, error, info, warn};

use crate::error::DirlockError;
use crate::pipeline::TransformPipeline;
use crate::protect::{canonical_key_async, ProtectedPaths};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Path is in the protected set
    Protected,
    /// Symlink, socket, device or other non-regular entry
    NotRegular,
}

#[derive(Debug)]
pub enum TraversalOutcome {
    Transformed,
    Skipped(SkipReason),
    RecursedInto,
    Failed(DirlockError),
}

impl TraversalOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug)]
pub struct EntryOutcome {
    pub path: PathBuf,
    pub outcome: TraversalOutcome,
}

/// Every outcome of one walk, in visiting order
#[derive(Debug, Default)]
pub struct WalkReport {
    entries: Vec<EntryOutcome>,
}

impl WalkReport {
    fn push(&mut self, path: PathBuf, outcome: TraversalOutcome) {
        self.entries.push(EntryOutcome { path, outcome });
    }

    pub fn entries(&self) -> &[EntryOutcome] {
        &self.entries
    }

    /// Outcome recorded for `path`, if it was visited
    pub fn outcome_for(&self, path: &Path) -> Option<&TraversalOutcome> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| &e.outcome)
    }

    pub fn transformed(&self) -> usize {
        self.count(|o| matches!(o, TraversalOutcome::Transformed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TraversalOutcome::Skipped(_)))
    }

    pub fn directories(&self) -> usize {
        self.count(|o| matches!(o, TraversalOutcome::RecursedInto))
    }

    pub fn failed(&self) -> usize {
        self.count(TraversalOutcome::is_failure)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &DirlockError)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            TraversalOutcome::Failed(err) => Some((e.path.as_path(), err)),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&TraversalOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}

struct Frame {
    path: PathBuf,
    entries: ReadDir,
}

enum Visit {
    Descend(ReadDir),
    Done(TraversalOutcome),
}

pub struct DirectoryWalker {
    pipeline: TransformPipeline,
    protected: ProtectedPaths,
}

impl DirectoryWalker {
    pub fn new(pipeline: TransformPipeline, protected: ProtectedPaths) -> Self {
        Self {
            pipeline,
            protected,
        }
    }

    pub async fn walk(&self, root: &Path) -> Result<WalkReport, DirlockError> {
        let root_entries = match fs::metadata(root).await {
            Ok(meta) if meta.is_dir() => fs::read_dir(root).await.map_err(|e| {
                DirlockError::critical(format!("cannot list {}: {}", root.display(), e))
            })?,
            Ok(_) => {
                error!(path = %root.display(), "walk root is not a directory");
                return Err(DirlockError::critical(format!(
                    "{} is not a directory",
                    root.display()
                )));
            }
            Err(e) => {
                error!(path = %root.display(), error = %e, "walk root is not accessible");
                return Err(DirlockError::critical(format!(
                    "{} is not accessible: {}",
                    root.display(),
                    e
                )));
            }
        };

        let direction = self.pipeline.direction();
        debug!(
            root = %root.display(),
            %direction,
            compress = self.pipeline.compresses(),
            protected = self.protected.len(),
            "starting walk"
        );
        if self.protected.is_empty() {
            warn!(root = %root.display(), "walking with no protected paths");
        }

        let mut report = WalkReport::default();
        let mut stack = vec![Frame {
            path: root.to_path_buf(),
            entries: root_entries,
        }];

        while let Some(frame) = stack.last_mut() {
            let entry = match frame.entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    debug!(dir = %frame.path.display(), "directory done");
                    stack.pop();
                    continue;
                }
                Err(e) => {
                    let err = DirlockError::io_at(&frame.path, e);
                    error!(path = %frame.path.display(), error = %err, "failed to list directory");
                    report.push(frame.path.clone(), TraversalOutcome::Failed(err));
                    stack.pop();
                    continue;
                }
            };

            let path = entry.path();
            let outcome = match self.visit(&entry, &path).await {
                Ok(Visit::Descend(entries)) => {
                    debug!(path = %path.display(), "entering directory");
                    stack.push(Frame {
                        path: path.clone(),
                        entries,
                    });
                    TraversalOutcome::RecursedInto
                }
                Ok(Visit::Done(outcome)) => outcome,
                Err(e) => TraversalOutcome::Failed(e),
            };

            match &outcome {
                TraversalOutcome::Transformed => {
                    info!(path = %path.display(), "{}", direction.verb())
                }
                TraversalOutcome::Skipped(SkipReason::Protected) => {
                    debug!(path = %path.display(), "skipping protected path")
                }
                TraversalOutcome::Skipped(SkipReason::NotRegular) => {
                    debug!(path = %path.display(), "skipping non-regular entry")
                }
                TraversalOutcome::RecursedInto => {}
                TraversalOutcome::Failed(e) => {
                    error!(path = %path.display(), error = %e, "failed to {} entry", direction)
                }
            }
            report.push(path, outcome);
        }

        debug!(
            transformed = report.transformed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "walk finished"
        );
        Ok(report)
    }

    async fn visit(&self, entry: &DirEntry, path: &Path) -> Result<Visit, DirlockError> {
        let key = canonical_key_async(path)
            .await
            .map_err(|e| DirlockError::io_at(path, e))?;
        if self.protected.contains_key(&key) {
            return Ok(Visit::Done(TraversalOutcome::Skipped(SkipReason::Protected)));
        }

        let file_type = entry
            .file_type()
            .await
            .map_err(|e| DirlockError::io_at(path, e))?;

        if file_type.is_dir() {
            let entries = fs::read_dir(path)
                .await
                .map_err(|e| DirlockError::io_at(path, e))?;
            return Ok(Visit::Descend(entries));
        }
        if !file_type.is_file() {
            return Ok(Visit::Done(TraversalOutcome::Skipped(SkipReason::NotRegular)));
        }

        self.transform_file(path).await?;
        Ok(Visit::Done(TraversalOutcome::Transformed))
    }

    async fn transform_file(&self, path: &Path) -> Result<(), DirlockError> {
        let data = fs::read(path)
            .await
            .map_err(|e| DirlockError::io_at(path, e))?;
        let out = self.pipeline.apply(&data)?;
        fs::write(path, &out)
            .await
            .map_err(|e| DirlockError::io_at(path, e))?;
        debug!(path = %path.display(), before = data.len(), after = out.len(), "file rewritten");
        Ok(())
    }
}
