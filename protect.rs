//! Paths the walker must never rewrite.
//!
//! Construction and membership both go through [`canonical_key`]. A path that
//! is compared in any other form may silently slip past the check.

use std::collections::HashSet;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Normalized string form of `path`: absolute, `.`/`..` removed, symlinks
/// resolved, lower-cased.
///
/// Only the deepest existing ancestor is resolved and the missing tail is
/// appended as-is, so a path maps to the same key before and after it is
/// created.
pub fn canonical_key(path: &Path) -> io::Result<String> {
    let absolute = lexical_absolute(path)?;
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    let resolved = loop {
        match std::fs::canonicalize(existing) {
            Ok(p) => break p,
            Err(_) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name);
                    existing = parent;
                }
                _ => break existing.to_path_buf(),
            },
        }
    };
    let resolved = missing
        .into_iter()
        .rev()
        .fold(resolved, |acc, name| acc.join(name));
    Ok(resolved.to_string_lossy().to_lowercase())
}

/// [`canonical_key`] off the async runtime threads
pub async fn canonical_key_async(path: &Path) -> io::Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || canonical_key(&path))
        .await
        .map_err(io::Error::other)?
}

/// Absolute path without touching the filesystem beyond the current directory.
pub fn lexical_absolute(path: &Path) -> io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedPaths {
    keys: HashSet<String>,
}

impl ProtectedPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list, ignoring blank items
    pub fn from_list(list: &str) -> io::Result<Self> {
        let mut set = Self::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            set.insert(Path::new(item))?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, path: &Path) -> io::Result<bool> {
        let key = canonical_key(path)?;
        debug!(path = %key, "protecting path");
        Ok(self.keys.insert(key))
    }

    pub fn extend<'a, I>(&mut self, paths: I) -> io::Result<()>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        for path in paths {
            self.insert(path)?;
        }
        Ok(())
    }

    pub fn contains(&self, path: &Path) -> io::Result<bool> {
        Ok(self.contains_key(&canonical_key(path)?))
    }

    /// Membership test for a key already produced by [`canonical_key`]
    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Comma-joined, sorted form for display
    pub fn to_list(&self) -> String {
        let mut keys: Vec<&str> = self.keys.iter().map(String::as_str).collect();
        keys.sort_unstable();
        keys.join(",")
    }
}
