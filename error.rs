use std::path::Path;
use thiserror::Error;

/// Error types for dirlock operations
#[derive(Debug, Error)]
pub enum DirlockError {
    /// Invalid configuration (bad target, undecodable key, missing section).
    /// Fatal: raised before any file is touched.
    #[error("Config error: {0}")]
    Config(String),

    /// The walk root is missing or not a directory. Fatal for the whole walk.
    #[error("Critical error: {0}")]
    Critical(String),

    /// Encryption operation failures
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Ciphertext rejected: corrupted, truncated or sealed under another key
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Malformed compressed data
    #[error("Codec error: {0}")]
    Codec(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl DirlockError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn critical(msg: impl Into<String>) -> Self {
        Self::Critical(msg.into())
    }

    pub fn encryption(msg: impl Into<String>) -> Self {
        Self::Encryption(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// Wrap an I/O error together with the path it happened on
    pub fn io_at(path: &Path, err: std::io::Error) -> Self {
        Self::Io(format!("{}: {}", path.display(), err))
    }

    /// Fatal errors stop the run; everything else is recovered per entry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Critical(_))
    }
}

impl From<std::io::Error> for DirlockError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
