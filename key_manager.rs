//! Key material and key persistence.
//!
//! This module provides [`KeyMaterial`], the 256-bit key every file is sealed
//! under, and [`KeySink`], which surfaces a freshly generated key to the
//! operator so that encrypted trees stay recoverable.
//!
//! ## Key Text Form
//!
//! Keys are exchanged as URL-safe base64 (44 characters, padded). This is the
//! form stored in the configuration `key` field and in the backup file.
//!
//! ## Security Features
//!
//! - Keys are zeroized on drop (via `Zeroize` trait)
//! - Backup files are created with Unix permissions 0600
//! - Cryptographically secure random generation via `OsRng`

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305};
use rand_core::{OsRng, RngCore};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::error::DirlockError;

/// Raw key length in bytes
pub const KEY_LEN: usize = 32;

/// Symmetric key used by the crypto stage. Immutable once built.
pub struct KeyMaterial {
    key_bytes: [u8; KEY_LEN],
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.key_bytes.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial(..)")
    }
}

impl KeyMaterial {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        let mut key_bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key_bytes);
        Self { key_bytes }
    }

    pub fn from_bytes(key_bytes: [u8; KEY_LEN]) -> Self {
        Self { key_bytes }
    }

    /// Decode the base64 text form found in configuration
    pub fn from_encoded(text: &str) -> Result<Self, DirlockError> {
        let mut data = URL_SAFE
            .decode(text.trim())
            .map_err(|e| DirlockError::config(format!("key is not valid base64: {}", e)))?;
        if data.len() != KEY_LEN {
            let found = data.len();
            data.zeroize();
            return Err(DirlockError::config(format!(
                "expected {}-byte key but decoded {} bytes",
                KEY_LEN, found
            )));
        }
        let mut key_bytes = [0u8; KEY_LEN];
        key_bytes.copy_from_slice(&data);
        data.zeroize();
        Ok(Self { key_bytes })
    }

    /// Text form suitable for configuration files and the backup file
    pub fn encoded(&self) -> String {
        URL_SAFE.encode(self.key_bytes)
    }

    pub fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.key_bytes))
    }
}

/// What happened to a freshly generated key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPersistence {
    /// Appended to the backup file at this path
    Appended(PathBuf),
    /// Written to the operator output because no backup file is configured
    Emitted,
    /// Could not be persisted; the run continues with the in-memory key
    Failed(String),
}

/// Persists generated keys so encrypted trees can be reversed later.
#[derive(Debug, Clone)]
pub struct KeySink {
    backup: Option<PathBuf>,
}

impl KeySink {
    pub fn new(backup: Option<PathBuf>) -> Self {
        Self { backup }
    }

    /// Surface `key` to the operator. Never fails: problems are logged and
    /// reported as [`KeyPersistence::Failed`].
    pub async fn persist<W>(&self, key: &KeyMaterial, out: &mut W) -> KeyPersistence
    where
        W: AsyncWrite + Unpin,
    {
        match &self.backup {
            Some(path) => match append_key(path, &key.encoded()).await {
                Ok(()) => {
                    info!(path = %path.display(), "key appended to backup file");
                    KeyPersistence::Appended(path.clone())
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not write key backup, continuing with in-memory key");
                    KeyPersistence::Failed(e.to_string())
                }
            },
            None => {
                warn!("no backup file configured: the key below is the only way to reverse this run");
                let line = format!("{}\n", key.encoded());
                let written = async {
                    out.write_all(line.as_bytes()).await?;
                    out.flush().await
                }
                .await;
                match written {
                    Ok(()) => KeyPersistence::Emitted,
                    Err(e) => {
                        warn!(error = %e, "could not emit key");
                        KeyPersistence::Failed(e.to_string())
                    }
                }
            }
        }
    }
}

async fn append_key(path: &Path, encoded: &str) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut f = options.open(path).await?;
    f.write_all(format!("\n{}", encoded).as_bytes()).await?;
    f.flush().await
}
