//! Authenticated encryption of whole in-memory buffers.
//!
//! ## Frame Format
//!
//! ```text
//! [version:1][timestamp:8][nonce:24][ciphertext + tag:16]
//! ```
//!
//! The version byte and the big-endian creation timestamp (unix seconds) are
//! bound into the tag as associated data, so tampering with either fails
//! authentication like any other modification.

use chacha20poly1305::aead::{Aead, AeadCore, OsRng, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::DirlockError;
use crate::key_manager::KeyMaterial;

pub const FRAME_VERSION: u8 = 0x80;
const TIMESTAMP_LEN: usize = 8;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + TIMESTAMP_LEN;

/// Smallest valid frame: header, nonce and the tag of an empty message
pub const MIN_FRAME_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

pub struct Encryptor {
    cipher: XChaCha20Poly1305,
}

impl Encryptor {
    pub fn new(cipher: XChaCha20Poly1305) -> Self {
        Self { cipher }
    }

    pub fn from_key(key: &KeyMaterial) -> Self {
        Self::new(key.cipher())
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, DirlockError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let mut header = [0u8; HEADER_LEN];
        header[0] = FRAME_VERSION;
        header[1..].copy_from_slice(&now.to_be_bytes());

        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: &header,
                },
            )
            .map_err(|e| DirlockError::encryption(format!("encryption failed: {}", e)))?;

        let mut frame = Vec::with_capacity(HEADER_LEN + NONCE_LEN + ciphertext.len());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&nonce);
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    pub fn decrypt(&self, frame: &[u8]) -> Result<Vec<u8>, DirlockError> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(DirlockError::integrity(format!(
                "ciphertext too short ({} bytes)",
                frame.len()
            )));
        }
        if frame[0] != FRAME_VERSION {
            return Err(DirlockError::integrity(format!(
                "unknown frame version 0x{:02x}",
                frame[0]
            )));
        }

        let (header, rest) = frame.split_at(HEADER_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        #[allow(deprecated)]
        let nonce = XNonce::from_slice(nonce);

        self.cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| DirlockError::integrity("authentication failed: wrong key or modified data"))
    }
}
