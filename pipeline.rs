//! Byte pipeline applied to every file the walker transforms.
//!
//! Stage order is fixed per direction:
//!
//! ```text
//! encrypt:  plaintext -> encrypt -> [compress] -> file
//! decrypt:  file -> [decompress] -> decrypt -> plaintext
//! ```
//!
//! Compression is the last encode step and the first decode step. Files
//! written by earlier runs depend on this order, so it must not be swapped
//! even though compressing ciphertext gains little.

use std::fmt;

use crate::compression::Compressor;
use crate::encryptor::Encryptor;
use crate::error::DirlockError;
use crate::key_manager::KeyMaterial;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

impl Direction {
    pub fn from_decode_flag(decode: bool) -> Self {
        if decode {
            Self::Decrypt
        } else {
            Self::Encrypt
        }
    }

    /// Past-tense verb used in log lines
    pub fn verb(self) -> &'static str {
        match self {
            Self::Encrypt => "encrypted",
            Self::Decrypt => "decrypted",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encrypt => f.write_str("encrypt"),
            Self::Decrypt => f.write_str("decrypt"),
        }
    }
}

pub struct TransformPipeline {
    direction: Direction,
    encryptor: Encryptor,
    compressor: Option<Compressor>,
}

impl TransformPipeline {
    pub fn new(direction: Direction, encryptor: Encryptor) -> Self {
        Self {
            direction,
            encryptor,
            compressor: None,
        }
    }

    pub fn from_key(direction: Direction, key: &KeyMaterial) -> Self {
        Self::new(direction, Encryptor::from_key(key))
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compressor = compress.then(Compressor::new);
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn compresses(&self) -> bool {
        self.compressor.is_some()
    }

    pub fn apply(&self, data: &[u8]) -> Result<Vec<u8>, DirlockError> {
        match self.direction {
            Direction::Encrypt => {
                let sealed = self.encryptor.encrypt(data)?;
                match &self.compressor {
                    Some(c) => c.compress(&sealed),
                    None => Ok(sealed),
                }
            }
            Direction::Decrypt => match &self.compressor {
                Some(c) => {
                    let sealed = c.decompress(data)?;
                    self.encryptor.decrypt(&sealed)
                }
                None => self.encryptor.decrypt(data),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn key() -> KeyMaterial {
        KeyMaterial::from_bytes([0x42; 32])
    }

    #[test]
    fn test_round_trip_both_modes() {
        let data = b"pipeline round trip".to_vec();
        for compress in [false, true] {
            let enc = TransformPipeline::from_key(Direction::Encrypt, &key()).with_compression(compress);
            let dec = TransformPipeline::from_key(Direction::Decrypt, &key()).with_compression(compress);
            let sealed = enc.apply(&data).unwrap();
            assert_ne!(sealed, data);
            assert_eq!(dec.apply(&sealed).unwrap(), data);
        }
    }

    #[test]
    fn test_compression_wraps_ciphertext() {
        let enc = TransformPipeline::from_key(Direction::Encrypt, &key()).with_compression(true);
        let out = enc.apply(b"hello").unwrap();

        // outermost layer is gzip, and inside it sits a crypto frame
        let mut inner = Vec::new();
        GzDecoder::new(out.as_slice()).read_to_end(&mut inner).unwrap();
        assert_eq!(inner[0], crate::encryptor::FRAME_VERSION);
        assert_eq!(Encryptor::from_key(&key()).decrypt(&inner).unwrap(), b"hello");
    }

    #[test]
    fn test_mismatched_compression_setting_fails() {
        let enc = TransformPipeline::from_key(Direction::Encrypt, &key());
        let dec = TransformPipeline::from_key(Direction::Decrypt, &key()).with_compression(true);
        let sealed = enc.apply(b"data").unwrap();
        assert!(matches!(dec.apply(&sealed), Err(DirlockError::Codec(_))));
    }

    #[test]
    fn test_direction_from_flag() {
        assert_eq!(Direction::from_decode_flag(true), Direction::Decrypt);
        assert_eq!(Direction::from_decode_flag(false), Direction::Encrypt);
        assert_eq!(Direction::Decrypt.to_string(), "decrypt");
    }
}
