//! gzip codec applied to whole buffers.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::DirlockError;

#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    level: Compression,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor {
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, DirlockError> {
        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(data)
            .map_err(|e| DirlockError::codec(format!("compression failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| DirlockError::codec(format!("compression failed: {}", e)))
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, DirlockError> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| DirlockError::codec(format!("decompression failed: {}", e)))?;
        Ok(out)
    }
}
