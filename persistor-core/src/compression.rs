/*!
Optional compression layer for stored blobs.

File backends can gzip the encoded store before it reaches the storage
adapter. When encryption is involved the blob is compressed first, since
ciphertext does not compress.
*/

use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use tracing::debug;

use crate::{PersistError, Result};

/// Compression abstraction for encoded stores
pub trait CompressionAdapter {
    /// Compress the input data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress the input data
    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>>;

    /// Get the name of the compression algorithm
    fn algorithm_name(&self) -> &str;
}

/// First two bytes of every gzip member
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Gzip compression adapter
///
/// Reading accepts uncompressed blobs as well: a store written before
/// compression was switched on is returned unchanged. Neither JSON nor
/// MessagePack stores can start with the gzip magic bytes.
///
/// # Example
/// ```rust
/// use persistor_core::{CompressionAdapter, GzipCompressor};
///
/// let compressor = GzipCompressor::new();
/// let data = br#"{"data_entities":[]}"#;
/// let compressed = compressor.compress(data)?;
/// assert_eq!(compressor.decompress(&compressed)?, data);
/// assert_eq!(compressor.decompress(data)?, data);
/// # Ok::<(), persistor_core::PersistError>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: u32,
}

impl GzipCompressor {
    /// Gzip at the default level (6)
    pub fn new() -> Self {
        Self {
            level: Compression::default().level(),
        }
    }

    /// Gzip at `level`, clamped to 0-9
    pub fn with_level(level: u32) -> Self {
        Self { level: level.min(9) }
    }

    pub fn level(&self) -> u32 {
        self.level
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `data` starts like a gzip stream
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

impl CompressionAdapter for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(self.level));
        encoder
            .write_all(data)
            .and_then(|_| encoder.finish())
            .map_err(|e| PersistError::compression(format!("Failed to gzip store: {e}")))
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        if !is_gzip(compressed_data) {
            debug!(bytes = compressed_data.len(), "Store is not gzipped; reading as is");
            return Ok(compressed_data.to_vec());
        }

        let mut store = Vec::with_capacity(compressed_data.len() * 2);
        GzDecoder::new(compressed_data)
            .read_to_end(&mut store)
            .map_err(|e| PersistError::compression(format!("Failed to gunzip store: {e}")))?;
        Ok(store)
    }

    fn algorithm_name(&self) -> &str {
        "gzip"
    }
}

/// Pass-through adapter, the default for every backend
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl NoCompression {
    pub fn new() -> Self {
        Self
    }
}

impl CompressionAdapter for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        Ok(compressed_data.to_vec())
    }

    fn algorithm_name(&self) -> &str {
        "none"
    }
}
