//! Conditional LZ4 compression for network payloads.
//!
//! Full snapshots grow with the car count and dominate bandwidth; they are
//! compressed with LZ4 before framing. Small messages (deltas, inputs,
//! identity updates) skip compression to avoid the overhead.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

/// Compression flag: payload is uncompressed.
pub const COMPRESSION_FLAG_NONE: u8 = 0x00;

/// Compression flag: payload is LZ4-compressed.
pub const COMPRESSION_FLAG_LZ4: u8 = 0x01;

/// Controls when payloads are compressed.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Minimum serialized size (bytes) before compression is applied.
    /// Default: 256.
    pub threshold: usize,
    /// Whether compression is enabled at all. Default: `true`.
    pub enabled: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold: 256,
            enabled: true,
        }
    }
}

/// Errors that can occur unwrapping a compressed payload.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// The payload was empty (no flag byte).
    #[error("empty payload — no compression flag")]
    EmptyPayload,

    /// The flag byte is not a known compression scheme.
    #[error("unknown compression flag: {0}")]
    UnknownFlag(u8),

    /// LZ4 decompression failed.
    #[error("decompression error: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),
}

/// Wrap a serialized message payload with optional compression.
///
/// Input: the versioned message bytes. Output: compression flag byte +
/// (possibly compressed) data, ready for framing.
pub fn compress_payload(data: &[u8], config: &CompressionConfig) -> Vec<u8> {
    if !config.enabled || data.len() < config.threshold {
        let mut out = Vec::with_capacity(1 + data.len());
        out.push(COMPRESSION_FLAG_NONE);
        out.extend_from_slice(data);
        return out;
    }

    let compressed = compress_prepend_size(data);
    // LZ4 can expand incompressible input; fall back to raw when it does.
    if compressed.len() >= data.len() {
        let mut out = Vec::with_capacity(1 + data.len());
        out.push(COMPRESSION_FLAG_NONE);
        out.extend_from_slice(data);
        return out;
    }

    let mut out = Vec::with_capacity(1 + compressed.len());
    out.push(COMPRESSION_FLAG_LZ4);
    out.extend_from_slice(&compressed);
    out
}

/// Unwrap a payload produced by [`compress_payload`], returning the
/// original message bytes.
pub fn decompress_payload(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let (&flag, body) = data.split_first().ok_or(CompressionError::EmptyPayload)?;
    match flag {
        COMPRESSION_FLAG_NONE => Ok(body.to_vec()),
        COMPRESSION_FLAG_LZ4 => Ok(decompress_size_prepended(body)?),
        other => Err(CompressionError::UnknownFlag(other)),
    }
}
