// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the uncompressed, LZ4, and snappy body compression
//! methods of the native protocol.

use std::convert::TryInto;

use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

/// Frame body compression/decompression. Implementations operate on the whole
/// framed buffer: the 9-byte header stays in place, the body (with its four
/// length bytes) is swapped out, and the compression flag bit is maintained.
pub trait Compression: 'static + Sync + Send {
    /// The compression flag bit this implementation sets.
    const FLAG: u8;
    /// The STARTUP option value naming this algorithm, if any.
    const KIND: Option<&'static str>;
    /// Accepts a buffer with a header and decompresses it.
    fn decompress(mut buffer: Vec<u8>) -> Result<Vec<u8>, CompressionError> {
        if buffer.len() < 9 {
            return Err(CompressionError::SmallBuffer);
        }
        if buffer[1] & Self::FLAG == 0 {
            return Ok(buffer);
        }
        // Decompress the body and clear the flag bit
        let decompressed_buffer = Self::decompress_body(&buffer[5..])?;
        buffer[1] &= !Self::FLAG;
        buffer.resize(decompressed_buffer.len() + 5, 0);
        buffer[5..].copy_from_slice(&decompressed_buffer);
        Ok(buffer)
    }
    /// Accepts a body buffer with four byte length prepended
    fn decompress_body(buffer: &[u8]) -> Result<Vec<u8>, CompressionError>;
    /// Accepts a buffer with a header and compresses it.
    fn compress(mut buffer: Vec<u8>) -> Result<Vec<u8>, CompressionError> {
        if buffer.len() < 9 {
            return Err(CompressionError::SmallBuffer);
        }
        if Self::FLAG == 0 {
            return Ok(buffer);
        }
        // Compress the body
        let compressed_buffer = Self::compress_body(&buffer[5..])?;
        buffer[1] |= Self::FLAG;
        buffer.resize(compressed_buffer.len() + 5, 0);
        buffer[5..].copy_from_slice(&compressed_buffer);
        Ok(buffer)
    }
    /// Accepts a body buffer with four byte length prepended
    fn compress_body(buffer: &[u8]) -> Result<Vec<u8>, CompressionError>;
}

/// The compression algorithms the protocol knows, as config-facing values.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompressionType {
    #[serde(rename = "snappy")]
    Snappy,
    #[serde(rename = "lz4")]
    Lz4,
}

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("Failed to compress the frame: {0}")]
    BadCompression(anyhow::Error),
    #[error("Failed to decompress the frame: {0}")]
    BadDecompression(anyhow::Error),
    #[error("Buffer is too small")]
    SmallBuffer,
}

/// LZ4 unit structure which implements the compression trait.
#[derive(Debug, Copy, Clone)]
pub struct Lz4;
impl Compression for Lz4 {
    const FLAG: u8 = 1;
    const KIND: Option<&'static str> = Some("lz4");
    fn decompress_body(buffer: &[u8]) -> Result<Vec<u8>, CompressionError> {
        if buffer.len() < 8 {
            return Err(CompressionError::SmallBuffer);
        }
        let size = i32::from_be_bytes(buffer[4..8].try_into().map_err(|_| CompressionError::SmallBuffer)?);
        // lz4 fails on a zero-sized body, so skip it
        if size == 0 {
            return Ok(vec![0; 4]);
        }
        let mut body = lz4::block::decompress(&buffer[8..], Some(size))
            .map_err(|e| CompressionError::BadDecompression(e.into()))?;
        body.extend(&i32::to_be_bytes(body.len() as i32));
        body.rotate_right(4);
        Ok(body)
    }
    fn compress_body(buffer: &[u8]) -> Result<Vec<u8>, CompressionError> {
        if buffer.len() < 4 {
            return Err(CompressionError::SmallBuffer);
        }
        let mut body =
            lz4::block::compress(&buffer[4..], None, true).map_err(|e| CompressionError::BadCompression(e.into()))?;
        body.extend(&i32::to_be_bytes(body.len() as i32));
        body.rotate_right(4);
        Ok(body)
    }
}

/// Snappy unit structure which implements the compression trait.
#[derive(Debug, Copy, Clone)]
pub struct Snappy;
impl Compression for Snappy {
    const FLAG: u8 = 1;
    const KIND: Option<&'static str> = Some("snappy");
    fn decompress_body(buffer: &[u8]) -> Result<Vec<u8>, CompressionError> {
        if buffer.len() < 4 {
            return Err(CompressionError::SmallBuffer);
        }
        let mut body = snap::raw::Decoder::new()
            .decompress_vec(&buffer[4..])
            .map_err(|e| CompressionError::BadDecompression(e.into()))?;
        body.extend(&i32::to_be_bytes(body.len() as i32));
        body.rotate_right(4);
        Ok(body)
    }
    fn compress_body(buffer: &[u8]) -> Result<Vec<u8>, CompressionError> {
        if buffer.len() < 4 {
            return Err(CompressionError::SmallBuffer);
        }
        let mut body = snap::raw::Encoder::new()
            .compress_vec(&buffer[4..])
            .map_err(|e| CompressionError::BadCompression(e.into()))?;
        body.extend(&i32::to_be_bytes(body.len() as i32));
        body.rotate_right(4);
        Ok(body)
    }
}

/// Uncompressed unit structure which implements the compression trait.
#[derive(Debug, Copy, Clone)]
pub struct Uncompressed;
impl Compression for Uncompressed {
    const FLAG: u8 = 0;
    const KIND: Option<&'static str> = None;
    fn decompress_body(buffer: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Ok(buffer.to_vec())
    }
    fn compress_body(buffer: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Ok(buffer.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(body: &[u8]) -> Vec<u8> {
        let mut buffer = vec![0x84, 0, 0, 0, 0x08];
        buffer.extend((body.len() as i32).to_be_bytes());
        buffer.extend(body);
        buffer
    }

    #[test]
    fn lz4_roundtrip() {
        let original = framed(b"some rows result body that should compress and come back");
        let compressed = Lz4::compress(original.clone()).unwrap();
        assert_eq!(compressed[1] & Lz4::FLAG, Lz4::FLAG);
        let decompressed = Lz4::decompress(compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn snappy_roundtrip() {
        let original = framed(b"another body, fed through the snappy codec this time");
        let compressed = Snappy::compress(original.clone()).unwrap();
        let decompressed = Snappy::decompress(compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn uncompressed_passthrough() {
        let original = framed(b"left alone");
        assert_eq!(Uncompressed::compress(original.clone()).unwrap(), original);
        assert_eq!(Uncompressed::decompress(original.clone()).unwrap(), original);
    }
}
