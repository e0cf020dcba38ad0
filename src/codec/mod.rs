//! Block compression codecs for object container files.
//!
//! Each block's serialized datums are compressed as a unit. The codec name is stored
//! in the file header under `avro.codec`.

use bytes::Bytes;

use crate::error::CodecError;

#[cfg(feature = "deflate")]
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};

#[cfg(any(feature = "deflate", feature = "zstd"))]
use std::io::{Read, Write};

/// Length of the big-endian CRC32 that follows snappy-compressed data.
#[cfg(feature = "snappy")]
const SNAPPY_CRC_LEN: usize = 4;

/// Compression codec used within container blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    /// No compression
    #[default]
    Null,
    /// Raw DEFLATE (RFC 1951), no zlib or gzip wrapper
    Deflate,
    /// Snappy with a 4-byte CRC32 suffix of the uncompressed data
    Snappy,
    /// Zstandard frames
    Zstandard,
}

impl Codec {
    /// Parse a codec from its header name.
    ///
    /// # Examples
    /// ```
    /// use jetcodec::codec::Codec;
    ///
    /// assert_eq!(Codec::from_name("null").unwrap(), Codec::Null);
    /// assert_eq!(Codec::from_name("zstd").unwrap(), Codec::Zstandard);
    /// assert!(Codec::from_name("lz4").is_err());
    /// ```
    pub fn from_name(name: &str) -> Result<Self, CodecError> {
        match name {
            "null" => Ok(Codec::Null),
            "deflate" => Ok(Codec::Deflate),
            "snappy" => Ok(Codec::Snappy),
            "zstandard" | "zstd" => Ok(Codec::Zstandard),
            unknown => Err(CodecError::UnsupportedCodec(format!(
                "Unknown codec '{}'. Supported codecs: null, deflate, snappy, zstandard",
                unknown
            ))),
        }
    }

    /// The name written to the `avro.codec` header entry.
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Null => "null",
            Codec::Deflate => "deflate",
            Codec::Snappy => "snappy",
            Codec::Zstandard => "zstandard",
        }
    }

    /// Whether support for this codec was compiled in.
    pub fn is_enabled(&self) -> bool {
        match self {
            Codec::Null => true,
            Codec::Deflate => cfg!(feature = "deflate"),
            Codec::Snappy => cfg!(feature = "snappy"),
            Codec::Zstandard => cfg!(feature = "zstd"),
        }
    }

    /// Compress one block payload.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Codec::Null => Ok(data.to_vec()),
            #[cfg(feature = "deflate")]
            Codec::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder
                    .write_all(data)
                    .and_then(|_| encoder.finish())
                    .map_err(|e| {
                        CodecError::CompressionError(format!("Deflate compression failed: {}", e))
                    })
            }
            #[cfg(feature = "snappy")]
            Codec::Snappy => {
                let mut out = snap::raw::Encoder::new().compress_vec(data).map_err(|e| {
                    CodecError::CompressionError(format!("Snappy compression failed: {}", e))
                })?;
                out.extend_from_slice(&crc32fast::hash(data).to_be_bytes());
                Ok(out)
            }
            #[cfg(feature = "zstd")]
            Codec::Zstandard => zstd::encode_all(data, 0).map_err(|e| {
                CodecError::CompressionError(format!("Zstandard compression failed: {}", e))
            }),
            #[allow(unreachable_patterns)]
            disabled => Err(disabled.not_enabled()),
        }
    }

    /// Decompress one block payload.
    pub fn decompress(&self, data: &[u8]) -> Result<Bytes, CodecError> {
        match self {
            Codec::Null => Ok(Bytes::copy_from_slice(data)),
            #[cfg(feature = "deflate")]
            Codec::Deflate => {
                let mut out = Vec::new();
                DeflateDecoder::new(data).read_to_end(&mut out).map_err(|e| {
                    CodecError::DecompressionError(format!("Deflate decompression failed: {}", e))
                })?;
                Ok(Bytes::from(out))
            }
            #[cfg(feature = "snappy")]
            Codec::Snappy => decompress_snappy(data).map(Bytes::from),
            #[cfg(feature = "zstd")]
            Codec::Zstandard => {
                let mut out = Vec::new();
                zstd::Decoder::new(data)
                    .and_then(|mut decoder| decoder.read_to_end(&mut out))
                    .map_err(|e| {
                        CodecError::DecompressionError(format!(
                            "Zstandard decompression failed: {}",
                            e
                        ))
                    })?;
                Ok(Bytes::from(out))
            }
            #[allow(unreachable_patterns)]
            disabled => Err(disabled.not_enabled()),
        }
    }

    #[allow(dead_code)]
    fn not_enabled(&self) -> CodecError {
        CodecError::UnsupportedCodec(format!(
            "The '{}' codec is not enabled in this build",
            self.name()
        ))
    }
}

/// Snappy block: compressed bytes followed by the big-endian CRC32 (ISO polynomial, not
/// CRC32C) of the uncompressed bytes.
#[cfg(feature = "snappy")]
fn decompress_snappy(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if data.len() < SNAPPY_CRC_LEN {
        return Err(CodecError::DecompressionError(
            "Snappy data too short: missing CRC checksum".to_string(),
        ));
    }
    let (compressed, crc) = data.split_at(data.len() - SNAPPY_CRC_LEN);
    let expected = u32::from_be_bytes([crc[0], crc[1], crc[2], crc[3]]);

    let decompressed = if compressed.is_empty() {
        Vec::new()
    } else {
        snap::raw::Decoder::new()
            .decompress_vec(compressed)
            .map_err(|e| {
                CodecError::DecompressionError(format!("Snappy decompression failed: {}", e))
            })?
    };

    let actual = crc32fast::hash(&decompressed);
    if actual != expected {
        return Err(CodecError::DecompressionError(format!(
            "Snappy CRC32 checksum mismatch: expected 0x{:08X}, got 0x{:08X}",
            expected, actual
        )));
    }
    Ok(decompressed)
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
