//! Compression encodings: the fixed, enumerated set a chunk may use.
//!
//! Unlike the container format this crate started from, encodings here are
//! not identified by UUID — there is no plugin negotiation. The encoding
//! byte in the chunk header (§4.6) is the sole identity, and it is frozen:
//! adding a sixth encoding is a format version bump, not a registration.

use std::io::{self, Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("compression error: {0}")]
    Compression(String),
    #[error("decompression error: {0}")]
    Decompression(String),
}

/// The fixed set of encodings a chunk's blocks may use.
///
/// `None` and `Gzip` correspond to format V1's implicit GZIP and to V2's
/// explicit encoding byte value 0/1 respectively; see `src/format.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Encoding {
    None = 0,
    Gzip = 1,
    Snappy = 2,
    Lz4 = 3,
    Zstd = 4,
}

impl Encoding {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Encoding::None),
            1 => Some(Encoding::Gzip),
            2 => Some(Encoding::Snappy),
            3 => Some(Encoding::Lz4),
            4 => Some(Encoding::Zstd),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::None => "none",
            Encoding::Gzip => "gzip",
            Encoding::Snappy => "snappy",
            Encoding::Lz4 => "lz4",
            Encoding::Zstd => "zstd",
        }
    }
}

/// A compressor/decompressor for one encoding.
pub trait Codec {
    fn encoding(&self) -> Encoding;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

pub struct NoneCodec;
impl Codec for NoneCodec {
    fn encoding(&self) -> Encoding {
        Encoding::None
    }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(data.to_vec())
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(data.to_vec())
    }
}

pub struct GzipCodec;
impl Codec for GzipCodec {
    fn encoding(&self) -> Encoding {
        Encoding::Gzip
    }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        enc.finish()
            .map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        use flate2::read::GzDecoder;
        let mut out = Vec::new();
        GzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct SnappyCodec;
impl Codec for SnappyCodec {
    fn encoding(&self) -> Encoding {
        Encoding::Snappy
    }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut enc = snap::raw::Encoder::new();
        enc.compress_vec(data)
            .map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut dec = snap::raw::Decoder::new();
        dec.decompress_vec(data)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn encoding(&self) -> Encoding {
        Encoding::Lz4
    }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(lz4_flex::compress_prepend_size(data))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct ZstdCodec;
impl Codec for ZstdCodec {
    fn encoding(&self) -> Encoding {
        Encoding::Zstd
    }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, 0).map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::decode_all(data).map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

/// Resolve an [`Encoding`] to its codec implementation.
pub fn get_codec(encoding: Encoding) -> Box<dyn Codec> {
    match encoding {
        Encoding::None => Box::new(NoneCodec),
        Encoding::Gzip => Box::new(GzipCodec),
        Encoding::Snappy => Box::new(SnappyCodec),
        Encoding::Lz4 => Box::new(Lz4Codec),
        Encoding::Zstd => Box::new(ZstdCodec),
    }
}
