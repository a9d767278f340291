//! Error types shared across the chunk format.

use std::io;
use thiserror::Error;

use crate::chunk::Chunk;

/// Everything that can go wrong building, serializing, or reading a chunk.
#[derive(Error, Debug)]
pub enum ChunkError {
    /// `Append` called with a timestamp earlier than the chunk's current max.
    #[error("out of order: timestamp {ts} precedes current max {max}")]
    OutOfOrder { ts: i64, max: i64 },

    /// A decoded line length exceeded `max_line_length`.
    #[error("line too long: {len} bytes exceeds the {max} byte limit")]
    LineTooLong { len: u64, max: u64 },

    /// Header magic did not match `MAGIC`.
    #[error("invalid magic: expected {expected:#010x}, got {actual:#010x}")]
    InvalidMagic { expected: u32, actual: u32 },

    /// Header format byte was not a recognised version.
    #[error("invalid format version: {0}")]
    InvalidVersion(u8),

    /// A CRC-32C check failed, either on the metadata section or on a
    /// single block's payload. When a single block fails, `partial` carries
    /// the chunk reconstructed from every block verified before the
    /// failure, so the caller is not forced to discard everything.
    #[error("checksum mismatch in {where_}")]
    InvalidChecksum {
        where_: &'static str,
        partial: Option<Box<Chunk>>,
    },

    /// The encoding byte did not map to a known [`crate::encoding::Encoding`].
    #[error("unavailable encoding byte: {0}")]
    UnavailableEncoding(u8),

    /// Compression or decompression failed inside a codec.
    #[error("codec error: {0}")]
    Codec(String),

    /// A pool returned a buffer smaller than requested.
    #[error("pool returned undersized buffer: wanted at least {wanted}, got {got}")]
    UndersizedBuffer { wanted: usize, got: usize },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<crate::encoding::CodecError> for ChunkError {
    fn from(e: crate::encoding::CodecError) -> Self {
        ChunkError::Codec(e.to_string())
    }
}

impl From<crate::varint::EntryDecodeError> for ChunkError {
    fn from(e: crate::varint::EntryDecodeError) -> Self {
        match e {
            crate::varint::EntryDecodeError::LineTooLong { len, max } => {
                ChunkError::LineTooLong { len, max }
            }
            crate::varint::EntryDecodeError::Io(e) => ChunkError::Io(e),
        }
    }
}
