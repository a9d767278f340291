//! # logchunk — in-memory, append-only, compressed log chunk
//!
//! Format guarantees:
//! - Entries are ingested `(timestamp, line)` in non-decreasing timestamp
//!   order and compressed into fixed-size blocks.
//! - The wire format is self-describing and checksummed: a fixed header,
//!   a concatenation of CRC-32C-protected block payloads, and a
//!   CRC-32C-protected metadata index anchored by a trailing offset.
//! - Reads are served by an iterator stack that stitches one decompressing
//!   decoder per overlapping block, plus an optional head snapshot,
//!   into a single time-ranged, direction-aware entry stream.
//! - Only V2 is ever written; V1 (implicit GZIP, no encoding byte) is
//!   load-only.

pub mod block;
pub mod chunk;
pub mod encoding;
pub mod error;
pub mod format;
pub mod head;
pub mod iter;
pub mod pool;
pub mod stats;
pub mod varint;

// Flat re-exports for the most common types.
pub use block::Block;
pub use chunk::{
    Chunk, ChunkConfig, Format, BLOCKS_PER_CHUNK_SOFT_LIMIT, DEFAULT_BLOCK_SIZE_BYTES,
    MAX_LINE_LENGTH,
};
pub use encoding::Encoding;
pub use error::ChunkError;
pub use format::{encode, load};
pub use head::{Entry, HeadBlock};
pub use iter::{Direction, EntryIterator, Filter};
pub use stats::{new_stats_sink, DecodeStats, StatsSink};
