//! Chunk container (§3 "Chunk", §4.5): orchestrates head→block cuts, tracks
//! size/utilization accounting, and exposes the public append/bounds/size
//! surface. Grounded on [`crate::Archive`]'s "owns a write-mode and
//! read-mode struct with an explicit state machine" shape, reduced to a
//! single struct — there is no multi-file archive or solid-block
//! accumulation here, just one head and a growing list of sealed blocks.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::block::Block;
use crate::encoding::Encoding;
use crate::error::ChunkError;
use crate::head::HeadBlock;
use crate::iter::{compose, BlockIterator, Direction, EntryIterator, Filter};
use crate::pool::pools;
use crate::stats::StatsSink;

/// On-disk format version (§3 invariant 4, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Format {
    /// Legacy format: no encoding byte in the header, GZIP implied. Load-only
    /// (§9 "V1 write path" — implementations should not add a V1 writer).
    V1 = 1,
    /// Current format: explicit encoding byte (§4.6).
    V2 = 2,
}

impl Format {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Format::V1),
            2 => Some(Format::V2),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Soft cap on sealed block count used only when `target_size_bytes == 0`
/// (§6 "Tunables").
pub const BLOCKS_PER_CHUNK_SOFT_LIMIT: usize = 10;

/// Default `block_size_bytes` (§4.5, §6).
pub const DEFAULT_BLOCK_SIZE_BYTES: usize = 262_144;

/// Maximum permitted decoded line length (§4.2, §6).
pub const MAX_LINE_LENGTH: u64 = 1 << 30;

/// Construction parameters for a new [`Chunk`] (§4.5).
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    pub encoding: Encoding,
    pub block_size_bytes: usize,
    /// `0` disables target-based sealing in favor of the
    /// [`BLOCKS_PER_CHUNK_SOFT_LIMIT`] block-count cap.
    pub target_size_bytes: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::Zstd,
            block_size_bytes: DEFAULT_BLOCK_SIZE_BYTES,
            target_size_bytes: 0,
        }
    }
}

/// An in-memory, append-only, compressed log chunk (§3 "Chunk").
///
/// Owns its head and sealed blocks exclusively. The head is created empty at
/// construction and is the only thing `append` mutates directly; a cut
/// freezes the head's current contents into a new [`Block`] and resets the
/// head in place.
#[derive(Debug)]
pub struct Chunk {
    format: Format,
    encoding: Encoding,
    block_size_bytes: usize,
    target_size_bytes: usize,
    blocks: Vec<Block>,
    cut_block_size: u64,
    head: HeadBlock,
}

impl Chunk {
    /// A new, empty V2 chunk (§4.5 "Default format is V2").
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            format: Format::V2,
            encoding: config.encoding,
            block_size_bytes: config.block_size_bytes,
            target_size_bytes: config.target_size_bytes,
            blocks: Vec::new(),
            cut_block_size: 0,
            head: HeadBlock::new(),
        }
    }

    /// Reconstruct a chunk from its decoded parts. Used only by
    /// [`crate::format::load`], including for the partially-reconstructed
    /// chunk returned alongside `InvalidChecksum` on a per-block CRC
    /// failure (§4.6, §7).
    pub(crate) fn from_parts(
        format: Format,
        encoding: Encoding,
        block_size_bytes: usize,
        target_size_bytes: usize,
        blocks: Vec<Block>,
    ) -> Self {
        let cut_block_size = blocks.iter().map(|b| b.payload.len() as u64).sum();
        Self {
            format,
            encoding,
            block_size_bytes,
            target_size_bytes,
            blocks,
            cut_block_size,
            head: HeadBlock::new(),
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn block_size_bytes(&self) -> usize {
        self.block_size_bytes
    }

    pub fn target_size_bytes(&self) -> usize {
        self.target_size_bytes
    }

    pub(crate) fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub(crate) fn cut_block_size(&self) -> u64 {
        self.cut_block_size
    }

    /// Append one `(timestamp, line)` record (§4.5 "Append").
    ///
    /// Fails with `OutOfOrder` without mutating anything if the head is
    /// empty, at least one sealed block already exists, and that block's
    /// `maxt` exceeds `ts` — i.e. the new entry would precede the last
    /// sealed block even though the (empty) head can't detect that itself.
    /// Otherwise delegates to the head, then cuts if the head has grown
    /// past `block_size_bytes`.
    pub fn append(&mut self, timestamp: i64, line: Vec<u8>) -> Result<(), ChunkError> {
        if self.head.is_empty() {
            if let Some(last) = self.blocks.last() {
                if last.maxt > timestamp {
                    return Err(ChunkError::OutOfOrder {
                        ts: timestamp,
                        max: last.maxt,
                    });
                }
            }
        }
        self.head.append(timestamp, line)?;
        if self.head.size() >= self.block_size_bytes {
            self.cut()?;
        }
        Ok(())
    }

    /// Seal the head into a new [`Block`] and reset it in place. A no-op if
    /// the head is empty. All-or-nothing relative to the head's observable
    /// state: either the cut fully commits (new block appended, head reset)
    /// or it returns an error with the head untouched (§7).
    fn cut(&mut self) -> Result<(), ChunkError> {
        if self.head.is_empty() {
            return Ok(());
        }
        let payload = self.head.serialise(self.encoding, pools())?;
        trace!(
            entries = self.head.len(),
            uncompressed = self.head.size(),
            compressed = payload.len(),
            "cutting head into sealed block"
        );
        let block = Block::from_head(&self.head, payload);
        self.cut_block_size += block.payload.len() as u64;
        self.blocks.push(block);
        self.head.reset();
        debug!(blocks = self.blocks.len(), "cut complete");
        Ok(())
    }

    /// Whether a line of length `len(line)` can be admitted without
    /// certainly exceeding `target_size_bytes` (§4.5 "SpaceFor").
    ///
    /// When a target is configured this is an intentionally conservative,
    /// uncompressed-bytes approximation: an entry may be rejected even
    /// though compression would have left room, but admission never
    /// reports room that doesn't exist. Without a target, the check falls
    /// back to the block-count soft limit (§6).
    pub fn space_for(&self, line: &[u8]) -> bool {
        if self.target_size_bytes > 0 {
            let projected = self.cut_block_size as usize + self.head.size() + line.len();
            projected < self.target_size_bytes
        } else {
            self.blocks.len() < BLOCKS_PER_CHUNK_SOFT_LIMIT
        }
    }

    /// Total entry count across sealed blocks and the head (§4.5 "Size").
    pub fn size(&self) -> u64 {
        let sealed: u64 = self.blocks.iter().map(|b| b.num_entries).sum();
        sealed + self.head.len() as u64
    }

    /// Number of sealed blocks (§4.5 "Blocks").
    pub fn blocks_len(&self) -> usize {
        self.blocks.len()
    }

    /// `head.size + Σ block.uncompressed_size` (§4.5 "UncompressedSize").
    pub fn uncompressed_size(&self) -> u64 {
        let sealed: u64 = self.blocks.iter().map(|b| b.uncompressed_size).sum();
        sealed + self.head.size() as u64
    }

    /// `head.size (counted conservatively) + cut_block_size` (§4.5
    /// "CompressedSize"). The head's uncompressed bytes are counted rather
    /// than ignored — deliberate, per §9 "CompressedSize over-counts the
    /// head" — so callers must tolerate this exceeding the actual
    /// compressed byte count.
    pub fn compressed_size(&self) -> u64 {
        self.head.size() as u64 + self.cut_block_size
    }

    /// Fraction of configured capacity consumed (§4.5 "Utilization").
    pub fn utilization(&self) -> f64 {
        if self.target_size_bytes > 0 {
            self.compressed_size() as f64 / self.target_size_bytes as f64
        } else {
            self.uncompressed_size() as f64
                / (BLOCKS_PER_CHUNK_SOFT_LIMIT as f64 * self.block_size_bytes as f64)
        }
    }

    /// `(from, to)` spanning every sealed block and the head (§4.5
    /// "Bounds").
    pub fn bounds(&self) -> (i64, i64) {
        let from = self
            .blocks
            .first()
            .map(|b| b.mint)
            .unwrap_or_else(|| self.head.mint());
        let to = self
            .blocks
            .last()
            .map(|b| b.maxt)
            .unwrap_or(i64::MIN)
            .max(self.head.maxt());
        (from, to)
    }

    /// Flush the head via a final cut. No further appends are contractually
    /// required to work afterward (§4.5 "Close").
    pub fn close(&mut self) -> Result<(), ChunkError> {
        self.cut()
    }

    /// Build an iterator over `[mint, maxt)` in the given direction,
    /// applying `filter` to raw line bytes (§4.7 "Composition").
    ///
    /// One [`BlockIterator`] is spawned per sealed block whose half-open
    /// range overlaps `[mint, maxt)`, plus a head iterator if the head is
    /// non-empty; all are stacked through [`compose`], which merges
    /// (concatenates — sealed blocks and the head are already globally
    /// disjoint by §3 invariant 1) and clips to `[mint, maxt)` before
    /// applying direction.
    pub fn iterator(
        &self,
        mint: i64,
        maxt: i64,
        direction: Direction,
        filter: Option<Arc<Filter>>,
        stats: StatsSink,
    ) -> Box<dyn EntryIterator> {
        let block_sources: Vec<Box<dyn EntryIterator>> = self
            .blocks
            .iter()
            .filter(|b| b.overlaps(mint, maxt))
            .map(|b| {
                Box::new(BlockIterator::new(
                    b.payload.clone(),
                    self.encoding,
                    MAX_LINE_LENGTH,
                    filter.clone(),
                    stats.clone(),
                )) as Box<dyn EntryIterator>
            })
            .collect();
        let head_source = if self.head.is_empty() {
            None
        } else {
            Some(self.head.iterator(mint, maxt, filter.clone()))
        };
        compose(block_sources, head_source, mint, maxt, direction)
    }
}
