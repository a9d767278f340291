//! Sealed, immutable compressed block (§3, §4.4).
//!
//! A `Block` is produced exactly once, by [`crate::head::HeadBlock::cut`],
//! and never mutated afterward. It is the cold counterpart to the hot,
//! mutable `HeadBlock`: the teacher's `BlockHeader`/`decode_block` pair
//! plays the same "verify cheap things before doing expensive ones" role,
//! trimmed down to this format's CRC-32C-only integrity model — there is
//! no embedded content hash and no header bytes inside the payload itself,
//! since the per-block metadata (§4.6) lives in the chunk's trailing index
//! rather than in-band.

use crate::head::{Entry, HeadBlock};

/// An immutable, CRC-protected compressed block (§3 "Block (sealed)").
#[derive(Debug, Clone)]
pub struct Block {
    /// Compressed bytes, as produced by [`HeadBlock::serialise`].
    pub payload: Vec<u8>,
    pub num_entries: u64,
    pub mint: i64,
    pub maxt: i64,
    /// Absolute byte offset of `payload` within the serialized chunk. Zero
    /// until the chunk has been encoded or loaded (§4.6); not meaningful
    /// before that.
    pub offset: u64,
    /// Uncompressed size of the source head at the time of the cut.
    pub uncompressed_size: u64,
}

impl Block {
    /// Construct a sealed block from a head's counters and its serialised
    /// payload. Called only from [`crate::chunk::Chunk::cut`].
    pub fn from_head(head: &HeadBlock, payload: Vec<u8>) -> Self {
        Block {
            payload,
            num_entries: head.len() as u64,
            mint: head.mint(),
            maxt: head.maxt(),
            offset: 0,
            uncompressed_size: head.size() as u64,
        }
    }

    /// Half-open time-range overlap test used by the iterator composer
    /// (§4.7 step 1): `maxt > b.mint && b.maxt > mint`.
    pub fn overlaps(&self, mint: i64, maxt: i64) -> bool {
        maxt > self.mint && self.maxt > mint
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A fully decompressed block, materialized only for tests and for the CLI
/// inspection tool — the read path in `iter.rs` streams entries without
/// holding the whole decompressed payload as `Entry` values.
#[cfg(test)]
pub(crate) fn decode_entries_for_test(
    payload: &[u8],
    encoding: crate::encoding::Encoding,
) -> Vec<Entry> {
    use crate::varint;
    use std::io::Cursor;

    let codec = crate::encoding::get_codec(encoding);
    let decompressed = codec.decompress(payload).unwrap();
    let mut cur = Cursor::new(decompressed);
    let mut out = Vec::new();
    let mut buf = Vec::new();
    while let Some((ts, len)) = varint::read_entry(&mut cur, &mut buf, 1 << 30).unwrap() {
        out.push(Entry {
            timestamp: ts,
            line: buf[..len].to_vec(),
        });
    }
    out
}
