//! Head block: the hot, mutable staging area for the most recent entries
//! (§3 "HeadBlock", §4.3).
//!
//! Everything here is kept in memory uncompressed until a cut; the
//! monotonic-timestamp invariant is enforced on every append rather than
//! checked lazily at cut time, mirroring the teacher's
//! verify-before-trust discipline (`BlockHeader::read` checks the header
//! CRC before looking at any other field).

use std::sync::Arc;

use crate::encoding::Encoding;
use crate::error::ChunkError;
use crate::iter::{EntryIterator, Filter, HeadIterator};
use crate::pool::Pools;
use crate::varint;

/// One `(timestamp, line)` record (§3 "Entry"). No labels live inside the
/// chunk — that's the enclosing storage service's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub timestamp: i64,
    pub line: Vec<u8>,
}

/// Uncompressed, append-only staging area (§3, §4.3).
#[derive(Debug, Default)]
pub struct HeadBlock {
    entries: Vec<Entry>,
    mint: i64,
    maxt: i64,
    size: usize,
}

impl HeadBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn mint(&self) -> i64 {
        self.mint
    }

    pub fn maxt(&self) -> i64 {
        self.maxt
    }

    /// Sum of `len(line)` across all entries currently staged — the
    /// "uncompressed size" a chunk uses to decide when to cut.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Append one entry, enforcing the non-decreasing timestamp invariant.
    pub fn append(&mut self, timestamp: i64, line: Vec<u8>) -> Result<(), ChunkError> {
        if !self.is_empty() && timestamp < self.maxt {
            return Err(ChunkError::OutOfOrder {
                ts: timestamp,
                max: self.maxt,
            });
        }
        if self.is_empty() {
            self.mint = timestamp;
        }
        self.maxt = timestamp;
        self.size += line.len();
        self.entries.push(Entry { timestamp, line });
        Ok(())
    }

    /// Compress every staged entry through `encoding`, returning the
    /// compressed payload. Scratch space is borrowed from the
    /// serialization-scratch pool and returned on every exit path because
    /// it is a `PooledBuffer` guard (§4.1, §4.3).
    pub fn serialise(&self, encoding: Encoding, pools: &Pools) -> Result<Vec<u8>, ChunkError> {
        let mut scratch = pools.scratch.acquire(self.size + self.entries.len() * 8);
        for entry in &self.entries {
            varint::write_entry(&mut *scratch, entry.timestamp, &entry.line)?;
        }
        let codec = pools.codec(encoding).acquire();
        let compressed = codec.compress(&scratch)?;
        Ok(compressed)
    }

    /// Truncate entries and zero `mint`/`size` after a cut. `maxt` is
    /// deliberately retained — §4.5 "cut()" notes this is harmless because
    /// a subsequent `append` only compares against `maxt` when the head is
    /// non-empty, and the head is empty right after a reset.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.mint = 0;
        self.size = 0;
    }

    /// Build an iterator over entries whose timestamp falls in
    /// `[mint, maxt)`, applying `filter` to raw line bytes. Always
    /// materializes a filtered copy (§4.3): the head keeps accepting
    /// appends concurrently with reads, so a live reference into
    /// `self.entries` would not be safe to hand out.
    pub fn iterator(
        &self,
        mint: i64,
        maxt: i64,
        filter: Option<Arc<Filter>>,
    ) -> Box<dyn EntryIterator> {
        if self.is_empty() || maxt <= self.mint || mint > self.maxt {
            return Box::new(HeadIterator::new(Vec::new()));
        }
        let snapshot: Vec<Entry> = self
            .entries
            .iter()
            .filter(|e| e.timestamp >= mint && e.timestamp < maxt)
            .filter(|e| filter.as_ref().map_or(true, |f| f(&e.line)))
            .cloned()
            .collect();
        Box::new(HeadIterator::new(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_enforces_monotonic_timestamps() {
        let mut head = HeadBlock::new();
        head.append(10, b"a".to_vec()).unwrap();
        head.append(20, b"b".to_vec()).unwrap();
        let err = head.append(15, b"c".to_vec()).unwrap_err();
        assert!(matches!(err, ChunkError::OutOfOrder { ts: 15, max: 20 }));
        assert_eq!(head.len(), 2);
        assert_eq!(head.mint(), 10);
        assert_eq!(head.maxt(), 20);
    }

    #[test]
    fn equal_timestamps_are_allowed() {
        let mut head = HeadBlock::new();
        head.append(5, b"a".to_vec()).unwrap();
        head.append(5, b"b".to_vec()).unwrap();
        assert_eq!(head.len(), 2);
    }

    #[test]
    fn reset_clears_entries_but_keeps_maxt() {
        let mut head = HeadBlock::new();
        head.append(1, b"a".to_vec()).unwrap();
        head.append(2, b"b".to_vec()).unwrap();
        head.reset();
        assert!(head.is_empty());
        assert_eq!(head.mint(), 0);
        assert_eq!(head.size(), 0);
        // A subsequent append with a timestamp below the pre-reset maxt
        // must still succeed because the head is now empty.
        head.append(1, b"c".to_vec()).unwrap();
    }

    #[test]
    fn serialise_roundtrips_through_codec() {
        let mut head = HeadBlock::new();
        head.append(1, b"hello".to_vec()).unwrap();
        head.append(2, b"world".to_vec()).unwrap();
        let pools = crate::pool::pools();
        let payload = head.serialise(Encoding::Zstd, pools).unwrap();
        let decoded = crate::block::decode_entries_for_test(&payload, Encoding::Zstd);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].line, b"hello");
        assert_eq!(decoded[1].line, b"world");
    }

    #[test]
    fn iterator_empty_head() {
        let head = HeadBlock::new();
        let mut it = head.iterator(0, 100, None);
        assert!(!it.next());
    }

    #[test]
    fn iterator_clips_and_filters() {
        let mut head = HeadBlock::new();
        head.append(1, b"info x".to_vec()).unwrap();
        head.append(2, b"error y".to_vec()).unwrap();
        head.append(3, b"info z".to_vec()).unwrap();
        let filter: Arc<Filter> = Arc::new(|line: &[u8]| line.windows(5).any(|w| w == b"error"));
        let mut it = head.iterator(0, 10, Some(filter));
        assert!(it.next());
        assert_eq!(it.current().unwrap().line, b"error y");
        assert!(!it.next());
    }
}
