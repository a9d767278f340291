//! Decompression accounting sink (§4.7 "Bytes-decompressed accounting",
//! §6 "Decompression statistics sink").
//!
//! A chunk's iterator stack can hold several per-block iterators alive at
//! once (§4.7 composition), each closing independently as the merge drains
//! them, so the sink needs to be shared across all of them — `Arc<Mutex<_>>`
//! rather than the single plain counter a one-iterator-at-a-time caller
//! could get away with. Appends/iteration elsewhere in the chunk stay
//! single-threaded per §5; this is the one place multiple owners overlap.

use std::sync::{Arc, Mutex};

/// Running totals of decompression work performed while servicing an
/// iterator. Updated once per closed per-block iterator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStats {
    pub bytes_decompressed: i64,
    pub bytes_compressed: i64,
}

impl DecodeStats {
    pub fn add(&mut self, decompressed: i64, compressed: i64) {
        self.bytes_decompressed += decompressed;
        self.bytes_compressed += compressed;
    }
}

/// Shared handle passed to `Chunk::iterator` and threaded through every
/// per-block iterator it spawns.
pub type StatsSink = Arc<Mutex<DecodeStats>>;

/// A fresh, zeroed stats sink.
pub fn new_stats_sink() -> StatsSink {
    Arc::new(Mutex::new(DecodeStats::default()))
}
