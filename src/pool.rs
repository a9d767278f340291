//! Process-wide buffer and codec pools (§4.1).
//!
//! Every pool here hands out a single-owner guard that returns its
//! contents on `Drop` — success, error, or unwind all take the same path,
//! the same RAII shape as `PoolReadGuard` in the chunk-pool reference this
//! crate was grounded on. Guards truncate length to zero but keep
//! capacity, so the next borrower inherits the allocation, not the data.
//!
//! The pools are plain `Mutex`-guarded free lists rather than a generic
//! object-pool crate: nothing in the teacher or the rest of the pack pulls
//! one in for this shape, and a free list is the whole of what's needed
//! here.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, OnceLock};

use crate::encoding::{get_codec, Codec, Encoding};

/// A free list of reusable byte buffers, keyed loosely by capacity: on
/// `acquire`, the first buffer whose capacity already covers the request is
/// reused; otherwise a fresh one is allocated at exactly the requested
/// capacity. Buffers are never shrunk on return.
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub const fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    pub fn acquire(&self, min_capacity: usize) -> PooledBuffer<'_> {
        let mut free = self.free.lock().unwrap();
        let buf = match free.iter().position(|b| b.capacity() >= min_capacity) {
            Some(i) => free.swap_remove(i),
            None => Vec::with_capacity(min_capacity),
        };
        PooledBuffer {
            pool: self,
            buf: Some(buf),
        }
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        self.free.lock().unwrap().push(buf);
    }
}

/// A buffer borrowed from a [`BufferPool`]. Derefs to `Vec<u8>`; returns
/// itself to the pool on drop, truncated to length zero.
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Option<Vec<u8>>,
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> {
        self.buf.as_ref().expect("buffer taken before drop")
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect("buffer taken before drop")
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

/// One free list of boxed codecs per encoding. Every `Codec` impl in
/// `encoding.rs` is a zero-sized, stateless struct over a whole-buffer
/// compression crate (`zstd`, `lz4_flex`, `snap`, `flate2`) rather than an
/// incremental streaming reader/writer, so there is no per-instance window
/// or dictionary to amortize the way the teacher's block codecs do.
/// Pooling the `Box<dyn Codec>` handle itself still avoids a fresh
/// allocation per call and keeps the four pool kinds in §4.1 uniform.
pub struct CodecPool {
    free: Mutex<Vec<Box<dyn Codec>>>,
    encoding: Encoding,
}

impl CodecPool {
    fn new(encoding: Encoding) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            encoding,
        }
    }

    pub fn acquire(&self) -> PooledCodec<'_> {
        let mut free = self.free.lock().unwrap();
        let codec = free.pop().unwrap_or_else(|| get_codec(self.encoding));
        PooledCodec {
            pool: self,
            codec: Some(codec),
        }
    }

    fn release(&self, codec: Box<dyn Codec>) {
        self.free.lock().unwrap().push(codec);
    }
}

pub struct PooledCodec<'a> {
    pool: &'a CodecPool,
    codec: Option<Box<dyn Codec>>,
}

impl Deref for PooledCodec<'_> {
    type Target = dyn Codec;
    fn deref(&self) -> &dyn Codec {
        self.codec.as_deref().expect("codec taken before drop")
    }
}

impl Drop for PooledCodec<'_> {
    fn drop(&mut self) {
        if let Some(codec) = self.codec.take() {
            self.pool.release(codec);
        }
    }
}

/// All process-wide pools a chunk needs to serialize or iterate. Obtained
/// via [`pools`], a lazily-initialized `'static` singleton — every chunk in
/// the process shares these free lists, same as the teacher's archive-wide
/// codec pools.
pub struct Pools {
    /// Backs the per-entry line buffer during iteration (§4.7).
    pub line: BufferPool,
    /// Backs the head-serialise scratch buffer (§4.3).
    pub scratch: BufferPool,
    pub none: CodecPool,
    pub gzip: CodecPool,
    pub snappy: CodecPool,
    pub lz4: CodecPool,
    pub zstd: CodecPool,
}

impl Pools {
    fn new() -> Self {
        Self {
            line: BufferPool::new(),
            scratch: BufferPool::new(),
            none: CodecPool::new(Encoding::None),
            gzip: CodecPool::new(Encoding::Gzip),
            snappy: CodecPool::new(Encoding::Snappy),
            lz4: CodecPool::new(Encoding::Lz4),
            zstd: CodecPool::new(Encoding::Zstd),
        }
    }

    pub fn codec(&self, encoding: Encoding) -> &CodecPool {
        match encoding {
            Encoding::None => &self.none,
            Encoding::Gzip => &self.gzip,
            Encoding::Snappy => &self.snappy,
            Encoding::Lz4 => &self.lz4,
            Encoding::Zstd => &self.zstd,
        }
    }
}

static POOLS: OnceLock<Pools> = OnceLock::new();

/// The process-wide pool singleton.
pub fn pools() -> &'static Pools {
    POOLS.get_or_init(Pools::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_pool_reuses_capacity() {
        let pool = BufferPool::new();
        {
            let mut buf = pool.acquire(64);
            assert!(buf.capacity() >= 64);
            buf.extend_from_slice(b"hello");
        }
        let buf = pool.acquire(32);
        assert!(buf.capacity() >= 64, "should reuse the larger returned buffer");
        assert!(buf.is_empty(), "returned buffers must be truncated to length zero");
    }

    #[test]
    fn buffer_pool_allocates_when_too_small() {
        let pool = BufferPool::new();
        drop(pool.acquire(8));
        let buf = pool.acquire(1024);
        assert!(buf.capacity() >= 1024);
    }

    #[test]
    fn codec_pool_roundtrip() {
        let pool = CodecPool::new(Encoding::Zstd);
        let data = b"some data to compress".repeat(8);
        let compressed = {
            let codec = pool.acquire();
            codec.compress(&data).unwrap()
        };
        let codec = pool.acquire();
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }
}
