//! Bounded block pool and reference-counted chunks.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::PoolConfig;
use crate::error::MemPoolError;
use crate::sample::SampleFormat;

struct PoolInner {
    block_size_max: usize,
    max_blocks: usize,
    outstanding: AtomicUsize,
    peak: AtomicUsize,
}

/// Releases its pool slot when the block is freed.
struct PoolSlot {
    pool: Arc<PoolInner>,
}

impl Drop for PoolSlot {
    fn drop(&mut self) {
        self.pool.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

struct MemBlock {
    data: Vec<u8>,
    _slot: Option<PoolSlot>,
}

/// Bounded allocator for audio blocks.
///
/// The pool hands out at most `max_blocks` live blocks at a time. A block
/// returns its slot when the last [`MemChunk`] referencing it is dropped.
/// Cloning the pool yields another handle to the same slots.
#[derive(Clone)]
pub struct MemPool {
    inner: Arc<PoolInner>,
}

impl MemPool {
    /// Creates a pool from its configuration.
    #[must_use]
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                block_size_max: config.block_size_max.max(1),
                max_blocks: config.max_blocks.max(1),
                outstanding: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Largest block the pool is tuned for; conversion steps size their
    /// work so a single block never exceeds it.
    #[must_use]
    pub fn block_size_max(&self) -> usize {
        self.inner.block_size_max
    }

    /// Number of slots.
    #[must_use]
    pub fn max_blocks(&self) -> usize {
        self.inner.max_blocks
    }

    /// Blocks currently alive.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Highest number of blocks alive at once.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::Relaxed)
    }

    fn acquire_slot(&self) -> Result<PoolSlot, MemPoolError> {
        let max = self.inner.max_blocks;
        let previous = self
            .inner
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(|_| MemPoolError::Exhausted { max_blocks: max })?;
        self.inner.peak.fetch_max(previous + 1, Ordering::Relaxed);
        Ok(PoolSlot {
            pool: Arc::clone(&self.inner),
        })
    }

    fn wrap(&self, data: Vec<u8>) -> Result<MemChunk, MemPoolError> {
        let slot = self.acquire_slot()?;
        Ok(MemChunk::from_block(MemBlock {
            data,
            _slot: Some(slot),
        }))
    }

    /// Allocates a zero-filled chunk of `length` bytes.
    pub fn allocate(&self, length: usize) -> Result<MemChunk, MemPoolError> {
        self.wrap(vec![0; length])
    }

    /// Allocates a chunk holding a copy of `data`.
    pub fn allocate_from(&self, data: &[u8]) -> Result<MemChunk, MemPoolError> {
        self.wrap(data.to_vec())
    }

    /// Allocates a chunk of `length` bytes of silence in `format`.
    pub fn allocate_silence(
        &self,
        format: SampleFormat,
        length: usize,
    ) -> Result<MemChunk, MemPoolError> {
        self.wrap(vec![format.silence_byte(); length])
    }
}

impl Default for MemPool {
    fn default() -> Self {
        Self::new(&PoolConfig::default())
    }
}

impl fmt::Debug for MemPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemPool")
            .field("block_size_max", &self.inner.block_size_max)
            .field("max_blocks", &self.inner.max_blocks)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// A window into a shared, reference-counted block.
///
/// Cloning a chunk is cheap and shares the block. Writers go through
/// [`make_writable`](Self::make_writable), which copies the window first
/// if any other chunk still references the block.
#[derive(Clone)]
pub struct MemChunk {
    block: Arc<MemBlock>,
    index: usize,
    length: usize,
}

impl MemChunk {
    fn from_block(block: MemBlock) -> Self {
        let length = block.data.len();
        Self {
            block: Arc::new(block),
            index: 0,
            length,
        }
    }

    /// Wraps caller-owned memory. Such blocks do not count against any pool.
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self::from_block(MemBlock { data, _slot: None })
    }

    /// An empty chunk.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Unpooled chunk of `length` bytes of silence in `format`.
    #[must_use]
    pub fn silence(format: SampleFormat, length: usize) -> Self {
        Self::from_vec(vec![format.silence_byte(); length])
    }

    /// Length of the window in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns true if the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Offset of the window inside its block.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Bytes of the window.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.block.data[self.index..self.index + self.length]
    }

    /// Sub-window sharing the same block.
    #[must_use]
    pub fn slice(&self, offset: usize, length: usize) -> Self {
        assert!(offset + length <= self.length, "slice out of range");
        Self {
            block: Arc::clone(&self.block),
            index: self.index + offset,
            length,
        }
    }

    /// Shortens the window to at most `length` bytes.
    pub fn truncate(&mut self, length: usize) {
        self.length = self.length.min(length);
    }

    /// Moves the start of the window forward by up to `n` bytes.
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.length);
        self.index += n;
        self.length -= n;
    }

    /// Returns true if both chunks reference the same block.
    #[must_use]
    pub fn same_block(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.block, &other.block)
    }

    /// Returns true if another chunk references the same block.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.block) > 1
    }

    /// Extends this window over `next` if `next` directly follows it in the
    /// same block. Returns false and leaves both untouched otherwise.
    pub fn try_append(&mut self, next: &Self) -> bool {
        if self.same_block(next) && self.index + self.length == next.index {
            self.length += next.length;
            true
        } else {
            false
        }
    }

    /// Mutable access to the window, copying it into a fresh pool block
    /// first if the block is shared.
    pub fn make_writable(&mut self, pool: &MemPool) -> Result<&mut [u8], MemPoolError> {
        if Arc::get_mut(&mut self.block).is_none() {
            *self = pool.allocate_from(self.as_bytes())?;
        }
        let (index, length) = (self.index, self.length);
        match Arc::get_mut(&mut self.block) {
            Some(block) => Ok(&mut block.data[index..index + length]),
            None => unreachable!("freshly allocated block is unique"),
        }
    }

    /// Copies the window out.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Default for MemChunk {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for MemChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemChunk")
            .field("index", &self.index)
            .field("length", &self.length)
            .field("block_len", &self.block.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool(max_blocks: usize) -> MemPool {
        MemPool::new(&PoolConfig {
            block_size_max: 1024,
            max_blocks,
        })
    }

    #[test]
    fn test_allocate_zeroed() {
        let pool = small_pool(4);
        let chunk = pool.allocate(16).unwrap();
        assert_eq!(chunk.len(), 16);
        assert!(chunk.as_bytes().iter().all(|b| *b == 0));
        assert_eq!(pool.outstanding(), 1);
    }

    #[test]
    fn test_pool_exhaustion_and_release() {
        let pool = small_pool(2);
        let a = pool.allocate(4).unwrap();
        let b = pool.allocate(4).unwrap();
        assert_eq!(
            pool.allocate(4).unwrap_err(),
            MemPoolError::Exhausted { max_blocks: 2 }
        );

        // A clone keeps the block alive.
        let a2 = a.clone();
        drop(a);
        assert!(pool.allocate(4).is_err());

        drop(a2);
        drop(b);
        assert_eq!(pool.outstanding(), 0);
        assert!(pool.allocate(4).is_ok());
        assert_eq!(pool.peak(), 2);
    }

    #[test]
    fn test_slice_shares_block() {
        let chunk = MemChunk::from_vec((0u8..8).collect());
        let s = chunk.slice(2, 4);
        assert!(s.same_block(&chunk));
        assert_eq!(s.as_bytes(), &[2, 3, 4, 5]);
        assert_eq!(s.index(), 2);
    }

    #[test]
    fn test_truncate_and_advance() {
        let mut chunk = MemChunk::from_vec((0u8..8).collect());
        chunk.advance(3);
        chunk.truncate(2);
        assert_eq!(chunk.as_bytes(), &[3, 4]);
        chunk.advance(10);
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_make_writable_copies_shared() {
        let pool = small_pool(4);
        let original = MemChunk::from_vec(vec![1, 2, 3, 4]);
        let mut copy = original.slice(1, 2);

        copy.make_writable(&pool).unwrap()[0] = 9;

        assert_eq!(original.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(copy.as_bytes(), &[9, 3]);
        assert!(!copy.same_block(&original));
        assert_eq!(pool.outstanding(), 1);
    }

    #[test]
    fn test_make_writable_in_place_when_unique() {
        let pool = small_pool(1);
        let mut chunk = MemChunk::from_vec(vec![1, 2]);
        chunk.make_writable(&pool).unwrap()[1] = 7;
        assert_eq!(chunk.as_bytes(), &[1, 7]);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_make_writable_reports_exhaustion() {
        let pool = small_pool(1);
        let _held = pool.allocate(1).unwrap();
        let original = MemChunk::from_vec(vec![1, 2]);
        let mut copy = original.clone();
        assert!(copy.make_writable(&pool).is_err());
        assert!(copy.same_block(&original));
    }

    #[test]
    fn test_try_append() {
        let chunk = MemChunk::from_vec((0u8..8).collect());
        let mut head = chunk.slice(0, 4);
        assert!(head.try_append(&chunk.slice(4, 2)));
        assert_eq!(head.len(), 6);
        assert!(!head.try_append(&chunk.slice(7, 1)));
        assert!(!head.try_append(&MemChunk::from_vec(vec![0])));
    }

    #[test]
    fn test_silence_chunk() {
        let chunk = MemChunk::silence(SampleFormat::U8, 3);
        assert_eq!(chunk.as_bytes(), &[0x80; 3]);
    }
}
