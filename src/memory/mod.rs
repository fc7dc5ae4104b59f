//! Audio memory: a bounded block pool, shared chunks and indexed block
//! queues.
//!
//! Blocks are reference counted. A [`MemChunk`] is a window into one block,
//! so slicing and queueing never copy sample data. The pool caps the number
//! of live blocks; running out is reported as
//! [`MemPoolError::Exhausted`](crate::MemPoolError::Exhausted).

mod pool;
mod queue;

pub use pool::{MemChunk, MemPool};
pub use queue::{MemBlockQueue, QueueError, SeekMode};
