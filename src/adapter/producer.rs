//! Producers feeding playback streams.
//!
//! A [`StreamProducer`] is what a stream adapter pulls encoded audio from.
//! The crate provides two built-in producers:
//!
//! - [`BufferedProducer`]: a shared, rewindable queue filled from any thread
//! - [`RingProducer`]: a lock-free ring buffer filled through its writer half

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::StreamState;
use crate::error::ProducerError;
use crate::memory::{MemBlockQueue, MemChunk, MemPool, QueueError};
use crate::sample::SampleSpec;

/// Default capacity of a [`BufferedProducer`] in bytes.
const BUFFERED_MAX_LENGTH: usize = 4 * 1024 * 1024;

/// A source of audio for one playback stream.
///
/// Every method runs on the device thread and must not block.
///
/// # Implementation Notes
///
/// - `pop` returns `Ok(None)` when no data is ready; the stream then plays
///   silence and counts an underrun
/// - An `Err` from `pop` is fatal: the device kills the stream
/// - A producer that keeps a history of handed out audio can honor
///   `process_rewind` and give the same bytes out again
///
/// # Example
///
/// ```
/// use stream_mixer::adapter::StreamProducer;
/// use stream_mixer::{MemChunk, ProducerError};
///
/// struct Ones;
///
/// impl StreamProducer for Ones {
///     fn name(&self) -> &str {
///         "ones"
///     }
///
///     fn pop(&mut self, nbytes: usize) -> Result<Option<MemChunk>, ProducerError> {
///         Ok(Some(MemChunk::from_vec(vec![1; nbytes])))
///     }
/// }
/// ```
pub trait StreamProducer: Send {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Hands out up to roughly `nbytes` of audio in the stream's format.
    ///
    /// Returned chunks must be frame aligned. Returning more than asked
    /// for is allowed.
    fn pop(&mut self, nbytes: usize) -> Result<Option<MemChunk>, ProducerError>;

    /// The last `nbytes` handed out were not played and should be handed
    /// out again. Called with 0 after every device rewind.
    ///
    /// Default implementation does nothing.
    fn process_rewind(&mut self, _nbytes: usize) {}

    /// Largest rewind the device may ask for, in stream bytes.
    ///
    /// Default implementation does nothing.
    fn update_max_rewind(&mut self, _nbytes: usize) {}

    /// Largest request the device may make, in stream bytes.
    ///
    /// Default implementation does nothing.
    fn update_max_request(&mut self, _nbytes: usize) {}

    /// Returns true if the producer has nothing left, so that rewound
    /// audio queued downstream can be discarded.
    ///
    /// Default implementation returns false.
    fn process_underrun(&mut self) -> bool {
        false
    }

    /// The stream moved to a new state.
    ///
    /// Default implementation does nothing.
    fn state_changed(&mut self, _state: StreamState) {}
}

/// A producer backed by a shared block queue.
///
/// Clones share the queue: keep one handle to push audio while the stream
/// owns another. The queue keeps enough history to honor device rewinds.
///
/// After [`close`](Self::close), the producer reports a disconnect once the
/// queued audio has been played, which ends the stream.
///
/// The device thread never waits for the queue lock. If a push holds it
/// when the device pulls, the pull yields no data and the stream plays
/// silence for that pass; a rewind arriving at that moment is skipped.
/// Use [`RingProducer`] when the writer pushes continuously.
///
/// # Example
///
/// ```
/// use stream_mixer::adapter::BufferedProducer;
/// use stream_mixer::{MemChunk, SampleFormat, SampleSpec};
///
/// let producer = BufferedProducer::new(SampleSpec::new(SampleFormat::S16NE, 8000, 1));
/// let writer = producer.clone();
/// writer.push(&MemChunk::from_vec(vec![0; 160])).unwrap();
/// assert_eq!(producer.len(), 160);
/// ```
#[derive(Clone)]
pub struct BufferedProducer {
    name: String,
    spec: SampleSpec,
    queue: Arc<Mutex<MemBlockQueue>>,
    closed: Arc<AtomicBool>,
}

impl BufferedProducer {
    /// Creates a producer holding up to 4 MiB of audio.
    #[must_use]
    pub fn new(spec: SampleSpec) -> Self {
        Self::with_capacity(spec, BUFFERED_MAX_LENGTH)
    }

    /// Creates a producer holding up to `max_length` bytes of audio.
    #[must_use]
    pub fn with_capacity(spec: SampleSpec, max_length: usize) -> Self {
        let silence = MemChunk::silence(spec.format, spec.frame_align(64 * 1024).max(spec.frame_size()));
        Self {
            name: "buffered".to_string(),
            spec,
            queue: Arc::new(Mutex::new(MemBlockQueue::new(
                "producer",
                max_length,
                spec.frame_size(),
                0,
                0,
                silence,
            ))),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the name used in log messages.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Format the producer expects.
    #[must_use]
    pub fn spec(&self) -> &SampleSpec {
        &self.spec
    }

    /// Queues audio for playback.
    pub fn push(&self, chunk: &MemChunk) -> Result<(), QueueError> {
        self.queue.lock().push(chunk)
    }

    /// Queues raw bytes for playback.
    pub fn push_bytes(&self, data: &[u8]) -> Result<(), QueueError> {
        self.push(&MemChunk::from_vec(data.to_vec()))
    }

    /// Bytes queued and not yet handed out.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().length()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Marks the end of the audio.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl StreamProducer for BufferedProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn pop(&mut self, nbytes: usize) -> Result<Option<MemChunk>, ProducerError> {
        let Some(mut queue) = self.queue.try_lock() else {
            tracing::trace!(producer = %self.name, "Queue busy, no data this pass");
            return Ok(None);
        };
        if !queue.is_readable() {
            if self.closed.load(Ordering::Acquire) {
                return Err(ProducerError::Disconnected);
            }
            return Ok(None);
        }
        let Some(mut chunk) = queue.peek() else {
            return Ok(None);
        };
        let n = self
            .spec
            .frame_align(nbytes)
            .max(self.spec.frame_size())
            .min(chunk.len());
        chunk.truncate(n);
        queue.drop_bytes(n);
        Ok(Some(chunk))
    }

    fn process_rewind(&mut self, nbytes: usize) {
        if nbytes > 0 {
            match self.queue.try_lock() {
                Some(mut queue) => {
                    tracing::trace!(producer = %self.name, nbytes, "Rewinding producer queue");
                    queue.rewind(nbytes);
                }
                None => tracing::debug!(producer = %self.name, nbytes, "Queue busy, skipping rewind"),
            }
        }
    }

    fn update_max_rewind(&mut self, nbytes: usize) {
        self.queue.lock().set_max_rewind(nbytes);
    }

    fn process_underrun(&mut self) -> bool {
        // A busy queue is being written to.
        self.queue.try_lock().is_some_and(|queue| !queue.is_readable())
    }
}

impl std::fmt::Debug for BufferedProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedProducer")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("queued", &self.len())
            .finish()
    }
}

/// A producer reading from a lock-free ring buffer.
///
/// The writer half is handed back at construction and can live on any
/// thread, e.g. a network receiver. The ring keeps no history, so device
/// rewinds cannot be honored and already mixed audio is simply replayed
/// as silence.
pub struct RingProducer {
    name: String,
    spec: SampleSpec,
    pool: MemPool,
    consumer: HeapCons<u8>,
}

impl RingProducer {
    /// Creates a producer with a ring of `capacity` bytes and returns it
    /// together with the ring's writer half.
    #[must_use]
    pub fn new(spec: SampleSpec, pool: MemPool, capacity: usize) -> (Self, HeapProd<u8>) {
        let (producer, consumer) = HeapRb::<u8>::new(capacity.max(spec.frame_size())).split();
        (
            Self {
                name: "ring".to_string(),
                spec,
                pool,
                consumer,
            },
            producer,
        )
    }

    /// Bytes waiting in the ring.
    #[must_use]
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }
}

impl StreamProducer for RingProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn pop(&mut self, nbytes: usize) -> Result<Option<MemChunk>, ProducerError> {
        let n = self
            .spec
            .frame_align(self.consumer.occupied_len().min(nbytes.min(self.pool.block_size_max())));
        if n == 0 {
            return Ok(None);
        }
        let mut chunk = match self.pool.allocate(n) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(producer = %self.name, error = %e, "No block for ring data");
                return Ok(None);
            }
        };
        let read = match chunk.make_writable(&self.pool) {
            Ok(buf) => self.consumer.pop_slice(buf),
            Err(_) => return Ok(None),
        };
        chunk.truncate(read);
        Ok(Some(chunk))
    }
}

impl std::fmt::Debug for RingProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingProducer")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("available", &self.available())
            .finish()
    }
}
