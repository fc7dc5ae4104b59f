//! Consumers receiving captured audio.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::memory::MemChunk;

/// A destination for audio captured from a device.
///
/// Called on the device thread; implementations must not block.
pub trait CaptureConsumer: Send {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Receives converted audio in the capture stream's format.
    fn push(&mut self, chunk: &MemChunk);

    /// Returns true if the consumer can take back audio it already
    /// received. Consumers that cannot get their audio delayed by the
    /// device's rewind depth instead.
    ///
    /// Default implementation returns false.
    fn supports_rewind(&self) -> bool {
        false
    }

    /// The last `nbytes` pushed were rewritten by the device and will be
    /// pushed again.
    ///
    /// Default implementation does nothing.
    fn process_rewind(&mut self, _nbytes: usize) {}
}

/// A consumer that forwards captured audio to a tokio mpsc channel.
///
/// Sending never blocks: when the receiver falls behind, chunks are dropped
/// and counted.
///
/// # Example
///
/// ```
/// use stream_mixer::capture::ChannelConsumer;
/// use stream_mixer::MemChunk;
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<MemChunk>(32);
/// let consumer = ChannelConsumer::new(tx);
/// // Add the consumer to a device, then receive chunks:
/// // while let Some(chunk) = rx.recv().await { ... }
/// ```
pub struct ChannelConsumer {
    name: String,
    sender: mpsc::Sender<MemChunk>,
    dropped_bytes: u64,
}

impl ChannelConsumer {
    /// Creates a consumer with the given sender.
    pub fn new(sender: mpsc::Sender<MemChunk>) -> Self {
        Self::with_name("channel", sender)
    }

    /// Creates a consumer with a custom name.
    pub fn with_name(name: impl Into<String>, sender: mpsc::Sender<MemChunk>) -> Self {
        Self {
            name: name.into(),
            sender,
            dropped_bytes: 0,
        }
    }

    /// Bytes dropped because the receiver was full or gone.
    #[must_use]
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }
}

impl CaptureConsumer for ChannelConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn push(&mut self, chunk: &MemChunk) {
        match self.sender.try_send(chunk.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(chunk)) => {
                if self.dropped_bytes == 0 {
                    tracing::warn!(consumer = %self.name, "Capture receiver full, dropping audio");
                }
                self.dropped_bytes += chunk.len() as u64;
            }
            Err(TrySendError::Closed(chunk)) => {
                if self.dropped_bytes == 0 {
                    tracing::debug!(consumer = %self.name, "Capture receiver closed");
                }
                self.dropped_bytes += chunk.len() as u64;
            }
        }
    }
}
