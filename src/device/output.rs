//! Destinations for mixed device audio.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::OutputError;
use crate::memory::MemChunk;

/// The hardware-facing end of a device.
///
/// The real-time thread writes one period of mixed audio per wakeup.
/// Implementations must not block; a failed write is reported as a
/// [`StreamEvent::OutputError`](crate::StreamEvent::OutputError) and the
/// device keeps running.
///
/// # Example
///
/// ```
/// use stream_mixer::device::DeviceOutput;
/// use stream_mixer::{MemChunk, OutputError};
///
/// struct CountingOutput {
///     bytes: usize,
/// }
///
/// impl DeviceOutput for CountingOutput {
///     fn name(&self) -> &str {
///         "counting"
///     }
///
///     fn write(&mut self, chunk: &MemChunk) -> Result<(), OutputError> {
///         self.bytes += chunk.len();
///         Ok(())
///     }
/// }
/// ```
pub trait DeviceOutput: Send {
    /// Human-readable name for logging and events.
    fn name(&self) -> &str;

    /// Writes mixed audio in the device's format.
    fn write(&mut self, chunk: &MemChunk) -> Result<(), OutputError>;
}

/// An output that discards everything written to it.
#[derive(Debug, Default)]
pub struct NullOutput {
    written: u64,
}

impl NullOutput {
    /// Creates a null output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes written so far.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl DeviceOutput for NullOutput {
    fn name(&self) -> &str {
        "null"
    }

    fn write(&mut self, chunk: &MemChunk) -> Result<(), OutputError> {
        self.written += chunk.len() as u64;
        Ok(())
    }
}

/// An output that forwards mixed audio to a tokio mpsc channel.
///
/// This is the primary way to get at what a device plays, e.g. to feed a
/// network transport or a test.
///
/// # Example
///
/// ```
/// use stream_mixer::device::ChannelOutput;
/// use stream_mixer::MemChunk;
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<MemChunk>(64);
/// let output = ChannelOutput::new(tx);
/// // Spawn a device with the output, then receive blocks:
/// // while let Some(chunk) = rx.recv().await { ... }
/// ```
#[derive(Debug)]
pub struct ChannelOutput {
    name: String,
    sender: mpsc::Sender<MemChunk>,
}

impl ChannelOutput {
    /// Creates an output with the given sender.
    ///
    /// Blocks are dropped with [`OutputError::Overflow`] when the channel is
    /// full, so size it for a few buffers' worth of periods.
    pub fn new(sender: mpsc::Sender<MemChunk>) -> Self {
        Self::with_name("channel", sender)
    }

    /// Creates an output with a custom name.
    pub fn with_name(name: impl Into<String>, sender: mpsc::Sender<MemChunk>) -> Self {
        Self {
            name: name.into(),
            sender,
        }
    }
}

impl DeviceOutput for ChannelOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, chunk: &MemChunk) -> Result<(), OutputError> {
        self.sender.try_send(chunk.clone()).map_err(|e| match e {
            TrySendError::Full(chunk) => OutputError::Overflow {
                dropped_bytes: chunk.len(),
            },
            TrySendError::Closed(_) => OutputError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_output_counts_bytes() {
        let mut output = NullOutput::new();
        output.write(&MemChunk::from_vec(vec![0; 16])).unwrap();
        output.write(&MemChunk::from_vec(vec![0; 8])).unwrap();
        assert_eq!(output.bytes_written(), 24);
        assert_eq!(output.name(), "null");
    }

    #[tokio::test]
    async fn test_channel_output_sends_chunks() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut output = ChannelOutput::new(tx);
        output.write(&MemChunk::from_vec(vec![1, 2, 3, 4])).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.as_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_channel_output_overflow() {
        let (tx, _rx) = mpsc::channel(1);
        let mut output = ChannelOutput::with_name("net", tx);
        output.write(&MemChunk::from_vec(vec![0; 4])).unwrap();

        let result = output.write(&MemChunk::from_vec(vec![0; 6]));
        assert_eq!(result, Err(OutputError::Overflow { dropped_bytes: 6 }));
        assert_eq!(output.name(), "net");
    }

    #[test]
    fn test_channel_output_closed() {
        let (tx, rx) = mpsc::channel(4);
        let mut output = ChannelOutput::new(tx);
        drop(rx);

        let result = output.write(&MemChunk::from_vec(vec![0; 4]));
        assert_eq!(result, Err(OutputError::Closed));
    }
}
