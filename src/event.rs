//! Runtime events for monitoring streams and devices.
//!
//! Events are non-fatal notifications. The device keeps running after an
//! event is emitted; they are for logging and metrics, not error handling.
//! Callbacks may run on the real-time thread, so they must return quickly.

use std::sync::Arc;

use crate::adapter::StreamId;

/// Runtime events emitted by devices and stream adapters.
///
/// # Example
///
/// ```
/// use stream_mixer::StreamEvent;
///
/// fn handle_event(event: StreamEvent) {
///     match event {
///         StreamEvent::StreamLinked { stream } => eprintln!("{stream} linked"),
///         StreamEvent::StreamUnlinked { stream } => eprintln!("{stream} unlinked"),
///         StreamEvent::StreamKilled { stream, reason } => eprintln!("{stream} killed: {reason}"),
///         StreamEvent::Underrun { stream } => eprintln!("{stream} ran dry"),
///         StreamEvent::RewindProcessed { nbytes } => eprintln!("rewound {nbytes} bytes"),
///         StreamEvent::OutputError { output, error } => eprintln!("{output}: {error}"),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A stream was attached to the device and is being mixed.
    StreamLinked {
        /// The stream.
        stream: StreamId,
    },

    /// A stream was detached from the device.
    StreamUnlinked {
        /// The stream.
        stream: StreamId,
    },

    /// A stream's producer failed and the stream was unlinked.
    ///
    /// Other streams on the device are not affected.
    StreamKilled {
        /// The stream.
        stream: StreamId,
        /// Description of the producer fault.
        reason: String,
    },

    /// A playing stream had no data and the device mixed silence for it.
    ///
    /// Emitted once per underrun, not once per silent block.
    Underrun {
        /// The stream.
        stream: StreamId,
    },

    /// The device rewound and rewrote already rendered audio.
    RewindProcessed {
        /// Bytes rewound, in the device's format.
        nbytes: usize,
    },

    /// The device output rejected a block.
    OutputError {
        /// Name of the output.
        output: String,
        /// Description of the error.
        error: String,
    },
}

/// Callback type for receiving runtime events.
///
/// Pass one to [`DeviceHandle::spawn`](crate::device::DeviceHandle::spawn)
/// to receive notifications about linked, killed and underrunning streams.
///
/// # Example
///
/// ```ignore
/// use stream_mixer::{device::DeviceHandle, event_callback, DeviceConfig};
///
/// let device = DeviceHandle::spawn(
///     DeviceConfig::default(),
///     Box::new(NullOutput::new()),
///     Some(event_callback(|event| tracing::warn!(?event, "device event"))),
/// )?;
/// ```
pub type EventCallback = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use stream_mixer::{event_callback, StreamEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(StreamEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn emit(callback: Option<&EventCallback>, event: StreamEvent) {
    if let Some(cb) = callback {
        cb(event);
    }
}
