//! Playback stream adapters.
//!
//! A [`StreamAdapter`] sits between one producer and one device. The device
//! loop asks it for audio with [`peek`](StreamAdapter::peek), consumes what
//! it mixed with [`drop_bytes`](StreamAdapter::drop_bytes), and rewinds it with
//! [`process_rewind`](StreamAdapter::process_rewind) when already mixed
//! audio has to be rewritten. In between, the adapter pulls encoded audio
//! from its [`StreamProducer`], converts it to the device format and keeps
//! it in a render queue.
//!
//! ```text
//! producer.pop → [soft volume] → resampler.run → render queue → peek/drop
//! ```

mod producer;
mod render;
mod rewind;
mod signal;

pub use producer::{BufferedProducer, RingProducer, StreamProducer};
pub use render::StreamAdapter;
pub use rewind::RewindRequest;
pub use signal::SignalBuffer;

use std::fmt;
use std::time::Duration;

use crate::resampler::ResampleMethod;
use crate::sample::{ChannelMap, SampleSpec};

/// Identifier of a stream attached to a device.
///
/// Ids are unique per device and shared by playback and capture streams.
///
/// # Example
///
/// ```
/// use stream_mixer::adapter::StreamId;
///
/// let id = StreamId::new(3);
/// assert_eq!(id.to_string(), "#3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u32);

impl StreamId {
    /// Creates an id from its index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Numeric index of the id.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a stream.
///
/// ```text
/// Init → Running ⇄ Corked → Unlinked
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Created but not yet attached to the device loop.
    Init,
    /// Mixed by the device.
    Running,
    /// Attached but paused; the device mixes silence for it.
    Corked,
    /// Detached for good.
    Unlinked,
}

impl StreamState {
    /// Returns true while the device loop owns the stream.
    #[must_use]
    pub const fn is_linked(self) -> bool {
        matches!(self, Self::Running | Self::Corked)
    }
}

/// Latency a device can operate at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyRange {
    /// The device always buffers this much.
    Fixed(Duration),
    /// The device can be reconfigured within these bounds.
    Dynamic {
        /// Lowest supported latency.
        min: Duration,
        /// Highest supported latency.
        max: Duration,
    },
}

/// What a device exposes to the streams attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    /// Format the device mixes in.
    pub spec: SampleSpec,
    /// Channel positions of the device.
    pub map: ChannelMap,
    /// Bytes of already rendered audio the device can rewind.
    pub max_rewind: usize,
    /// Largest single request the device makes, in bytes.
    pub max_request: usize,
    /// Latency of the device.
    pub latency: LatencyRange,
    /// Method for streams that do not choose one.
    pub resample_method: ResampleMethod,
}

impl DeviceInfo {
    /// Creates device info with no rewind capability.
    #[must_use]
    pub fn new(spec: SampleSpec, map: ChannelMap) -> Self {
        Self {
            spec,
            map,
            max_rewind: 0,
            max_request: spec.frame_size(),
            latency: LatencyRange::Fixed(Duration::ZERO),
            resample_method: ResampleMethod::Auto,
        }
    }
}
