//! Error types for stream-mixer.
//!
//! Errors follow the failure classes of the mixing core:
//! - **Configuration** ([`ConfigurationError`]): rejected at stream or
//!   resampler creation, never retried
//! - **Resource exhaustion** ([`MemPoolError`]): the block pool ran dry; the
//!   caller may retry later
//! - **Producer faults** ([`ProducerError`]): fatal to one stream, never to
//!   the device
//!
//! Misaligned lengths, render queue overflow and dropping more than was
//! peeked are caller bugs and are checked with assertions instead.

use crate::adapter::StreamId;
use crate::resampler::ResampleMethod;

/// Errors raised while validating a stream, resampler or device setup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// The sample spec has a zero or out-of-range rate or channel count.
    #[error("invalid sample spec: {reason}")]
    InvalidSampleSpec {
        /// What is wrong with the sample spec.
        reason: String,
    },

    /// The channel map is empty or otherwise unusable.
    #[error("invalid channel map: {reason}")]
    InvalidChannelMap {
        /// What is wrong with the map.
        reason: String,
    },

    /// More channels than the mixing core supports.
    #[error("{channels} channels requested, at most {max} are supported")]
    TooManyChannels {
        /// Requested channel count.
        channels: usize,
        /// Supported maximum.
        max: usize,
    },

    /// The channel map length does not match the sample spec.
    #[error("channel map has {map_len} positions but the sample spec has {channels} channels")]
    ChannelMapMismatch {
        /// Channels in the sample spec.
        channels: u8,
        /// Positions in the channel map.
        map_len: usize,
    },

    /// The remapper was asked to work on a format other than S16 or F32.
    #[error("remapping is not supported in {format} working format")]
    UnsupportedWorkFormat {
        /// Name of the rejected format.
        format: &'static str,
    },

    /// No resampler backend is available, not even the fallback.
    #[error("no resampler backend available for method '{method}'")]
    NoBackend {
        /// The method that could not be served.
        method: ResampleMethod,
    },

    /// The backend rejected its construction parameters.
    #[error("resampler backend '{method}' failed to initialize: {reason}")]
    BackendInit {
        /// The method being constructed.
        method: ResampleMethod,
        /// Backend-supplied reason.
        reason: String,
    },

    /// The rate of a stream created without variable-rate support was changed.
    #[error("stream was not created with variable-rate support")]
    NotVariableRate,

    /// A resample method name could not be parsed.
    #[error("unknown resample method: {name}")]
    UnknownResampleMethod {
        /// The rejected name.
        name: String,
    },
}

impl ConfigurationError {
    /// Creates an invalid sample spec error with the given reason.
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        Self::InvalidSampleSpec {
            reason: reason.into(),
        }
    }

    /// Creates an invalid channel map error with the given reason.
    pub fn invalid_map(reason: impl Into<String>) -> Self {
        Self::InvalidChannelMap {
            reason: reason.into(),
        }
    }
}

/// The block pool could not satisfy an allocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemPoolError {
    /// Every block slot is in use.
    #[error("memory pool exhausted ({max_blocks} blocks in use)")]
    Exhausted {
        /// Configured slot count.
        max_blocks: usize,
    },
}

/// Hard failure reported by a stream's producer.
///
/// Returning "no data" is not an error; producers report that with `Ok(None)`
/// and the stream plays silence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProducerError {
    /// The producer's upstream went away.
    #[error("producer disconnected")]
    Disconnected,

    /// The producer failed while reading or decoding its data.
    #[error("producer failed: {reason}")]
    Failed {
        /// Description of what went wrong.
        reason: String,
    },
}

impl ProducerError {
    /// Creates a failure with the given reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Errors a stream adapter can hit while the device pulls from it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The producer failed; the stream has to be killed.
    #[error(transparent)]
    Producer(#[from] ProducerError),

    /// A conversion buffer could not be allocated; the stream plays silence
    /// for this pass.
    #[error(transparent)]
    Resource(#[from] MemPoolError),
}

/// Errors raised by a [`DeviceOutput`](crate::device::DeviceOutput).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutputError {
    /// The write did not reach its destination.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// The receiver fell behind and the block was dropped.
    #[error("output overflow, dropped {dropped_bytes} bytes")]
    Overflow {
        /// Bytes that were dropped.
        dropped_bytes: usize,
    },

    /// The receiving side was closed.
    #[error("output closed")]
    Closed,
}

/// Errors returned by the control-side API.
#[derive(Debug, thiserror::Error)]
pub enum StreamMixerError {
    /// The stream or device configuration was rejected.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The block pool is exhausted.
    #[error(transparent)]
    Resource(#[from] MemPoolError),

    /// The device thread is no longer running.
    #[error("device stopped")]
    DeviceStopped,

    /// No stream with this id is linked to the device.
    #[error("unknown stream {id}")]
    UnknownStream {
        /// The id that was not found.
        id: StreamId,
    },

    /// The device message queue is full.
    #[error("device message queue full")]
    QueueFull,

    /// The real-time thread could not be started.
    #[error("failed to spawn device thread: {0}")]
    Spawn(#[source] std::io::Error),
}
