//! Messages from the control side to the device thread.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::adapter::{StreamAdapter, StreamId, StreamState};
use crate::capture::CaptureAdapter;
use crate::error::ConfigurationError;
use crate::sample::ChannelVolumes;

/// A change the control side asks the device thread to make.
///
/// Messages are processed in the order they were sent, before the mixing
/// pass that follows them. Variants carrying a `reply` are answered once
/// processed; the rest are fire-and-forget.
#[derive(Debug)]
pub enum DeviceMessage {
    /// Start mixing a playback stream.
    AddAdapter {
        /// The stream; owned by the device thread from now on.
        adapter: Box<StreamAdapter>,
        /// Acknowledged once the stream is in the mix.
        reply: oneshot::Sender<()>,
    },

    /// Stop mixing a playback stream and hand it back.
    RemoveAdapter {
        /// The stream.
        id: StreamId,
        /// Receives the adapter, or `None` if it was already gone.
        reply: oneshot::Sender<Option<Box<StreamAdapter>>>,
    },

    /// Start feeding a capture stream.
    AddCapture {
        /// The stream; owned by the device thread from now on.
        capture: Box<CaptureAdapter>,
        /// Acknowledged once the stream receives audio.
        reply: oneshot::Sender<()>,
    },

    /// Stop feeding a capture stream and hand it back.
    RemoveCapture {
        /// The stream.
        id: StreamId,
        /// Receives the adapter, or `None` if it was already gone.
        reply: oneshot::Sender<Option<Box<CaptureAdapter>>>,
    },

    /// Replace a stream's volume and volume factor.
    SetVolume {
        /// The stream.
        id: StreamId,
        /// User-facing volume.
        volume: ChannelVolumes,
        /// Attenuation applied on top of the volume.
        factor: ChannelVolumes,
    },

    /// Mute or unmute a stream.
    SetMute {
        /// The stream.
        id: StreamId,
        /// New mute state.
        muted: bool,
    },

    /// Cork or uncork a stream.
    SetState {
        /// The stream.
        id: StreamId,
        /// [`StreamState::Running`] or [`StreamState::Corked`].
        state: StreamState,
    },

    /// Change the input rate of a variable-rate stream.
    SetRate {
        /// The stream.
        id: StreamId,
        /// New rate in Hz.
        rate: u32,
        /// Result of the change; `None` if the stream is gone.
        reply: oneshot::Sender<Option<Result<(), ConfigurationError>>>,
    },

    /// Rewind and optionally rewrite audio a stream already rendered.
    RequestRewind {
        /// The stream.
        id: StreamId,
        /// Stream bytes; 0 means as much as possible.
        nbytes: usize,
        /// Regenerate the rewound region from the producer.
        rewrite: bool,
        /// Silence what could not be regenerated.
        flush: bool,
    },

    /// Ask for a stream's current latency.
    GetLatency {
        /// The stream.
        id: StreamId,
        /// The latency; `None` if the stream is gone.
        reply: oneshot::Sender<Option<Duration>>,
    },

    /// Stop the device thread.
    Shutdown,
}

impl DeviceMessage {
    /// Short name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddAdapter { .. } => "add-adapter",
            Self::RemoveAdapter { .. } => "remove-adapter",
            Self::AddCapture { .. } => "add-capture",
            Self::RemoveCapture { .. } => "remove-capture",
            Self::SetVolume { .. } => "set-volume",
            Self::SetMute { .. } => "set-mute",
            Self::SetState { .. } => "set-state",
            Self::SetRate { .. } => "set-rate",
            Self::RequestRewind { .. } => "request-rewind",
            Self::GetLatency { .. } => "get-latency",
            Self::Shutdown => "shutdown",
        }
    }
}
