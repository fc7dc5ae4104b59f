//! # stream-mixer
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Resampling, channel remapping and per-stream render queues for the mixing
//! core of a sound server.
//!
//! `stream-mixer` takes variable-rate, variable-format audio from many
//! producers, converts it to the format of an output device, and hands the
//! device fixed-size blocks it can mix. Audio that was already rendered but
//! not yet played can be rewound and rewritten.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stream_mixer::device::{DeviceHandle, NullOutput};
//! use stream_mixer::adapter::BufferedProducer;
//! use stream_mixer::{DeviceConfig, SampleFormat, SampleSpec, StreamAdapterBuilder};
//!
//! let device = DeviceHandle::spawn(DeviceConfig::default(), Box::new(NullOutput::new()), None)?;
//!
//! let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
//! let producer = BufferedProducer::new(spec);
//! let id = device
//!     .link(StreamAdapterBuilder::new(spec).name("voice"), Box::new(producer))
//!     .await?;
//!
//! device.set_mute(id, true)?;
//! device.unlink(id).await?;
//! device.stop().await?;
//! ```
//!
//! ## Architecture
//!
//! The crate keeps a strict boundary between two contexts per device:
//!
//! - **Real-time thread**: runs the mixing pass. It owns every linked
//!   [`StreamAdapter`](adapter::StreamAdapter), its resampler and its render
//!   queue, and never blocks on the control side.
//! - **Control context**: a Tokio runtime creating and tearing down streams
//!   and pushing volume, mute and state changes as messages.
//!
//! Every cross-context change travels as a [`DeviceMessage`](device::DeviceMessage)
//! over a bounded FIFO queue.
//!
//! The data path of a playback stream is:
//!
//! ```text
//! producer.pop → soft volume (if maps differ) → convert → remap → resample → convert → render queue → device mix
//! ```

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod adapter;
mod builder;
pub mod capture;
mod config;
pub mod device;
mod error;
mod event;
pub mod format;
pub mod memory;
pub mod remap;
pub mod resampler;
pub mod sample;
pub mod transport;

pub use builder::StreamAdapterBuilder;
pub use config::{DeviceConfig, DevicePreset, PoolConfig};
pub use error::{
    ConfigurationError, MemPoolError, OutputError, ProducerError, StreamError, StreamMixerError,
};
pub use event::{event_callback, EventCallback, StreamEvent};
pub use memory::{MemChunk, MemPool};
pub use resampler::{ResampleMethod, Resampler, ResamplerFlags};
pub use sample::{
    ChannelMap, ChannelPosition, ChannelVolumes, SampleFormat, SampleSpec, Volume, CHANNELS_MAX,
};
