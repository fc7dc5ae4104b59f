//! Sample formats, sample specs, channel maps and volumes.
//!
//! These are the value types every other module speaks. They are small,
//! `Copy` where possible, and validated once at stream creation so the
//! real-time path can trust them.

mod channel_map;
mod spec;
mod volume;

pub use channel_map::{ChannelMap, ChannelPosition, Layer};
pub use spec::{SampleFormat, SampleSpec, RATE_MAX};
pub use volume::{ChannelVolumes, Volume};

/// Maximum number of channels in a sample spec or channel map.
pub const CHANNELS_MAX: usize = 32;
