//! Devices: the mixing pass, its real-time thread and the control handle.
//!
//! A device mixes every linked playback stream into a buffer of
//! `max_rewind` bytes and writes one period of it per wakeup to a
//! [`DeviceOutput`]. Capture streams receive a copy of each mixed block.
//!
//! ```text
//!                    ┌──────────────── real-time thread ────────────────┐
//! DeviceHandle ──msg─▶ DeviceCore: rewind → peek/mix/drop → buffer → output
//!   (control)        │                         └─▶ CaptureAdapter ─▶ consumer
//!                    └───────────────────────────────────────────────────┘
//! ```
//!
//! The control side never touches a linked stream directly. Volume, mute
//! and cork changes are sent as [`DeviceMessage`]s and take effect before
//! the next mixing pass.

mod handle;
mod message;
mod mixer;
mod output;
mod stats;
mod thread;

pub use handle::{DeviceHandle, StreamInfo, StreamKind};
pub use message::DeviceMessage;
pub use mixer::DeviceCore;
pub use output::{ChannelOutput, DeviceOutput, NullOutput};
pub use stats::DeviceStats;
