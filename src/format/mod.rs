//! Sample-level operations on interleaved byte buffers.
//!
//! This module provides:
//! - Format conversion between any two [`SampleFormat`](crate::SampleFormat)s
//! - G.711 A-law and mu-law companding
//! - Silence fill and in-place software volume
//! - Mixing several streams into one block

mod convert;
mod g711;
mod mix;
mod volume;

pub use convert::{
    convert, converted_len, decode_f32, decode_s16, encode_f32, encode_s16, f32_to_s16, s16_to_f32,
};
pub use g711::{alaw_to_s16, s16_to_alaw, s16_to_ulaw, ulaw_to_s16};
pub use mix::{mix, MixInput};
pub use volume::{apply_volume, is_silence, silence};
