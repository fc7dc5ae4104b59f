//! Mixing several streams into one device block.

use super::convert::{decode_f32, encode_f32};
use super::volume::scale_s16;
use crate::sample::{ChannelVolumes, SampleFormat, SampleSpec};

/// One stream contributing to a mix.
#[derive(Debug, Clone, Copy)]
pub struct MixInput<'a> {
    /// Samples in the device format, at least as long as the output.
    pub data: &'a [u8],
    /// Per-channel gain applied while mixing.
    pub volume: &'a ChannelVolumes,
}

/// Sums `inputs` into `out`, applying each input's volume.
///
/// Signed 16 bit host-order output is mixed in integer arithmetic with
/// saturation; every other format is mixed in float.
pub fn mix(inputs: &[MixInput<'_>], spec: &SampleSpec, out: &mut [u8]) {
    let size = spec.sample_size();
    let channels = spec.channels.max(1) as usize;
    debug_assert!(inputs.iter().all(|i| i.data.len() >= out.len()));

    if spec.format == SampleFormat::S16NE {
        for (n, d) in out.chunks_exact_mut(size).enumerate() {
            let channel = n % channels;
            let offset = n * size;
            let sum: i32 = inputs
                .iter()
                .map(|input| {
                    let s = i16::from_ne_bytes([input.data[offset], input.data[offset + 1]]);
                    i32::from(scale_s16(s, input.volume.get(channel)))
                })
                .sum();
            let sum = sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
            d.copy_from_slice(&sum.to_ne_bytes());
        }
        return;
    }

    for (n, d) in out.chunks_exact_mut(size).enumerate() {
        let channel = n % channels;
        let offset = n * size;
        let sum: f32 = inputs
            .iter()
            .map(|input| {
                let gain = input.volume.get(channel).linear() as f32;
                decode_f32(spec.format, &input.data[offset..offset + size]) * gain
            })
            .sum();
        encode_f32(spec.format, sum, d);
    }
}
