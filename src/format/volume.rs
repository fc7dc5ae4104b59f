//! Silence fill and software volume in place.

use super::convert::{decode_f32, decode_s16, encode_f32, encode_s16};
use crate::sample::{ChannelVolumes, SampleFormat, Volume};

/// Fills `data` with the silence pattern of `format`.
pub fn silence(format: SampleFormat, data: &mut [u8]) {
    data.fill(format.silence_byte());
}

/// Returns true if `data` contains only the silence pattern of `format`.
#[must_use]
pub fn is_silence(format: SampleFormat, data: &[u8]) -> bool {
    let byte = format.silence_byte();
    data.iter().all(|b| *b == byte)
}

#[inline]
pub(crate) fn scale_s16(sample: i16, volume: Volume) -> i16 {
    let t = (i64::from(sample) * i64::from(volume.0)) >> 16;
    t.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
}

/// Multiplies every sample by the volume of its channel.
///
/// 16 bit and narrower formats use the integer 16.16 multiplier of
/// [`Volume`]; wider formats are scaled in float.
pub fn apply_volume(format: SampleFormat, channels: u8, data: &mut [u8], volumes: &ChannelVolumes) {
    if volumes.is_norm() {
        return;
    }
    let size = format.sample_size();
    let channels = channels.max(1) as usize;

    match format {
        SampleFormat::U8
        | SampleFormat::Alaw
        | SampleFormat::Ulaw
        | SampleFormat::S16Le
        | SampleFormat::S16Be => {
            for (i, s) in data.chunks_exact_mut(size).enumerate() {
                let v = scale_s16(decode_s16(format, s), volumes.get(i % channels));
                encode_s16(format, v, s);
            }
        }
        _ => {
            for (i, s) in data.chunks_exact_mut(size).enumerate() {
                let gain = volumes.get(i % channels).linear() as f32;
                encode_f32(format, decode_f32(format, s) * gain, s);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_patterns() {
        let mut buf = [0u8; 4];
        silence(SampleFormat::U8, &mut buf);
        assert_eq!(buf, [0x80; 4]);
        assert!(is_silence(SampleFormat::U8, &buf));
        assert!(!is_silence(SampleFormat::S16Le, &buf));
    }

    #[test]
    fn test_half_volume_s16() {
        let mut data: Vec<u8> = [1000i16, -1000].iter().flat_map(|v| v.to_ne_bytes()).collect();
        let volumes = ChannelVolumes::uniform(2, Volume(0x8000));
        apply_volume(SampleFormat::S16NE, 2, &mut data, &volumes);
        assert_eq!(i16::from_ne_bytes([data[0], data[1]]), 500);
        assert_eq!(i16::from_ne_bytes([data[2], data[3]]), -500);
    }

    #[test]
    fn test_per_channel_volume_f32() {
        let mut data: Vec<u8> = [0.5f32, 0.5].iter().flat_map(|v| v.to_ne_bytes()).collect();
        let volumes = ChannelVolumes::from_slice(&[Volume::NORM, Volume::MUTED]);
        apply_volume(SampleFormat::F32NE, 2, &mut data, &volumes);
        assert_eq!(f32::from_ne_bytes([data[0], data[1], data[2], data[3]]), 0.5);
        assert_eq!(f32::from_ne_bytes([data[4], data[5], data[6], data[7]]), 0.0);
    }

    #[test]
    fn test_amplification_clamps() {
        let mut data = 30000i16.to_ne_bytes().to_vec();
        apply_volume(
            SampleFormat::S16NE,
            1,
            &mut data,
            &ChannelVolumes::uniform(1, Volume(0x20000)),
        );
        assert_eq!(i16::from_ne_bytes([data[0], data[1]]), i16::MAX);
    }
}
