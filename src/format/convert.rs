//! Sample format conversion.
//!
//! Integer formats are decoded to a 32 bit full-scale intermediate, so any
//! pair of formats converts without a dedicated routine. Conversions to and
//! from the two working formats (S16 and F32 in host byte order) take
//! direct paths.

use super::g711;
use crate::sample::SampleFormat;

const I32_SCALE: f64 = 2_147_483_648.0;

/// Converts an F32 sample to S16.
///
/// Scales by 32768, rounds to nearest and clamps, so -1.0 maps to -32768
/// and 1.0 saturates at 32767.
#[inline]
#[must_use]
pub fn f32_to_s16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Converts an S16 sample to F32 in the range [-1.0, 1.0).
#[inline]
#[must_use]
pub fn s16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

#[inline]
fn f32_to_i32(sample: f32) -> i32 {
    (f64::from(sample) * I32_SCALE)
        .round()
        .clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

#[inline]
fn bytes2(b: &[u8]) -> [u8; 2] {
    [b[0], b[1]]
}

#[inline]
fn bytes4(b: &[u8]) -> [u8; 4] {
    [b[0], b[1], b[2], b[3]]
}

/// Decodes one sample to a 32 bit full-scale integer.
fn decode_i32(format: SampleFormat, b: &[u8]) -> i32 {
    match format {
        SampleFormat::U8 => (i32::from(b[0]) - 128) << 24,
        SampleFormat::Alaw => i32::from(g711::alaw_to_s16(b[0])) << 16,
        SampleFormat::Ulaw => i32::from(g711::ulaw_to_s16(b[0])) << 16,
        SampleFormat::S16Le => i32::from(i16::from_le_bytes(bytes2(b))) << 16,
        SampleFormat::S16Be => i32::from(i16::from_be_bytes(bytes2(b))) << 16,
        SampleFormat::F32Le | SampleFormat::F32Be => f32_to_i32(decode_f32(format, b)),
        SampleFormat::S32Le => i32::from_le_bytes(bytes4(b)),
        SampleFormat::S32Be => i32::from_be_bytes(bytes4(b)),
        SampleFormat::S24Le => i32::from_le_bytes([0, b[0], b[1], b[2]]),
        SampleFormat::S24Be => i32::from_be_bytes([b[0], b[1], b[2], 0]),
        SampleFormat::S24In32Le => i32::from_le_bytes(bytes4(b)) << 8,
        SampleFormat::S24In32Be => i32::from_be_bytes(bytes4(b)) << 8,
    }
}

/// Encodes a 32 bit full-scale integer; lower bits are truncated.
fn encode_i32(format: SampleFormat, v: i32, out: &mut [u8]) {
    match format {
        SampleFormat::U8 => out[0] = ((v >> 24) + 128) as u8,
        SampleFormat::Alaw => out[0] = g711::s16_to_alaw((v >> 16) as i16),
        SampleFormat::Ulaw => out[0] = g711::s16_to_ulaw((v >> 16) as i16),
        SampleFormat::S16Le => out[..2].copy_from_slice(&((v >> 16) as i16).to_le_bytes()),
        SampleFormat::S16Be => out[..2].copy_from_slice(&((v >> 16) as i16).to_be_bytes()),
        SampleFormat::F32Le | SampleFormat::F32Be => {
            encode_f32(format, (f64::from(v) / I32_SCALE) as f32, out);
        }
        SampleFormat::S32Le => out[..4].copy_from_slice(&v.to_le_bytes()),
        SampleFormat::S32Be => out[..4].copy_from_slice(&v.to_be_bytes()),
        SampleFormat::S24Le => out[..3].copy_from_slice(&v.to_le_bytes()[1..]),
        SampleFormat::S24Be => out[..3].copy_from_slice(&v.to_be_bytes()[..3]),
        SampleFormat::S24In32Le => out[..4].copy_from_slice(&(v >> 8).to_le_bytes()),
        SampleFormat::S24In32Be => out[..4].copy_from_slice(&(v >> 8).to_be_bytes()),
    }
}

/// Decodes one sample as float.
#[must_use]
pub fn decode_f32(format: SampleFormat, b: &[u8]) -> f32 {
    match format {
        SampleFormat::F32Le => f32::from_le_bytes(bytes4(b)),
        SampleFormat::F32Be => f32::from_be_bytes(bytes4(b)),
        SampleFormat::S16Le => s16_to_f32(i16::from_le_bytes(bytes2(b))),
        SampleFormat::S16Be => s16_to_f32(i16::from_be_bytes(bytes2(b))),
        _ => (f64::from(decode_i32(format, b)) / I32_SCALE) as f32,
    }
}

/// Encodes one float sample, clamping to the format's range.
pub fn encode_f32(format: SampleFormat, v: f32, out: &mut [u8]) {
    match format {
        SampleFormat::F32Le => out[..4].copy_from_slice(&v.to_le_bytes()),
        SampleFormat::F32Be => out[..4].copy_from_slice(&v.to_be_bytes()),
        SampleFormat::S16Le => out[..2].copy_from_slice(&f32_to_s16(v).to_le_bytes()),
        SampleFormat::S16Be => out[..2].copy_from_slice(&f32_to_s16(v).to_be_bytes()),
        _ => encode_i32(format, f32_to_i32(v), out),
    }
}

/// Decodes one sample as S16.
#[must_use]
pub fn decode_s16(format: SampleFormat, b: &[u8]) -> i16 {
    match format {
        SampleFormat::S16Le => i16::from_le_bytes(bytes2(b)),
        SampleFormat::S16Be => i16::from_be_bytes(bytes2(b)),
        SampleFormat::F32Le | SampleFormat::F32Be => f32_to_s16(decode_f32(format, b)),
        SampleFormat::Alaw => g711::alaw_to_s16(b[0]),
        SampleFormat::Ulaw => g711::ulaw_to_s16(b[0]),
        _ => (decode_i32(format, b) >> 16) as i16,
    }
}

/// Encodes one S16 sample.
pub fn encode_s16(format: SampleFormat, v: i16, out: &mut [u8]) {
    match format {
        SampleFormat::S16Le => out[..2].copy_from_slice(&v.to_le_bytes()),
        SampleFormat::S16Be => out[..2].copy_from_slice(&v.to_be_bytes()),
        SampleFormat::F32Le | SampleFormat::F32Be => encode_f32(format, s16_to_f32(v), out),
        SampleFormat::Alaw => out[0] = g711::s16_to_alaw(v),
        SampleFormat::Ulaw => out[0] = g711::s16_to_ulaw(v),
        _ => encode_i32(format, i32::from(v) << 16, out),
    }
}

/// Converts interleaved samples from one format to another.
///
/// `dst` must hold exactly as many samples of `to` as `src` holds of
/// `from`.
///
/// # Example
///
/// ```
/// use stream_mixer::format::convert;
/// use stream_mixer::SampleFormat;
///
/// let src = [0x80u8, 0xff, 0x00];
/// let mut dst = [0u8; 6];
/// convert(SampleFormat::U8, &src, SampleFormat::S16Le, &mut dst);
/// assert_eq!(i16::from_le_bytes([dst[0], dst[1]]), 0);
/// assert_eq!(i16::from_le_bytes([dst[4], dst[5]]), -32768);
/// ```
pub fn convert(from: SampleFormat, src: &[u8], to: SampleFormat, dst: &mut [u8]) {
    let (from_size, to_size) = (from.sample_size(), to.sample_size());
    debug_assert_eq!(src.len() / from_size, dst.len() / to_size);

    if from == to {
        dst.copy_from_slice(src);
        return;
    }

    let samples = src.chunks_exact(from_size).zip(dst.chunks_exact_mut(to_size));

    if to == SampleFormat::S16NE || from == SampleFormat::S16NE {
        for (s, d) in samples {
            encode_s16(to, decode_s16(from, s), d);
        }
    } else if to == SampleFormat::F32NE || from == SampleFormat::F32NE {
        for (s, d) in samples {
            encode_f32(to, decode_f32(from, s), d);
        }
    } else {
        for (s, d) in samples {
            encode_i32(to, decode_i32(from, s), d);
        }
    }
}

/// Size in bytes of `src_len` bytes of `from` once converted to `to`.
#[must_use]
pub fn converted_len(from: SampleFormat, src_len: usize, to: SampleFormat) -> usize {
    src_len / from.sample_size() * to.sample_size()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s16ne(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    fn f32ne(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    #[test]
    fn test_f32_to_s16_full_range() {
        assert_eq!(f32_to_s16(1.0), 32767);
        assert_eq!(f32_to_s16(-1.0), -32768);
        assert_eq!(f32_to_s16(0.0), 0);
        assert_eq!(f32_to_s16(0.5), 16384);
    }

    #[test]
    fn test_f32_to_s16_clamping() {
        assert_eq!(f32_to_s16(2.0), 32767);
        assert_eq!(f32_to_s16(-2.0), -32768);
    }

    #[test]
    fn test_s16_to_f32() {
        assert!((s16_to_f32(-32768) + 1.0).abs() < f32::EPSILON);
        assert!((s16_to_f32(16384) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_s16_to_f32_buffer() {
        let src = s16ne(&[0, 16384, -32768]);
        let mut dst = vec![0u8; 12];
        convert(SampleFormat::S16NE, &src, SampleFormat::F32NE, &mut dst);
        let out: Vec<f32> = dst
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(out, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_f32_to_s16_buffer_rounds() {
        let src = f32ne(&[0.25, -0.25, 1.5]);
        let mut dst = vec![0u8; 6];
        convert(SampleFormat::F32NE, &src, SampleFormat::S16NE, &mut dst);
        let out: Vec<i16> = dst
            .chunks_exact(2)
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(out, vec![8192, -8192, 32767]);
    }

    #[test]
    fn test_endian_swap() {
        let src = 0x1234i16.to_le_bytes();
        let mut dst = [0u8; 2];
        convert(SampleFormat::S16Le, &src, SampleFormat::S16Be, &mut dst);
        assert_eq!(dst, 0x1234i16.to_be_bytes());
    }

    #[test]
    fn test_s24_decoding() {
        let src = [0x00, 0x00, 0x80];
        assert_eq!(decode_s16(SampleFormat::S24Le, &src), -32768);
        let src = [0x7f, 0xff, 0xff];
        assert_eq!(decode_s16(SampleFormat::S24Be, &src), 32767);
    }

    #[test]
    fn test_s24_in_32_ignores_padding() {
        let padded = 0xab40_0000u32.to_le_bytes();
        assert_eq!(decode_s16(SampleFormat::S24In32Le, &padded), 0x4000);
    }

    #[test]
    fn test_s32_to_s24_truncates() {
        let src = 0x1234_5678i32.to_le_bytes();
        let mut dst = [0u8; 3];
        convert(SampleFormat::S32Le, &src, SampleFormat::S24Le, &mut dst);
        assert_eq!(dst, [0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_u8_conversion() {
        assert_eq!(decode_s16(SampleFormat::U8, &[0x80]), 0);
        assert_eq!(decode_s16(SampleFormat::U8, &[0x00]), -32768);
        let mut out = [0u8];
        encode_s16(SampleFormat::U8, 0, &mut out);
        assert_eq!(out[0], 0x80);
    }

    #[test]
    fn test_alaw_through_float() {
        let mut out = [0u8];
        encode_f32(SampleFormat::Alaw, 0.0, &mut out);
        assert_eq!(out[0], 0xd5);
        assert!(decode_f32(SampleFormat::Alaw, &out).abs() < 0.001);
    }

    #[test]
    fn test_converted_len() {
        assert_eq!(converted_len(SampleFormat::S16Le, 10, SampleFormat::F32Le), 20);
        assert_eq!(converted_len(SampleFormat::F32Le, 12, SampleFormat::S24Le), 9);
    }
}
