//! G.711 A-law and mu-law companding.

const SIGN_BIT: u8 = 0x80;
const QUANT_MASK: u8 = 0x0f;
const SEG_SHIFT: u8 = 4;
const SEG_MASK: u8 = 0x70;

const SEG_AEND: [i32; 8] = [0x1f, 0x3f, 0x7f, 0xff, 0x1ff, 0x3ff, 0x7ff, 0xfff];
const SEG_UEND: [i32; 8] = [0x3f, 0x7f, 0xff, 0x1ff, 0x3ff, 0x7ff, 0xfff, 0x1fff];

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 8159;

fn segment(value: i32, table: &[i32; 8]) -> usize {
    table.iter().position(|end| value <= *end).unwrap_or(table.len())
}

/// Decodes an A-law byte to a 16 bit sample.
#[must_use]
pub fn alaw_to_s16(a: u8) -> i16 {
    let a = a ^ 0x55;
    let mut t = i32::from(a & QUANT_MASK) << 4;
    let seg = (a & SEG_MASK) >> SEG_SHIFT;
    match seg {
        0 => t += 8,
        1 => t += 0x108,
        _ => {
            t += 0x108;
            t <<= seg - 1;
        }
    }
    (if a & SIGN_BIT != 0 { t } else { -t }) as i16
}

/// Encodes a 16 bit sample as A-law.
#[must_use]
pub fn s16_to_alaw(sample: i16) -> u8 {
    let mut pcm = i32::from(sample) >> 3;
    let mask = if pcm >= 0 {
        0xd5
    } else {
        pcm = -pcm - 1;
        0x55
    };
    let seg = segment(pcm, &SEG_AEND);
    if seg >= 8 {
        return 0x7f ^ mask;
    }
    let mut aval = (seg as u8) << SEG_SHIFT;
    aval |= if seg < 2 {
        ((pcm >> 1) as u8) & QUANT_MASK
    } else {
        ((pcm >> seg) as u8) & QUANT_MASK
    };
    aval ^ mask
}

/// Decodes a mu-law byte to a 16 bit sample.
#[must_use]
pub fn ulaw_to_s16(u: u8) -> i16 {
    let u = !u;
    let mut t = (i32::from(u & QUANT_MASK) << 3) + ULAW_BIAS;
    t <<= (u & SEG_MASK) >> SEG_SHIFT;
    (if u & SIGN_BIT != 0 {
        ULAW_BIAS - t
    } else {
        t - ULAW_BIAS
    }) as i16
}

/// Encodes a 16 bit sample as mu-law.
#[must_use]
pub fn s16_to_ulaw(sample: i16) -> u8 {
    let mut pcm = i32::from(sample) >> 2;
    let mask = if pcm < 0 {
        pcm = -pcm;
        0x7f
    } else {
        0xff
    };
    pcm = pcm.min(ULAW_CLIP) + (ULAW_BIAS >> 2);
    let seg = segment(pcm, &SEG_UEND);
    if seg >= 8 {
        return 0x7f ^ mask;
    }
    let uval = ((seg as u8) << 4) | (((pcm >> (seg + 1)) as u8) & 0x0f);
    uval ^ mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_encodings() {
        assert_eq!(s16_to_alaw(0), 0xd5);
        assert_eq!(s16_to_ulaw(0), 0xff);
        assert_eq!(ulaw_to_s16(0xff), 0);
        assert_eq!(alaw_to_s16(0xd5), 8);
    }

    #[test]
    fn test_sign_is_preserved() {
        for sample in [-30000i16, -1000, -10, 10, 1000, 30000] {
            let a = alaw_to_s16(s16_to_alaw(sample));
            let u = ulaw_to_s16(s16_to_ulaw(sample));
            assert_eq!(a.signum(), sample.signum(), "alaw {sample}");
            assert_eq!(u.signum(), sample.signum(), "ulaw {sample}");
        }
    }

    #[test]
    fn test_companding_error_is_bounded() {
        for sample in (-32000i16..32000).step_by(97) {
            let a = i32::from(alaw_to_s16(s16_to_alaw(sample)));
            let u = i32::from(ulaw_to_s16(s16_to_ulaw(sample)));
            let tolerance = (i32::from(sample).abs() / 16).max(16);
            assert!((a - i32::from(sample)).abs() <= tolerance, "alaw {sample} -> {a}");
            assert!((u - i32::from(sample)).abs() <= tolerance, "ulaw {sample} -> {u}");
        }
    }

    #[test]
    fn test_extremes_saturate() {
        assert_eq!(alaw_to_s16(s16_to_alaw(i16::MAX)), 32256);
        assert_eq!(ulaw_to_s16(s16_to_ulaw(i16::MAX)), 32124);
    }
}
