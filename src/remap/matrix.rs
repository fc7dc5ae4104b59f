//! Gain matrix construction.

use std::fmt;

use crate::error::ConfigurationError;
use crate::sample::{ChannelMap, ChannelPosition, CHANNELS_MAX};

/// Weight given to unconnected same-side inputs in the back-fill pass.
const BACKFILL_SIDE: f32 = 0.1;
/// Scale applied to already connected inputs when side inputs are mixed in.
const BACKFILL_SIDE_KEEP: f32 = 0.9;
/// Weight given to unconnected center and LFE inputs mixed into other outputs.
const BACKFILL_CENTER: f32 = 0.375;
/// Scale applied to already connected inputs when a center is folded into
/// left and right.
const BACKFILL_CENTER_KEEP: f32 = 0.75;
/// Row sums above this are scaled back to unity.
const ROW_SUM_LIMIT: f32 = 1.0 + 1e-5;

/// Rules limiting how channels may be connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemapFlags {
    /// Map channels by index only, ignoring positions.
    pub no_remap: bool,
    /// Connect only channels with the same position (mono matches all).
    pub no_remix: bool,
    /// Never route anything into or out of LFE channels by averaging.
    pub no_lfe: bool,
}

/// 16.16 fixed-point gain used by the S16 working format.
///
/// `Fixed16::ONE` (0x10000) is unity. Weights produced by
/// [`RemapMatrix`] are within 0..=1, so the product with any 16 bit sample
/// fits in 32 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed16(i32);

impl Fixed16 {
    /// Zero gain.
    pub const ZERO: Self = Self(0);
    /// Unity gain.
    pub const ONE: Self = Self(0x10000);

    /// Converts a float weight, truncating toward zero.
    #[must_use]
    pub fn from_f32(weight: f32) -> Self {
        Self((weight * 65536.0) as i32)
    }

    /// Raw 16.16 value.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Weight as float.
    #[must_use]
    pub fn to_f32(self) -> f32 {
        self.0 as f32 / 65536.0
    }

    /// `sample * self`, shifted back to sample scale.
    #[inline]
    #[must_use]
    pub fn mul_s16(self, sample: i16) -> i32 {
        (i32::from(sample) * self.0) >> 16
    }
}

/// Dense output-by-input gain matrix between two channel maps.
#[derive(Clone, PartialEq)]
pub struct RemapMatrix {
    n_in: usize,
    n_out: usize,
    f: Vec<f32>,
    i: Vec<Fixed16>,
}

impl RemapMatrix {
    /// Computes the matrix routing `input` channels to `output` channels.
    ///
    /// # Example
    ///
    /// ```
    /// use stream_mixer::remap::{RemapFlags, RemapMatrix};
    /// use stream_mixer::ChannelMap;
    ///
    /// let m = RemapMatrix::build(&ChannelMap::stereo(), &ChannelMap::mono(), RemapFlags::default())?;
    /// assert_eq!(m.weight(0, 0), 0.5);
    /// assert_eq!(m.weight(0, 1), 0.5);
    /// # Ok::<(), stream_mixer::ConfigurationError>(())
    /// ```
    pub fn build(
        input: &ChannelMap,
        output: &ChannelMap,
        flags: RemapFlags,
    ) -> Result<Self, ConfigurationError> {
        let (n_in, n_out) = (input.channels(), output.channels());
        for n in [n_in, n_out] {
            if n == 0 || n > CHANNELS_MAX {
                return Err(ConfigurationError::TooManyChannels {
                    channels: n,
                    max: CHANNELS_MAX,
                });
            }
        }

        let mut m = Self {
            n_in,
            n_out,
            f: vec![0.0; n_in * n_out],
            i: Vec::new(),
        };

        if flags.no_remap {
            for c in 0..n_in.min(n_out) {
                m.set(c, c, 1.0);
            }
        } else if flags.no_remix {
            for (oc, b) in output.positions().iter().enumerate() {
                for (ic, a) in input.positions().iter().enumerate() {
                    if a == b || *a == ChannelPosition::Mono || *b == ChannelPosition::Mono {
                        m.set(oc, ic, 1.0);
                    }
                }
            }
        } else {
            m.remix(input.positions(), output.positions(), flags.no_lfe);
        }

        m.limit_rows();
        m.i = m.f.iter().map(|w| Fixed16::from_f32(*w)).collect();
        Ok(m)
    }

    fn set(&mut self, oc: usize, ic: usize, w: f32) {
        self.f[oc * self.n_in + ic] = w;
    }

    fn scale(&mut self, oc: usize, ic: usize, factor: f32) {
        self.f[oc * self.n_in + ic] *= factor;
    }

    fn remix(&mut self, ins: &[ChannelPosition], outs: &[ChannelPosition], no_lfe: bool) {
        let n_in = ins.len();
        let mut connected = [false; CHANNELS_MAX];

        let ic_left = ins.iter().filter(|p| p.on_left()).count();
        let ic_right = ins.iter().filter(|p| p.on_right()).count();
        let ic_center = ins.iter().filter(|p| p.on_center()).count();

        for (oc, b) in outs.iter().enumerate() {
            let mut oc_connected = false;

            for (ic, a) in ins.iter().enumerate() {
                if a == b || *a == ChannelPosition::Mono {
                    self.set(oc, ic, 1.0);
                } else if *b == ChannelPosition::Mono {
                    self.set(oc, ic, 1.0 / n_in as f32);
                } else {
                    continue;
                }
                oc_connected = true;
                connected[ic] = true;
            }

            if oc_connected {
                continue;
            }

            if b.on_left() {
                for (ic, a) in ins.iter().enumerate() {
                    if a.on_left() {
                        self.set(oc, ic, 1.0 / ic_left as f32);
                        connected[ic] = true;
                    }
                }
            } else if b.on_right() {
                for (ic, a) in ins.iter().enumerate() {
                    if a.on_right() {
                        self.set(oc, ic, 1.0 / ic_right as f32);
                        connected[ic] = true;
                    }
                }
            } else if b.on_center() {
                if ic_center > 0 {
                    for (ic, a) in ins.iter().enumerate() {
                        if a.on_center() {
                            self.set(oc, ic, 1.0 / ic_center as f32);
                            connected[ic] = true;
                        }
                    }
                } else if ic_left + ic_right > 0 {
                    for (ic, a) in ins.iter().enumerate() {
                        if a.on_left() || a.on_right() {
                            self.set(oc, ic, 1.0 / (ic_left + ic_right) as f32);
                            connected[ic] = true;
                        }
                    }
                }
            } else if b.on_lfe() && !no_lfe {
                // Feeding the LFE does not count as connecting an input.
                for ic in 0..n_in {
                    self.set(oc, ic, 1.0 / n_in as f32);
                }
            }
        }

        self.backfill(ins, outs, &connected, no_lfe);
    }

    fn backfill(
        &mut self,
        ins: &[ChannelPosition],
        outs: &[ChannelPosition],
        connected: &[bool; CHANNELS_MAX],
        no_lfe: bool,
    ) {
        let unconnected = |pred: fn(&ChannelPosition) -> bool| {
            ins.iter()
                .enumerate()
                .filter(|(ic, a)| !connected[*ic] && pred(a))
                .count()
        };
        let un_left = unconnected(|p| p.on_left());
        let un_right = unconnected(|p| p.on_right());
        let un_center = unconnected(|p| p.on_center());
        let un_lfe = unconnected(|p| p.on_lfe());

        for (side, count) in [
            (ChannelPosition::on_left as fn(ChannelPosition) -> bool, un_left),
            (ChannelPosition::on_right, un_right),
        ] {
            if count == 0 {
                continue;
            }
            for (oc, b) in outs.iter().enumerate() {
                if !side(*b) {
                    continue;
                }
                for (ic, a) in ins.iter().enumerate() {
                    if connected[ic] {
                        self.scale(oc, ic, BACKFILL_SIDE_KEEP);
                    } else if side(*a) {
                        self.set(oc, ic, BACKFILL_SIDE / count as f32);
                    }
                }
            }
        }

        if un_center > 0 {
            let mut mixed_in = false;
            for (oc, b) in outs.iter().enumerate() {
                if !b.on_center() {
                    continue;
                }
                for (ic, a) in ins.iter().enumerate() {
                    if connected[ic] {
                        self.scale(oc, ic, BACKFILL_SIDE_KEEP);
                    } else if a.on_center() {
                        self.set(oc, ic, BACKFILL_SIDE / un_center as f32);
                        mixed_in = true;
                    }
                }
            }
            if !mixed_in {
                self.fold_center(ins, outs, connected);
            }
        }

        if un_lfe > 0 && !no_lfe {
            for (ic, a) in ins.iter().enumerate() {
                if !a.on_lfe() {
                    continue;
                }
                for oc in 0..outs.len() {
                    self.set(oc, ic, BACKFILL_CENTER / un_lfe as f32);
                }
            }
        }
    }

    /// Mixes unconnected center inputs into the left and right outputs,
    /// preferring outputs on the same front/rear/side layer.
    fn fold_center(
        &mut self,
        ins: &[ChannelPosition],
        outs: &[ChannelPosition],
        connected: &[bool; CHANNELS_MAX],
    ) {
        let is_lr = |p: &ChannelPosition| p.on_left() || p.on_right();
        let mut found_layer = [false; CHANNELS_MAX];
        let mut n_center = [0usize; CHANNELS_MAX];

        for (ic, a) in ins.iter().enumerate() {
            if connected[ic] || !a.on_center() {
                continue;
            }
            found_layer[ic] = outs.iter().any(|b| is_lr(b) && b.layer() == a.layer());
            for (oc, b) in outs.iter().enumerate() {
                if is_lr(b) && (!found_layer[ic] || b.layer() == a.layer()) {
                    n_center[oc] += 1;
                }
            }
        }

        for (oc, b) in outs.iter().enumerate() {
            if !is_lr(b) || n_center[oc] == 0 {
                continue;
            }
            for (ic, a) in ins.iter().enumerate() {
                if connected[ic] {
                    self.scale(oc, ic, BACKFILL_CENTER_KEEP);
                } else if a.on_center() && (!found_layer[ic] || b.layer() == a.layer()) {
                    self.set(oc, ic, BACKFILL_CENTER / n_center[oc] as f32);
                }
            }
        }
    }

    /// Scales down any row whose weights sum past unity so a full-scale
    /// signal on every input cannot clip the output.
    fn limit_rows(&mut self) {
        for row in self.f.chunks_exact_mut(self.n_in) {
            let sum: f32 = row.iter().sum();
            if sum > ROW_SUM_LIMIT {
                for w in row.iter_mut() {
                    *w /= sum;
                }
            }
        }
    }

    /// Input channel count.
    #[must_use]
    pub fn inputs(&self) -> usize {
        self.n_in
    }

    /// Output channel count.
    #[must_use]
    pub fn outputs(&self) -> usize {
        self.n_out
    }

    /// Float weight of input `ic` in output `oc`.
    #[must_use]
    pub fn weight(&self, oc: usize, ic: usize) -> f32 {
        self.f[oc * self.n_in + ic]
    }

    /// Fixed-point weight of input `ic` in output `oc`.
    #[must_use]
    pub fn fixed_weight(&self, oc: usize, ic: usize) -> Fixed16 {
        self.i[oc * self.n_in + ic]
    }

    /// Float weights of one output channel.
    #[must_use]
    pub fn row(&self, oc: usize) -> &[f32] {
        &self.f[oc * self.n_in..(oc + 1) * self.n_in]
    }

    /// Fixed-point weights of one output channel.
    #[must_use]
    pub fn fixed_row(&self, oc: usize) -> &[Fixed16] {
        &self.i[oc * self.n_in..(oc + 1) * self.n_in]
    }

    /// Sum of the float weights of one output channel.
    #[must_use]
    pub fn row_sum(&self, oc: usize) -> f32 {
        self.row(oc).iter().sum()
    }

    /// Returns true if the matrix duplicates one mono input into two
    /// outputs at unity gain.
    #[must_use]
    pub fn is_mono_to_stereo(&self) -> bool {
        self.n_in == 1
            && self.n_out == 2
            && self.i[0] == Fixed16::ONE
            && self.i[1] == Fixed16::ONE
    }
}

impl fmt::Debug for RemapMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RemapMatrix {}x{}", self.n_out, self.n_in)?;
        for oc in 0..self.n_out {
            write!(f, "  O{oc:02}:")?;
            for w in self.row(oc) {
                write!(f, " {w:.3}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn build(input: &ChannelMap, output: &ChannelMap) -> RemapMatrix {
        RemapMatrix::build(input, output, RemapFlags::default()).unwrap()
    }

    fn assert_rows_bounded(m: &RemapMatrix) {
        for oc in 0..m.outputs() {
            assert!(m.row_sum(oc) <= 1.0 + EPS, "row {oc} sums to {}", m.row_sum(oc));
            assert!(m.row_sum(oc) > 0.0, "row {oc} is empty");
        }
    }

    #[test]
    fn test_mono_to_stereo() {
        let m = build(&ChannelMap::mono(), &ChannelMap::stereo());
        assert_eq!(m.weight(0, 0), 1.0);
        assert_eq!(m.weight(1, 0), 1.0);
        assert!(m.is_mono_to_stereo());
        assert_rows_bounded(&m);
    }

    #[test]
    fn test_stereo_to_mono() {
        let m = build(&ChannelMap::stereo(), &ChannelMap::mono());
        assert!((m.weight(0, 0) - 0.5).abs() < EPS);
        assert!((m.weight(0, 1) - 0.5).abs() < EPS);
        assert_eq!(m.fixed_weight(0, 0), Fixed16(0x8000));
        assert_rows_bounded(&m);
    }

    #[test]
    fn test_stereo_to_51() {
        let m = build(&ChannelMap::stereo(), &ChannelMap::surround_51());
        // FL FR RL RR FC LFE
        assert_eq!(m.row(0), &[1.0, 0.0]);
        assert_eq!(m.row(1), &[0.0, 1.0]);
        assert_eq!(m.row(2), &[1.0, 0.0]);
        assert_eq!(m.row(3), &[0.0, 1.0]);
        assert_eq!(m.row(4), &[0.5, 0.5]);
        assert_eq!(m.row(5), &[0.5, 0.5]);
        assert_rows_bounded(&m);
    }

    #[test]
    fn test_stereo_to_51_without_lfe() {
        let flags = RemapFlags {
            no_lfe: true,
            ..RemapFlags::default()
        };
        let m = RemapMatrix::build(&ChannelMap::stereo(), &ChannelMap::surround_51(), flags).unwrap();
        assert_eq!(m.row(5), &[0.0, 0.0]);
    }

    #[test]
    fn test_51_to_stereo() {
        let m = build(&ChannelMap::surround_51(), &ChannelMap::stereo());
        // Inputs FL FR RL RR FC LFE. Front left keeps 0.9 * 0.75 of its
        // direct input, rear left comes in at 0.1, center and LFE at 0.375.
        let raw = 0.675 + 0.1 + 0.375 + 0.375;
        let left = m.row(0);
        assert!((left[0] - 0.675 / raw).abs() < EPS);
        assert_eq!(left[1], 0.0);
        assert!((left[2] - 0.1 / raw).abs() < EPS);
        assert_eq!(left[3], 0.0);
        assert!((left[4] - 0.375 / raw).abs() < EPS);
        assert!((left[5] - 0.375 / raw).abs() < EPS);

        let right = m.row(1);
        assert!((right[1] - left[0]).abs() < EPS);
        assert!((right[3] - left[2]).abs() < EPS);
        assert_rows_bounded(&m);
    }

    #[test]
    fn test_rear_center_prefers_rear_outputs() {
        let input: ChannelMap = "front-left,front-right,rear-center".parse().unwrap();
        let output: ChannelMap = "front-left,front-right,rear-left,rear-right".parse().unwrap();
        let m = build(&input, &output);
        assert_eq!(m.weight(0, 2), 0.0);
        assert_eq!(m.weight(1, 2), 0.0);
        assert!(m.weight(2, 2) > 0.0);
        assert!(m.weight(3, 2) > 0.0);
        assert_rows_bounded(&m);
    }

    #[test]
    fn test_no_remap_is_identity_by_index() {
        let flags = RemapFlags {
            no_remap: true,
            ..RemapFlags::default()
        };
        let input: ChannelMap = "rear-left,rear-right".parse().unwrap();
        let m = RemapMatrix::build(&input, &ChannelMap::surround_51(), flags).unwrap();
        assert_eq!(m.weight(0, 0), 1.0);
        assert_eq!(m.weight(1, 1), 1.0);
        assert_eq!(m.row_sum(2), 0.0);
    }

    #[test]
    fn test_no_remix_matches_names_only() {
        let flags = RemapFlags {
            no_remix: true,
            ..RemapFlags::default()
        };
        let m = RemapMatrix::build(&ChannelMap::stereo(), &ChannelMap::surround_51(), flags).unwrap();
        assert_eq!(m.row(0), &[1.0, 0.0]);
        assert_eq!(m.row(1), &[0.0, 1.0]);
        assert_eq!(m.row_sum(4), 0.0);
        assert_eq!(m.row_sum(5), 0.0);
    }

    #[test]
    fn test_no_remix_mono_wildcard() {
        let flags = RemapFlags {
            no_remix: true,
            ..RemapFlags::default()
        };
        let m = RemapMatrix::build(&ChannelMap::mono(), &ChannelMap::stereo(), flags).unwrap();
        assert!(m.is_mono_to_stereo());
    }

    #[test]
    fn test_fixed_mirror_truncates() {
        let m = build(&ChannelMap::default_for(3).unwrap(), &ChannelMap::mono());
        let w = m.weight(0, 0);
        assert_eq!(m.fixed_weight(0, 0).raw(), (w * 65536.0) as i32);
        assert_eq!(m.fixed_weight(0, 0).raw(), 21845);
    }

    #[test]
    fn test_fixed16_mul() {
        assert_eq!(Fixed16::ONE.mul_s16(-32768), -32768);
        assert_eq!(Fixed16(0x8000).mul_s16(1000), 500);
        assert_eq!(Fixed16::from_f32(0.25).raw(), 0x4000);
    }
}
