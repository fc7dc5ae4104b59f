//! Channel remapping.
//!
//! A [`RemapMatrix`] is computed once per stream from its channel map and
//! the device's channel map. A [`Remapper`] applies it to interleaved
//! blocks in one of the two working formats:
//! - S16 in host order, using the 16.16 [`Fixed16`] mirror of the weights
//! - F32 in host order, using the float weights
//!
//! Mono to stereo duplication is recognized and takes a dedicated path.

mod matrix;

pub use matrix::{Fixed16, RemapFlags, RemapMatrix};

use crate::error::ConfigurationError;
use crate::sample::SampleFormat;

/// Code path selected for a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapKind {
    /// Copies the single input channel to both outputs.
    MonoToStereo,
    /// Dense multiply-accumulate over the full matrix.
    Matrix,
}

/// Applies a [`RemapMatrix`] to interleaved sample blocks.
#[derive(Debug, Clone)]
pub struct Remapper {
    matrix: RemapMatrix,
    format: SampleFormat,
    kind: RemapKind,
}

impl Remapper {
    /// Creates a remapper working on `format`, which must be S16 or F32 in
    /// host byte order.
    pub fn new(matrix: RemapMatrix, format: SampleFormat) -> Result<Self, ConfigurationError> {
        if format != SampleFormat::S16NE && format != SampleFormat::F32NE {
            return Err(ConfigurationError::UnsupportedWorkFormat {
                format: format.name(),
            });
        }

        let kind = if matrix.is_mono_to_stereo() {
            tracing::info!("Using mono to stereo remapping");
            RemapKind::MonoToStereo
        } else {
            tracing::debug!(
                inputs = matrix.inputs(),
                outputs = matrix.outputs(),
                "Using generic matrix remapping"
            );
            RemapKind::Matrix
        };

        Ok(Self {
            matrix,
            format,
            kind,
        })
    }

    /// The gain matrix.
    #[must_use]
    pub fn matrix(&self) -> &RemapMatrix {
        &self.matrix
    }

    /// Selected code path.
    #[must_use]
    pub fn kind(&self) -> RemapKind {
        self.kind
    }

    /// Working format the remapper operates on.
    #[must_use]
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Remaps `frames` frames from `src` into `dst`.
    ///
    /// `src` holds `frames * inputs` samples, `dst` holds
    /// `frames * outputs` samples; `dst` is fully overwritten.
    pub fn remap(&self, src: &[u8], dst: &mut [u8], frames: usize) {
        let size = self.format.sample_size();
        let (n_in, n_out) = (self.matrix.inputs(), self.matrix.outputs());
        debug_assert!(src.len() >= frames * n_in * size);
        debug_assert!(dst.len() >= frames * n_out * size);

        match (self.kind, self.format == SampleFormat::S16NE) {
            (RemapKind::MonoToStereo, _) => {
                for (s, d) in src
                    .chunks_exact(size)
                    .zip(dst.chunks_exact_mut(2 * size))
                    .take(frames)
                {
                    d[..size].copy_from_slice(s);
                    d[size..].copy_from_slice(s);
                }
            }
            (RemapKind::Matrix, true) => {
                let mut input = [0i16; crate::CHANNELS_MAX];
                for (s, d) in src
                    .chunks_exact(n_in * 2)
                    .zip(dst.chunks_exact_mut(n_out * 2))
                    .take(frames)
                {
                    for (v, b) in input.iter_mut().zip(s.chunks_exact(2)) {
                        *v = i16::from_ne_bytes([b[0], b[1]]);
                    }
                    for (oc, out) in d.chunks_exact_mut(2).enumerate() {
                        let mut acc: i32 = 0;
                        for (w, x) in self.matrix.fixed_row(oc).iter().zip(&input[..n_in]) {
                            if *w <= Fixed16::ZERO {
                                continue;
                            }
                            acc += if *w >= Fixed16::ONE {
                                i32::from(*x)
                            } else {
                                w.mul_s16(*x)
                            };
                        }
                        let v = acc.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
                        out.copy_from_slice(&v.to_ne_bytes());
                    }
                }
            }
            (RemapKind::Matrix, false) => {
                let mut input = [0f32; crate::CHANNELS_MAX];
                for (s, d) in src
                    .chunks_exact(n_in * 4)
                    .zip(dst.chunks_exact_mut(n_out * 4))
                    .take(frames)
                {
                    for (v, b) in input.iter_mut().zip(s.chunks_exact(4)) {
                        *v = f32::from_ne_bytes([b[0], b[1], b[2], b[3]]);
                    }
                    for (oc, out) in d.chunks_exact_mut(4).enumerate() {
                        let mut acc = 0f32;
                        for (w, x) in self.matrix.row(oc).iter().zip(&input[..n_in]) {
                            if *w <= 0.0 {
                                continue;
                            }
                            acc += if *w >= 1.0 { *x } else { *w * *x };
                        }
                        out.copy_from_slice(&acc.to_ne_bytes());
                    }
                }
            }
        }
    }
}
