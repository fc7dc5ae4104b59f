//! Peak-hold downsampling for level meters.
//!
//! Each output frame carries the largest absolute sample per channel over
//! the input frames it covers. Partial maxima carry over between calls.

use super::registry::{frames_for_rates, BackendParams, ResampleBackend};
use crate::error::ConfigurationError;
use crate::sample::SampleFormat;
use crate::CHANNELS_MAX;

pub(crate) struct PeaksBackend {
    channels: usize,
    float: bool,
    in_rate: u32,
    out_rate: u32,
    i_counter: u32,
    o_counter: u32,
    max_i: [i16; CHANNELS_MAX],
    max_f: [f32; CHANNELS_MAX],
}

pub(crate) fn create(params: &BackendParams) -> Result<Box<dyn ResampleBackend>, ConfigurationError> {
    let float = match params.format {
        f if f == SampleFormat::S16NE => false,
        f if f == SampleFormat::F32NE => true,
        other => {
            return Err(ConfigurationError::UnsupportedWorkFormat {
                format: other.name(),
            })
        }
    };
    if params.in_rate < params.out_rate {
        return Err(ConfigurationError::BackendInit {
            method: params.method,
            reason: "peaks only supports downsampling".to_string(),
        });
    }
    Ok(Box::new(PeaksBackend {
        channels: params.channels,
        float,
        in_rate: params.in_rate,
        out_rate: params.out_rate,
        i_counter: 0,
        o_counter: 0,
        max_i: [0; CHANNELS_MAX],
        max_f: [0.0; CHANNELS_MAX],
    }))
}

impl PeaksBackend {
    /// Input index of output position `o`, relative to this call.
    fn input_index(&self, o: u32) -> usize {
        let pos = u64::from(o) * u64::from(self.in_rate) / u64::from(self.out_rate);
        pos.saturating_sub(u64::from(self.i_counter)) as usize
    }

    fn accumulate(&mut self, frame: &[u8]) {
        if self.float {
            for (max, b) in self.max_f.iter_mut().zip(frame.chunks_exact(4)) {
                let n = f32::from_ne_bytes([b[0], b[1], b[2], b[3]]).abs();
                if n > *max {
                    *max = n;
                }
            }
        } else {
            for (max, b) in self.max_i.iter_mut().zip(frame.chunks_exact(2)) {
                let n = i16::from_ne_bytes([b[0], b[1]]).saturating_abs();
                if n > *max {
                    *max = n;
                }
            }
        }
    }

    fn emit(&mut self, out: &mut [u8]) {
        let channels = self.channels;
        if self.float {
            for (max, d) in self.max_f[..channels].iter_mut().zip(out.chunks_exact_mut(4)) {
                d.copy_from_slice(&max.to_ne_bytes());
                *max = 0.0;
            }
        } else {
            for (max, d) in self.max_i[..channels].iter_mut().zip(out.chunks_exact_mut(2)) {
                d.copy_from_slice(&max.to_ne_bytes());
                *max = 0;
            }
        }
    }
}

impl ResampleBackend for PeaksBackend {
    fn resample(&mut self, input: &[u8], in_frames: usize, output: &mut [u8]) -> usize {
        let fz = self.channels * if self.float { 4 } else { 2 };
        let capacity = output.len() / fz;
        let mut o_index = 0;
        let mut i = self.input_index(self.o_counter);
        let mut i_end = 0;

        while i_end < in_frames && o_index < capacity {
            i_end = self.input_index(self.o_counter + 1);
            while i < i_end && i < in_frames {
                self.accumulate(&input[i * fz..(i + 1) * fz]);
                i += 1;
            }
            if i == i_end {
                self.emit(&mut output[o_index * fz..(o_index + 1) * fz]);
                o_index += 1;
                self.o_counter += 1;
            }
        }

        self.i_counter += in_frames as u32;
        while self.i_counter >= self.in_rate {
            self.i_counter -= self.in_rate;
            self.o_counter -= self.out_rate;
        }

        o_index
    }

    fn update_rates(&mut self, in_rate: u32, out_rate: u32) -> bool {
        if in_rate < out_rate {
            return false;
        }
        self.in_rate = in_rate;
        self.out_rate = out_rate;
        self.reset();
        true
    }

    fn reset(&mut self) {
        self.i_counter = 0;
        self.o_counter = 0;
        self.max_i = [0; CHANNELS_MAX];
        self.max_f = [0.0; CHANNELS_MAX];
    }

    fn max_output_frames(&self, in_frames: usize) -> usize {
        frames_for_rates(in_frames, self.in_rate, self.out_rate)
    }
}
