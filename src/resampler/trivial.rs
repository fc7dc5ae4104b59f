//! Nearest-earlier-frame resampling.
//!
//! Output frame `o` takes input frame `floor(o * in_rate / out_rate)`. The
//! counters survive across calls and are normalized once a full second of
//! input has passed, so the output is exact over any whole number of
//! seconds.

use super::registry::{frames_for_rates, BackendParams, ResampleBackend};
use crate::error::ConfigurationError;

pub(crate) struct TrivialBackend {
    frame_size: usize,
    in_rate: u32,
    out_rate: u32,
    i_counter: u32,
    o_counter: u32,
}

pub(crate) fn create(params: &BackendParams) -> Result<Box<dyn ResampleBackend>, ConfigurationError> {
    Ok(Box::new(TrivialBackend::new(
        params.frame_size(),
        params.in_rate,
        params.out_rate,
    )))
}

impl TrivialBackend {
    fn new(frame_size: usize, in_rate: u32, out_rate: u32) -> Self {
        Self {
            frame_size,
            in_rate,
            out_rate,
            i_counter: 0,
            o_counter: 0,
        }
    }

    #[cfg(test)]
    fn counters(&self) -> (u32, u32) {
        (self.i_counter, self.o_counter)
    }
}

impl ResampleBackend for TrivialBackend {
    fn resample(&mut self, input: &[u8], in_frames: usize, output: &mut [u8]) -> usize {
        let fz = self.frame_size;
        let capacity = output.len() / fz;
        let mut o_index = 0;

        loop {
            let pos = u64::from(self.o_counter) * u64::from(self.in_rate) / u64::from(self.out_rate);
            let i_index = pos.saturating_sub(u64::from(self.i_counter)) as usize;
            if i_index >= in_frames || o_index >= capacity {
                break;
            }
            output[o_index * fz..(o_index + 1) * fz]
                .copy_from_slice(&input[i_index * fz..(i_index + 1) * fz]);
            o_index += 1;
            self.o_counter += 1;
        }

        self.i_counter += in_frames as u32;
        while self.i_counter >= self.in_rate {
            debug_assert!(self.o_counter >= self.out_rate);
            self.i_counter -= self.in_rate;
            self.o_counter -= self.out_rate;
        }

        o_index
    }

    fn update_rates(&mut self, in_rate: u32, out_rate: u32) -> bool {
        self.in_rate = in_rate;
        self.out_rate = out_rate;
        self.reset();
        true
    }

    fn reset(&mut self) {
        self.i_counter = 0;
        self.o_counter = 0;
    }

    fn max_output_frames(&self, in_frames: usize) -> usize {
        frames_for_rates(in_frames, self.in_rate, self.out_rate)
    }
}
