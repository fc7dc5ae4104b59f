//! Pass-through backend for identical rates.

use super::registry::{BackendParams, ResampleBackend};
use crate::error::ConfigurationError;

pub(crate) struct CopyBackend {
    frame_size: usize,
}

pub(crate) fn create(params: &BackendParams) -> Result<Box<dyn ResampleBackend>, ConfigurationError> {
    if params.in_rate != params.out_rate {
        return Err(ConfigurationError::BackendInit {
            method: params.method,
            reason: format!("cannot convert {} Hz to {} Hz", params.in_rate, params.out_rate),
        });
    }
    Ok(Box::new(CopyBackend {
        frame_size: params.frame_size(),
    }))
}

impl ResampleBackend for CopyBackend {
    fn passthrough(&self) -> bool {
        true
    }

    fn resample(&mut self, input: &[u8], in_frames: usize, output: &mut [u8]) -> usize {
        let frames = in_frames.min(output.len() / self.frame_size);
        let n = frames * self.frame_size;
        output[..n].copy_from_slice(&input[..n]);
        frames
    }

    fn update_rates(&mut self, in_rate: u32, out_rate: u32) -> bool {
        in_rate == out_rate
    }

    fn reset(&mut self) {}

    fn max_output_frames(&self, in_frames: usize) -> usize {
        in_frames
    }
}
