//! Band-limited backends built on `rubato`.
//!
//! Rubato works on planar `f32` chunks of a fixed input size. Interleaved
//! frames are split into per-channel queues and processed whenever a full
//! chunk is available; the remainder waits for the next call.

use rubato::{
    FastFixedIn, FftFixedIn, PolynomialDegree, Resampler as _, SincFixedIn,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::method::ResampleMethod;
use super::registry::{BackendParams, ResampleBackend};
use crate::error::ConfigurationError;
use crate::sample::SampleFormat;

/// Input frames per rubato chunk.
const CHUNK_FRAMES: usize = 256;

/// Sub-chunks for the FFT engine.
const FFT_SUB_CHUNKS: usize = 2;

/// How far a variable-rate stream may move from its initial ratio before
/// the engine is rebuilt.
const MAX_RATIO_RELATIVE: f64 = 2.0;

enum Engine {
    Sinc(SincFixedIn<f32>),
    Poly(FastFixedIn<f32>),
    Fft(FftFixedIn<f32>),
}

macro_rules! with_engine {
    ($engine:expr, $r:ident => $body:expr) => {
        match $engine {
            Engine::Sinc($r) => $body,
            Engine::Poly($r) => $body,
            Engine::Fft($r) => $body,
        }
    };
}

pub(crate) struct BandlimitedBackend {
    method: ResampleMethod,
    engine: Engine,
    channels: usize,
    in_rate: u32,
    out_rate: u32,
    pending: Vec<Vec<f32>>,
    out_buf: Vec<Vec<f32>>,
}

fn sinc_parameters(method: ResampleMethod) -> SincInterpolationParameters {
    let (sinc_len, f_cutoff, interpolation, window) = match method {
        ResampleMethod::SincBest => (
            256,
            0.95,
            SincInterpolationType::Cubic,
            WindowFunction::BlackmanHarris2,
        ),
        ResampleMethod::SincFastest => (
            64,
            0.90,
            SincInterpolationType::Linear,
            WindowFunction::Hann2,
        ),
        _ => (
            128,
            0.925,
            SincInterpolationType::Linear,
            WindowFunction::Blackman2,
        ),
    };
    SincInterpolationParameters {
        sinc_len,
        f_cutoff,
        interpolation,
        oversampling_factor: sinc_len,
        window,
    }
}

fn build_engine(
    method: ResampleMethod,
    in_rate: u32,
    out_rate: u32,
    channels: usize,
    variable_rate: bool,
) -> Result<Engine, ConfigurationError> {
    let ratio = f64::from(out_rate) / f64::from(in_rate);
    let max_relative = if variable_rate { MAX_RATIO_RELATIVE } else { 1.0 };
    let init_err = |e: rubato::ResamplerConstructionError| ConfigurationError::BackendInit {
        method,
        reason: e.to_string(),
    };

    let engine = match method {
        ResampleMethod::PolyLinear | ResampleMethod::PolyCubic => {
            let degree = if method == ResampleMethod::PolyCubic {
                PolynomialDegree::Cubic
            } else {
                PolynomialDegree::Linear
            };
            Engine::Poly(
                FastFixedIn::new(ratio, max_relative, degree, CHUNK_FRAMES, channels)
                    .map_err(init_err)?,
            )
        }
        ResampleMethod::Fft => Engine::Fft(
            FftFixedIn::new(
                in_rate as usize,
                out_rate as usize,
                CHUNK_FRAMES,
                FFT_SUB_CHUNKS,
                channels,
            )
            .map_err(init_err)?,
        ),
        _ => Engine::Sinc(
            SincFixedIn::new(
                ratio,
                max_relative,
                sinc_parameters(method),
                CHUNK_FRAMES,
                channels,
            )
            .map_err(init_err)?,
        ),
    };
    Ok(engine)
}

pub(crate) fn create(params: &BackendParams) -> Result<Box<dyn ResampleBackend>, ConfigurationError> {
    if params.format != SampleFormat::F32NE {
        return Err(ConfigurationError::UnsupportedWorkFormat {
            format: params.format.name(),
        });
    }
    let engine = build_engine(
        params.method,
        params.in_rate,
        params.out_rate,
        params.channels,
        params.variable_rate,
    )?;
    let out_buf = with_engine!(&engine, r => r.output_buffer_allocate(true));
    tracing::debug!(
        method = %params.method,
        chunk = CHUNK_FRAMES,
        channels = params.channels,
        "Created band-limited resampler"
    );
    Ok(Box::new(BandlimitedBackend {
        method: params.method,
        engine,
        channels: params.channels,
        in_rate: params.in_rate,
        out_rate: params.out_rate,
        pending: vec![Vec::with_capacity(2 * CHUNK_FRAMES); params.channels],
        out_buf,
    }))
}

impl BandlimitedBackend {
    fn deinterleave(&mut self, input: &[u8], in_frames: usize) {
        for frame in input.chunks_exact(4 * self.channels).take(in_frames) {
            for (queue, b) in self.pending.iter_mut().zip(frame.chunks_exact(4)) {
                queue.push(f32::from_ne_bytes([b[0], b[1], b[2], b[3]]));
            }
        }
    }

    fn pending_frames(&self) -> usize {
        self.pending.first().map_or(0, Vec::len)
    }
}

impl ResampleBackend for BandlimitedBackend {
    fn resample(&mut self, input: &[u8], in_frames: usize, output: &mut [u8]) -> usize {
        self.deinterleave(input, in_frames);

        let fz = 4 * self.channels;
        let capacity = output.len() / fz;
        let mut written = 0;

        loop {
            let needed = with_engine!(&self.engine, r => r.input_frames_next());
            if self.pending_frames() < needed {
                break;
            }
            let result = with_engine!(&mut self.engine, r => {
                r.process_into_buffer(&self.pending, &mut self.out_buf, None)
            });
            let (n_in, n_out) = match result {
                Ok(counts) => counts,
                Err(e) => {
                    tracing::warn!(method = %self.method, error = %e, "Resampler failed, dropping input");
                    self.pending.iter_mut().for_each(Vec::clear);
                    break;
                }
            };
            for queue in &mut self.pending {
                queue.drain(..n_in);
            }

            let n_out = n_out.min(capacity - written);
            for (f, frame) in output[written * fz..(written + n_out) * fz]
                .chunks_exact_mut(fz)
                .enumerate()
            {
                for (c, d) in frame.chunks_exact_mut(4).enumerate() {
                    d.copy_from_slice(&self.out_buf[c][f].to_ne_bytes());
                }
            }
            written += n_out;
        }

        written
    }

    fn update_rates(&mut self, in_rate: u32, out_rate: u32) -> bool {
        let ratio = f64::from(out_rate) / f64::from(in_rate);
        let updated = with_engine!(&mut self.engine, r => r.set_resample_ratio(ratio, false));
        if updated.is_ok() {
            self.in_rate = in_rate;
            self.out_rate = out_rate;
        }
        updated.is_ok()
    }

    fn reset(&mut self) {
        with_engine!(&mut self.engine, r => r.reset());
        self.pending.iter_mut().for_each(Vec::clear);
    }

    fn max_output_frames(&self, in_frames: usize) -> usize {
        let (chunk, out_max) = with_engine!(&self.engine, r => {
            (r.input_frames_next(), r.output_frames_max())
        });
        let chunks = (self.pending_frames() + in_frames) / chunk.max(1);
        chunks * out_max
    }

    fn leftover_frames(&self) -> usize {
        self.pending_frames()
    }

    fn delay_frames(&self) -> f64 {
        let output_delay = with_engine!(&self.engine, r => r.output_delay());
        self.pending_frames() as f64
            + output_delay as f64 * f64::from(self.in_rate) / f64::from(self.out_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(method: ResampleMethod, in_rate: u32, out_rate: u32) -> BackendParams {
        BackendParams {
            method,
            in_rate,
            out_rate,
            channels: 2,
            format: SampleFormat::F32NE,
            variable_rate: true,
        }
    }

    fn sine(frames: usize, channels: usize) -> Vec<u8> {
        (0..frames)
            .flat_map(|i| {
                let v = (i as f32 * 0.05).sin() * 0.5;
                std::iter::repeat(v).take(channels)
            })
            .flat_map(f32::to_ne_bytes)
            .collect()
    }

    #[test]
    fn test_rejects_integer_work_format() {
        let mut p = params(ResampleMethod::SincMedium, 44100, 48000);
        p.format = SampleFormat::S16NE;
        assert!(create(&p).is_err());
    }

    #[test]
    fn test_holds_back_partial_chunk() {
        let mut backend = create(&params(ResampleMethod::SincFastest, 44100, 48000)).unwrap();
        let mut out = vec![0u8; 4096 * 8];
        assert_eq!(backend.resample(&sine(100, 2), 100, &mut out), 0);
        assert_eq!(backend.leftover_frames(), 100);
        backend.reset();
        assert_eq!(backend.leftover_frames(), 0);
    }

    #[test]
    fn test_output_length_tracks_ratio() {
        for method in [
            ResampleMethod::SincMedium,
            ResampleMethod::PolyCubic,
            ResampleMethod::Fft,
        ] {
            let mut p = params(method, 8000, 48000);
            p.variable_rate = method != ResampleMethod::Fft;
            let mut backend = create(&p).unwrap();
            let mut total = 0;
            for _ in 0..10 {
                let mut out = vec![0u8; backend.max_output_frames(CHUNK_FRAMES) * 8];
                total += backend.resample(&sine(CHUNK_FRAMES, 2), CHUNK_FRAMES, &mut out);
            }
            let expected = 10 * CHUNK_FRAMES * 6;
            assert!(total.abs_diff(expected) <= CHUNK_FRAMES * 6, "{method}: {total}");
        }
    }

    #[test]
    fn test_channels_stay_identical() {
        let mut backend = create(&params(ResampleMethod::SincMedium, 8000, 48000)).unwrap();
        let mut out = vec![0u8; backend.max_output_frames(512) * 8];
        let n = backend.resample(&sine(512, 2), 512, &mut out);
        assert!(n > 0);
        for frame in out[..n * 8].chunks_exact(8) {
            assert_eq!(frame[..4], frame[4..]);
        }
    }

    #[test]
    fn test_fixed_ratio_engine_needs_rebuild() {
        let mut p = params(ResampleMethod::Fft, 44100, 48000);
        p.variable_rate = false;
        let mut backend = create(&p).unwrap();
        assert!(!backend.update_rates(44100, 44000));
    }

    #[test]
    fn test_variable_ratio_updates_in_place() {
        let mut backend = create(&params(ResampleMethod::SincMedium, 44100, 48000)).unwrap();
        assert!(backend.update_rates(44000, 48000));
    }
}
