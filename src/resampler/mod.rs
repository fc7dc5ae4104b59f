//! Sample format, channel layout and rate conversion.
//!
//! A [`Resampler`] converts blocks from an input sample spec and channel map
//! to an output spec and map in up to four stages:
//!
//! ```text
//! input → work format → remap → resample → output format
//! ```
//!
//! Stages that would not change the data pass the input block through
//! without copying. The working format is S16 or F32 in host byte order,
//! chosen per method from the input and output formats.

#[cfg(feature = "rubato")]
mod bandlimited;
mod copy;
mod method;
mod peaks;
mod registry;
mod trivial;

pub use method::{available_methods, ResampleMethod, ResamplerFlags};

use registry::{BackendParams, BackendRegistry, ResampleBackend};

use crate::error::{ConfigurationError, MemPoolError};
use crate::format;
use crate::memory::{MemChunk, MemPool};
use crate::remap::{RemapMatrix, Remapper};
use crate::sample::{ChannelMap, SampleFormat, SampleSpec};

/// Frames of headroom kept free in every block for backend overshoot.
const EXTRA_FRAMES: usize = 128;

/// Converts audio between two sample specs and channel maps.
///
/// # Example
///
/// ```
/// use stream_mixer::{MemPool, ResampleMethod, Resampler, ResamplerFlags};
/// use stream_mixer::{SampleFormat, SampleSpec, MemChunk};
///
/// let pool = MemPool::default();
/// let input = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
/// let output = SampleSpec::new(SampleFormat::S16NE, 48000, 2);
/// let mut resampler = Resampler::new(
///     &pool, input, None, output, None, ResampleMethod::Trivial, ResamplerFlags::default(),
/// )?;
///
/// let block = MemChunk::from_vec(vec![0; 320]);
/// let out = resampler.run(&block)?;
/// assert_eq!(out.len(), 960 * 4);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Resampler {
    pool: MemPool,
    method: ResampleMethod,
    flags: ResamplerFlags,
    in_spec: SampleSpec,
    out_spec: SampleSpec,
    in_map: ChannelMap,
    out_map: ChannelMap,
    work_format: SampleFormat,
    remapper: Option<Remapper>,
    backend: Box<dyn ResampleBackend>,
}

impl Resampler {
    /// Creates a resampler.
    ///
    /// Missing channel maps default to the standard layout for the channel
    /// count. The requested method is replaced by a working one when it is
    /// not compiled in or cannot handle the rates and flags; equal fixed
    /// rates always use `copy`.
    pub fn new(
        pool: &MemPool,
        in_spec: SampleSpec,
        in_map: Option<&ChannelMap>,
        out_spec: SampleSpec,
        out_map: Option<&ChannelMap>,
        method: ResampleMethod,
        flags: ResamplerFlags,
    ) -> Result<Self, ConfigurationError> {
        in_spec.validate()?;
        out_spec.validate()?;
        let in_map = resolve_map(in_map, in_spec.channels)?;
        let out_map = resolve_map(out_map, out_spec.channels)?;

        let method = if !flags.variable_rate && in_spec.rate == out_spec.rate {
            if method != ResampleMethod::Copy {
                tracing::info!("Forcing resampler 'copy', because of fixed, identical sample rates");
            }
            ResampleMethod::Copy
        } else {
            method
        };
        let method = fix_method(flags, method, in_spec.rate, out_spec.rate);

        let map_required =
            in_spec.channels != out_spec.channels || (!flags.no_remap && in_map != out_map);
        let work_format = choose_work_format(method, in_spec.format, out_spec.format, map_required);

        tracing::info!(
            method = %method,
            input = %in_spec,
            output = %out_spec,
            work_format = work_format.name(),
            "Creating resampler"
        );

        let remapper = if map_required {
            let matrix = RemapMatrix::build(&in_map, &out_map, flags.remap_flags())?;
            Some(Remapper::new(matrix, work_format)?)
        } else {
            None
        };

        let backend = BackendRegistry::global().create(&BackendParams {
            method,
            in_rate: in_spec.rate,
            out_rate: out_spec.rate,
            channels: usize::from(out_spec.channels),
            format: work_format,
            variable_rate: flags.variable_rate,
        })?;

        Ok(Self {
            pool: pool.clone(),
            method,
            flags,
            in_spec,
            out_spec,
            in_map,
            out_map,
            work_format,
            remapper,
            backend,
        })
    }

    /// Effective method after fallbacks.
    #[must_use]
    pub fn method(&self) -> ResampleMethod {
        self.method
    }

    /// Creation flags.
    #[must_use]
    pub fn flags(&self) -> ResamplerFlags {
        self.flags
    }

    /// Input sample spec.
    #[must_use]
    pub fn input_spec(&self) -> &SampleSpec {
        &self.in_spec
    }

    /// Output sample spec.
    #[must_use]
    pub fn output_spec(&self) -> &SampleSpec {
        &self.out_spec
    }

    /// Input channel map.
    #[must_use]
    pub fn input_map(&self) -> &ChannelMap {
        &self.in_map
    }

    /// Output channel map.
    #[must_use]
    pub fn output_map(&self) -> &ChannelMap {
        &self.out_map
    }

    /// Format the conversion stages run in.
    #[must_use]
    pub fn work_format(&self) -> SampleFormat {
        self.work_format
    }

    /// The remap stage, if channels are remapped.
    #[must_use]
    pub fn remapper(&self) -> Option<&Remapper> {
        self.remapper.as_ref()
    }

    fn work_in_frame_size(&self) -> usize {
        self.work_format.sample_size() * usize::from(self.in_spec.channels)
    }

    fn work_out_frame_size(&self) -> usize {
        self.work_format.sample_size() * usize::from(self.out_spec.channels)
    }

    /// Input bytes needed to produce at least `out_length` output bytes.
    ///
    /// Rounds up and ignores data the backend holds back, so repeated
    /// calls can never stall at zero.
    #[must_use]
    pub fn request(&self, out_length: usize) -> usize {
        let (ifz, ofz) = (self.in_spec.frame_size(), self.out_spec.frame_size());
        let out_frames = out_length.div_ceil(ofz) as u64;
        let in_frames = (out_frames * u64::from(self.in_spec.rate))
            .div_ceil(u64::from(self.out_spec.rate));
        in_frames as usize * ifz
    }

    /// Upper bound of output bytes for `in_length` input bytes, including
    /// data the backend holds back.
    #[must_use]
    pub fn result(&self, in_length: usize) -> usize {
        let (ifz, ofz) = (self.in_spec.frame_size(), self.out_spec.frame_size());
        let frames = (in_length.div_ceil(ifz) + self.backend.leftover_frames()) as u64;
        let out_frames =
            (frames * u64::from(self.out_spec.rate)).div_ceil(u64::from(self.in_spec.rate));
        out_frames as usize * ofz
    }

    /// Largest input block that keeps every stage within one pool block.
    #[must_use]
    pub fn max_block_size(&self) -> usize {
        let channels = self.in_spec.channels.max(self.out_spec.channels);
        let size = self
            .in_spec
            .format
            .sample_size()
            .max(self.out_spec.format.sample_size())
            .max(self.work_format.sample_size());
        let max_rate = self.in_spec.rate.max(self.out_spec.rate);
        let max_fs = size * usize::from(channels);

        let frames = (self.pool.block_size_max() / max_fs)
            .saturating_sub(EXTRA_FRAMES)
            .saturating_sub(self.backend.leftover_frames());
        let bytes = (frames as u64 * u64::from(self.in_spec.rate) / u64::from(max_rate)) as usize
            * self.in_spec.frame_size();
        if bytes > 0 {
            bytes
        } else {
            self.in_spec.frame_size()
        }
    }

    /// Delay of the backend, in input frames.
    #[must_use]
    pub fn delay_frames(&self) -> f64 {
        self.backend.delay_frames()
    }

    /// Drops all history and held-back input.
    pub fn reset(&mut self) {
        self.backend.reset();
    }

    /// Changes the input rate.
    ///
    /// On error the resampler keeps its previous rates.
    pub fn set_input_rate(&mut self, rate: u32) -> Result<(), ConfigurationError> {
        if rate == self.in_spec.rate {
            return Ok(());
        }
        SampleSpec::new(self.in_spec.format, rate, self.in_spec.channels).validate()?;
        self.update_rates(rate, self.out_spec.rate)?;
        self.in_spec.rate = rate;
        Ok(())
    }

    /// Changes the output rate.
    ///
    /// On error the resampler keeps its previous rates.
    pub fn set_output_rate(&mut self, rate: u32) -> Result<(), ConfigurationError> {
        if rate == self.out_spec.rate {
            return Ok(());
        }
        SampleSpec::new(self.out_spec.format, rate, self.out_spec.channels).validate()?;
        self.update_rates(self.in_spec.rate, rate)?;
        self.out_spec.rate = rate;
        Ok(())
    }

    /// Moves the backend to the new rates; the specs are updated by the caller.
    fn update_rates(&mut self, in_rate: u32, out_rate: u32) -> Result<(), ConfigurationError> {
        if self.method == ResampleMethod::Copy {
            return Err(ConfigurationError::NotVariableRate);
        }
        if self.backend.update_rates(in_rate, out_rate) {
            return Ok(());
        }
        tracing::warn!(
            method = %self.method,
            input_rate = in_rate,
            output_rate = out_rate,
            "Resampler cannot change rate in place, rebuilding"
        );
        self.backend = BackendRegistry::global().create(&BackendParams {
            method: self.method,
            in_rate,
            out_rate,
            channels: usize::from(self.out_spec.channels),
            format: self.work_format,
            variable_rate: self.flags.variable_rate,
        })?;
        Ok(())
    }

    /// Converts one block.
    ///
    /// The input must hold whole input frames. The result may be empty
    /// while the backend buffers input. Every allocation happens before
    /// the backend consumes the input, so a pool error leaves the
    /// resampler unchanged.
    pub fn run(&mut self, input: &MemChunk) -> Result<MemChunk, MemPoolError> {
        let ifz = self.in_spec.frame_size();
        assert!(
            input.len() % ifz == 0,
            "input block of {} bytes is not frame aligned",
            input.len()
        );
        let frames = input.len() / ifz;
        if frames == 0 {
            return Ok(MemChunk::empty());
        }

        let work = self.convert_to_work(input)?;
        let remapped = self.remap(work, frames)?;

        if self.backend.passthrough() {
            return self.convert_from_work(remapped, frames);
        }

        let wfz = self.work_out_frame_size();
        let max_frames = self.backend.max_output_frames(frames);
        let mut resampled = self.pool.allocate(max_frames * wfz)?;
        let mut converted = if self.work_format == self.out_spec.format {
            None
        } else {
            Some(self.pool.allocate(max_frames * self.out_spec.frame_size())?)
        };

        let out_frames = {
            let dst = resampled.make_writable(&self.pool)?;
            self.backend.resample(remapped.as_bytes(), frames, dst)
        };
        if out_frames == 0 {
            return Ok(MemChunk::empty());
        }
        resampled.truncate(out_frames * wfz);

        match converted.as_mut() {
            None => Ok(resampled),
            Some(out) => {
                out.truncate(out_frames * self.out_spec.frame_size());
                let dst = out.make_writable(&self.pool)?;
                format::convert(self.work_format, resampled.as_bytes(), self.out_spec.format, dst);
                Ok(out.clone())
            }
        }
    }

    fn convert_to_work(&self, input: &MemChunk) -> Result<MemChunk, MemPoolError> {
        if self.in_spec.format == self.work_format {
            return Ok(input.clone());
        }
        let frames = input.len() / self.in_spec.frame_size();
        let mut out = self.pool.allocate(frames * self.work_in_frame_size())?;
        let dst = out.make_writable(&self.pool)?;
        format::convert(self.in_spec.format, input.as_bytes(), self.work_format, dst);
        Ok(out)
    }

    fn remap(&self, input: MemChunk, frames: usize) -> Result<MemChunk, MemPoolError> {
        let Some(remapper) = &self.remapper else {
            return Ok(input);
        };
        let mut out = self.pool.allocate(frames * self.work_out_frame_size())?;
        let dst = out.make_writable(&self.pool)?;
        remapper.remap(input.as_bytes(), dst, frames);
        Ok(out)
    }

    fn convert_from_work(&self, input: MemChunk, frames: usize) -> Result<MemChunk, MemPoolError> {
        if self.work_format == self.out_spec.format {
            return Ok(input);
        }
        let mut out = self.pool.allocate(frames * self.out_spec.frame_size())?;
        let dst = out.make_writable(&self.pool)?;
        format::convert(self.work_format, input.as_bytes(), self.out_spec.format, dst);
        Ok(out)
    }
}

impl std::fmt::Debug for Resampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resampler")
            .field("method", &self.method)
            .field("input", &self.in_spec)
            .field("output", &self.out_spec)
            .field("work_format", &self.work_format)
            .field("remap", &self.remapper.is_some())
            .finish_non_exhaustive()
    }
}

fn resolve_map(map: Option<&ChannelMap>, channels: u8) -> Result<ChannelMap, ConfigurationError> {
    match map {
        Some(map) => {
            map.check_compatible(channels)?;
            Ok(map.clone())
        }
        None => ChannelMap::default_for(channels),
    }
}

/// Replaces a method that cannot serve the given rates and flags.
fn fix_method(
    flags: ResamplerFlags,
    method: ResampleMethod,
    in_rate: u32,
    out_rate: u32,
) -> ResampleMethod {
    let mut method = method;
    if !method.is_supported() {
        tracing::warn!(
            "Support for resampler '{method}' not compiled in, reverting to 'auto'"
        );
        method = ResampleMethod::Auto;
    }

    method = match method {
        ResampleMethod::Copy if in_rate != out_rate => {
            tracing::info!("Resampler 'copy' cannot change sampling rate, reverting to 'auto'");
            ResampleMethod::Auto
        }
        m @ (ResampleMethod::Copy | ResampleMethod::Fft) if flags.variable_rate => {
            tracing::info!("Resampler '{m}' cannot do variable rate, reverting to 'auto'");
            ResampleMethod::Auto
        }
        ResampleMethod::Peaks if in_rate < out_rate => {
            tracing::warn!("The 'peaks' resampler only supports downsampling, reverting to 'auto'");
            ResampleMethod::Auto
        }
        m => m,
    };

    if method == ResampleMethod::Auto {
        method = BackendRegistry::global().default_method();
    }
    method
}

/// Working format for a method.
///
/// Copy, trivial and peaks gain nothing from extra precision and run in
/// S16 whenever either side fits it. Band-limited methods run in F32.
fn choose_work_format(
    method: ResampleMethod,
    a: SampleFormat,
    b: SampleFormat,
    map_required: bool,
) -> SampleFormat {
    match method {
        ResampleMethod::Copy | ResampleMethod::Trivial if !map_required && a == b => a,
        ResampleMethod::Copy | ResampleMethod::Trivial | ResampleMethod::Peaks => {
            if a == SampleFormat::S16NE
                || b == SampleFormat::S16NE
                || !a.is_more_precise_than_s16()
                || !b.is_more_precise_than_s16()
            {
                SampleFormat::S16NE
            } else {
                SampleFormat::F32NE
            }
        }
        _ => SampleFormat::F32NE,
    }
}
