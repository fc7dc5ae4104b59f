//! Backend interface and the registry of compiled-in backends.

use std::sync::OnceLock;

use super::method::ResampleMethod;
use super::{copy, peaks, trivial};
use crate::error::ConfigurationError;
use crate::sample::SampleFormat;

/// Parameters a backend is built from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BackendParams {
    pub method: ResampleMethod,
    pub in_rate: u32,
    pub out_rate: u32,
    /// Channels of the working data, i.e. after remapping.
    pub channels: usize,
    pub format: SampleFormat,
    pub variable_rate: bool,
}

impl BackendParams {
    pub fn frame_size(&self) -> usize {
        self.format.sample_size() * self.channels
    }
}

/// One resampling algorithm operating on working-format frames.
pub(crate) trait ResampleBackend: Send {
    /// True if the backend never changes the data.
    fn passthrough(&self) -> bool {
        false
    }

    /// Converts `in_frames` frames from `input` into `output`, returning the
    /// number of frames written.
    fn resample(&mut self, input: &[u8], in_frames: usize, output: &mut [u8]) -> usize;

    /// Adopts new rates in place. Returns false if the backend has to be
    /// rebuilt instead.
    fn update_rates(&mut self, in_rate: u32, out_rate: u32) -> bool;

    /// Drops filter history.
    fn reset(&mut self);

    /// Upper bound of frames one `resample` call can write for `in_frames`.
    fn max_output_frames(&self, in_frames: usize) -> usize;

    /// Input frames held back for a later call.
    fn leftover_frames(&self) -> usize {
        0
    }

    /// Delay added by the backend, in input frames.
    fn delay_frames(&self) -> f64 {
        self.leftover_frames() as f64
    }
}

type Factory = fn(&BackendParams) -> Result<Box<dyn ResampleBackend>, ConfigurationError>;

/// Maps methods to backend constructors.
pub(crate) struct BackendRegistry {
    entries: Vec<(ResampleMethod, Factory)>,
}

impl BackendRegistry {
    fn new() -> Self {
        let mut entries: Vec<(ResampleMethod, Factory)> = vec![
            (ResampleMethod::Copy, copy::create),
            (ResampleMethod::Trivial, trivial::create),
            (ResampleMethod::Peaks, peaks::create),
        ];
        #[cfg(feature = "rubato")]
        for method in [
            ResampleMethod::SincBest,
            ResampleMethod::SincMedium,
            ResampleMethod::SincFastest,
            ResampleMethod::PolyLinear,
            ResampleMethod::PolyCubic,
            ResampleMethod::Fft,
        ] {
            entries.push((method, super::bandlimited::create));
        }
        Self { entries }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Self {
        static REGISTRY: OnceLock<BackendRegistry> = OnceLock::new();
        REGISTRY.get_or_init(Self::new)
    }

    fn lookup(&self, method: ResampleMethod) -> Option<Factory> {
        self.entries
            .iter()
            .find(|(m, _)| *m == method)
            .map(|(_, factory)| *factory)
    }

    /// Returns true if `method` has a backend.
    pub fn is_available(&self, method: ResampleMethod) -> bool {
        self.lookup(method).is_some()
    }

    /// Method `Auto` resolves to.
    pub fn default_method(&self) -> ResampleMethod {
        if self.is_available(ResampleMethod::SincMedium) {
            ResampleMethod::SincMedium
        } else {
            ResampleMethod::Trivial
        }
    }

    /// Builds the backend for `params.method`.
    pub fn create(
        &self,
        params: &BackendParams,
    ) -> Result<Box<dyn ResampleBackend>, ConfigurationError> {
        let factory = self
            .lookup(params.method)
            .ok_or(ConfigurationError::NoBackend {
                method: params.method,
            })?;
        factory(params)
    }
}

/// Output frames for `in_frames` at the given rates, rounded up, plus one
/// frame of slack for the fractional position carried between calls.
pub(crate) fn frames_for_rates(in_frames: usize, in_rate: u32, out_rate: u32) -> usize {
    let out = (in_frames as u64 * u64::from(out_rate)).div_ceil(u64::from(in_rate));
    out as usize + 1
}
