//! Resample methods and creation flags.

use std::fmt;
use std::str::FromStr;

use super::registry::BackendRegistry;
use crate::error::ConfigurationError;
use crate::remap::RemapFlags;

/// Resampling algorithm.
///
/// Methods map to backends registered at startup. Whether a method is
/// available depends on the enabled cargo features; see
/// [`is_supported`](Self::is_supported).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResampleMethod {
    /// Pass-through; only valid for identical rates.
    Copy,
    /// Nearest earlier frame with a fractional accumulator.
    Trivial,
    /// Maximum absolute sample per output frame, for level meters.
    Peaks,
    /// Windowed sinc, longest filter.
    SincBest,
    /// Windowed sinc, medium filter.
    SincMedium,
    /// Windowed sinc, short filter.
    SincFastest,
    /// Linear polynomial interpolation.
    PolyLinear,
    /// Cubic polynomial interpolation.
    PolyCubic,
    /// FFT based, fixed ratio only.
    Fft,
    /// Best available method.
    #[default]
    Auto,
}

impl ResampleMethod {
    /// Every method, `Auto` last.
    pub const ALL: [Self; 10] = [
        Self::Copy,
        Self::Trivial,
        Self::Peaks,
        Self::SincBest,
        Self::SincMedium,
        Self::SincFastest,
        Self::PolyLinear,
        Self::PolyCubic,
        Self::Fft,
        Self::Auto,
    ];

    /// Configuration name of the method.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Trivial => "trivial",
            Self::Peaks => "peaks",
            Self::SincBest => "sinc-best",
            Self::SincMedium => "sinc-medium",
            Self::SincFastest => "sinc-fastest",
            Self::PolyLinear => "poly-linear",
            Self::PolyCubic => "poly-cubic",
            Self::Fft => "fft",
            Self::Auto => "auto",
        }
    }

    /// Returns true if a backend for the method is compiled in.
    #[must_use]
    pub fn is_supported(self) -> bool {
        self == Self::Auto || BackendRegistry::global().is_available(self)
    }

    /// Returns true if the method can change its ratio while running.
    #[must_use]
    pub const fn supports_variable_rate(self) -> bool {
        !matches!(self, Self::Copy | Self::Fft)
    }
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResampleMethod {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| ConfigurationError::UnknownResampleMethod {
                name: s.to_string(),
            })
    }
}

/// Returns every method with a compiled-in backend.
#[must_use]
pub fn available_methods() -> Vec<ResampleMethod> {
    ResampleMethod::ALL
        .into_iter()
        .filter(|m| m.is_supported())
        .collect()
}

/// Options fixed at resampler creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResamplerFlags {
    /// The input or output rate may change while running.
    pub variable_rate: bool,
    /// Map channels by index only.
    pub no_remap: bool,
    /// Connect only channels with matching positions.
    pub no_remix: bool,
    /// Leave LFE channels out of up- and downmixing.
    pub no_lfe: bool,
}

impl ResamplerFlags {
    /// Flags for a stream whose rate changes while playing.
    #[must_use]
    pub fn variable_rate() -> Self {
        Self {
            variable_rate: true,
            ..Self::default()
        }
    }

    /// The subset of flags that affects remapping.
    #[must_use]
    pub fn remap_flags(&self) -> RemapFlags {
        RemapFlags {
            no_remap: self.no_remap,
            no_remix: self.no_remix,
            no_lfe: self.no_lfe,
        }
    }
}
