//! Sample formats and sample specs.

use std::fmt;
use std::time::Duration;

use crate::error::ConfigurationError;
use crate::sample::CHANNELS_MAX;

/// Highest sample rate a spec may carry.
pub const RATE_MAX: u32 = 48_000 * 8;

/// Encoding of a single sample.
///
/// `S16NE`, `F32NE` and friends alias the variant matching the host byte
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8 bit, silence at 0x80.
    U8,
    /// 8 bit A-law (G.711).
    Alaw,
    /// 8 bit mu-law (G.711).
    Ulaw,
    /// Signed 16 bit, little endian.
    S16Le,
    /// Signed 16 bit, big endian.
    S16Be,
    /// 32 bit IEEE float, little endian, nominal range -1.0..1.0.
    F32Le,
    /// 32 bit IEEE float, big endian, nominal range -1.0..1.0.
    F32Be,
    /// Signed 32 bit, little endian.
    S32Le,
    /// Signed 32 bit, big endian.
    S32Be,
    /// Signed 24 bit packed in 3 bytes, little endian.
    S24Le,
    /// Signed 24 bit packed in 3 bytes, big endian.
    S24Be,
    /// Signed 24 bit in the low bits of a 32 bit word, little endian.
    S24In32Le,
    /// Signed 24 bit in the low bits of a 32 bit word, big endian.
    S24In32Be,
}

impl SampleFormat {
    /// Signed 16 bit in host byte order.
    #[cfg(target_endian = "little")]
    pub const S16NE: Self = Self::S16Le;
    /// Signed 16 bit in host byte order.
    #[cfg(target_endian = "big")]
    pub const S16NE: Self = Self::S16Be;

    /// 32 bit float in host byte order.
    #[cfg(target_endian = "little")]
    pub const F32NE: Self = Self::F32Le;
    /// 32 bit float in host byte order.
    #[cfg(target_endian = "big")]
    pub const F32NE: Self = Self::F32Be;

    /// Signed 32 bit in host byte order.
    #[cfg(target_endian = "little")]
    pub const S32NE: Self = Self::S32Le;
    /// Signed 32 bit in host byte order.
    #[cfg(target_endian = "big")]
    pub const S32NE: Self = Self::S32Be;

    /// All formats, in wire-code order.
    pub const ALL: [Self; 13] = [
        Self::U8,
        Self::Alaw,
        Self::Ulaw,
        Self::S16Le,
        Self::S16Be,
        Self::F32Le,
        Self::F32Be,
        Self::S32Le,
        Self::S32Be,
        Self::S24Le,
        Self::S24Be,
        Self::S24In32Le,
        Self::S24In32Be,
    ];

    /// Size of one sample in bytes.
    #[must_use]
    pub const fn sample_size(self) -> usize {
        match self {
            Self::U8 | Self::Alaw | Self::Ulaw => 1,
            Self::S16Le | Self::S16Be => 2,
            Self::S24Le | Self::S24Be => 3,
            Self::F32Le
            | Self::F32Be
            | Self::S32Le
            | Self::S32Be
            | Self::S24In32Le
            | Self::S24In32Be => 4,
        }
    }

    /// Short name as used in configuration files and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::Alaw => "aLaw",
            Self::Ulaw => "uLaw",
            Self::S16Le => "s16le",
            Self::S16Be => "s16be",
            Self::F32Le => "float32le",
            Self::F32Be => "float32be",
            Self::S32Le => "s32le",
            Self::S32Be => "s32be",
            Self::S24Le => "s24le",
            Self::S24Be => "s24be",
            Self::S24In32Le => "s24-32le",
            Self::S24In32Be => "s24-32be",
        }
    }

    /// Parses a name produced by [`name`](Self::name).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Stable numeric code used on the wire.
    #[must_use]
    pub fn wire_code(self) -> u8 {
        Self::ALL.iter().position(|f| *f == self).unwrap_or(0) as u8
    }

    /// Inverse of [`wire_code`](Self::wire_code).
    #[must_use]
    pub fn from_wire_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Returns true for big endian multi-byte formats.
    #[must_use]
    pub const fn is_big_endian(self) -> bool {
        matches!(
            self,
            Self::S16Be | Self::F32Be | Self::S32Be | Self::S24Be | Self::S24In32Be
        )
    }

    /// Returns true if the format carries more precision than signed 16 bit.
    #[must_use]
    pub const fn is_more_precise_than_s16(self) -> bool {
        !matches!(
            self,
            Self::U8 | Self::Alaw | Self::Ulaw | Self::S16Le | Self::S16Be
        )
    }

    /// Byte value that fills a silent buffer of this format.
    ///
    /// Every multi-byte format is silent at all-zero.
    #[must_use]
    pub const fn silence_byte(self) -> u8 {
        match self {
            Self::U8 => 0x80,
            Self::Alaw => 0xd5,
            Self::Ulaw => 0xff,
            _ => 0,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Format, rate and channel count of an audio stream.
///
/// # Example
///
/// ```
/// use stream_mixer::{SampleFormat, SampleSpec};
///
/// let spec = SampleSpec::new(SampleFormat::S16Le, 48000, 2);
/// assert_eq!(spec.frame_size(), 4);
/// assert_eq!(spec.bytes_per_second(), 192_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleSpec {
    /// Sample encoding.
    pub format: SampleFormat,
    /// Frames per second.
    pub rate: u32,
    /// Samples per frame.
    pub channels: u8,
}

impl SampleSpec {
    /// Creates a spec. Use [`validate`](Self::validate) before trusting it.
    #[must_use]
    pub const fn new(format: SampleFormat, rate: u32, channels: u8) -> Self {
        Self {
            format,
            rate,
            channels,
        }
    }

    /// Checks rate and channel count bounds.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.rate == 0 || self.rate > RATE_MAX {
            return Err(ConfigurationError::invalid_spec(format!(
                "rate {} outside 1..={RATE_MAX}",
                self.rate
            )));
        }
        if self.channels == 0 {
            return Err(ConfigurationError::invalid_spec("zero channels"));
        }
        if self.channels as usize > CHANNELS_MAX {
            return Err(ConfigurationError::TooManyChannels {
                channels: self.channels as usize,
                max: CHANNELS_MAX,
            });
        }
        Ok(())
    }

    /// Returns true if [`validate`](Self::validate) would succeed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Bytes per sample.
    #[must_use]
    pub const fn sample_size(&self) -> usize {
        self.format.sample_size()
    }

    /// Bytes per frame.
    #[must_use]
    pub const fn frame_size(&self) -> usize {
        self.format.sample_size() * self.channels as usize
    }

    /// Bytes per second of audio.
    #[must_use]
    pub const fn bytes_per_second(&self) -> usize {
        self.frame_size() * self.rate as usize
    }

    /// Rounds `length` down to a whole number of frames.
    #[must_use]
    pub const fn frame_align(&self, length: usize) -> usize {
        let fs = self.frame_size();
        (length / fs) * fs
    }

    /// Returns true if `length` is a whole number of frames.
    #[must_use]
    pub const fn is_frame_aligned(&self, length: usize) -> bool {
        length % self.frame_size() == 0
    }

    /// Playback time of `length` bytes, rounded down to whole microseconds.
    #[must_use]
    pub fn bytes_to_duration(&self, length: usize) -> Duration {
        let frames = (length / self.frame_size()) as u64;
        Duration::from_micros(frames * 1_000_000 / u64::from(self.rate))
    }

    /// Bytes needed to play `duration`, rounded down to whole frames.
    #[must_use]
    pub fn duration_to_bytes(&self, duration: Duration) -> usize {
        let frames = duration.as_micros() * u128::from(self.rate) / 1_000_000;
        frames as usize * self.frame_size()
    }
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self::new(SampleFormat::S16Le, 44_100, 2)
    }
}

impl fmt::Display for SampleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}ch {}Hz", self.format, self.channels, self.rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_sizes() {
        assert_eq!(SampleFormat::U8.sample_size(), 1);
        assert_eq!(SampleFormat::Ulaw.sample_size(), 1);
        assert_eq!(SampleFormat::S16Be.sample_size(), 2);
        assert_eq!(SampleFormat::S24Le.sample_size(), 3);
        assert_eq!(SampleFormat::S24In32Le.sample_size(), 4);
        assert_eq!(SampleFormat::F32NE.sample_size(), 4);
    }

    #[test]
    fn test_silence_bytes() {
        assert_eq!(SampleFormat::U8.silence_byte(), 0x80);
        assert_eq!(SampleFormat::Alaw.silence_byte(), 0xd5);
        assert_eq!(SampleFormat::Ulaw.silence_byte(), 0xff);
        assert_eq!(SampleFormat::S16Le.silence_byte(), 0);
        assert_eq!(SampleFormat::F32Be.silence_byte(), 0);
    }

    #[test]
    fn test_names_and_wire_codes() {
        for format in SampleFormat::ALL {
            assert_eq!(SampleFormat::from_name(format.name()), Some(format));
            assert_eq!(SampleFormat::from_wire_code(format.wire_code()), Some(format));
        }
        assert_eq!(SampleFormat::from_name("s17le"), None);
        assert_eq!(SampleFormat::from_wire_code(13), None);
    }

    #[test]
    fn test_precision_ordering() {
        assert!(!SampleFormat::U8.is_more_precise_than_s16());
        assert!(!SampleFormat::S16Be.is_more_precise_than_s16());
        assert!(SampleFormat::S24Le.is_more_precise_than_s16());
        assert!(SampleFormat::F32Le.is_more_precise_than_s16());
    }

    #[test]
    fn test_spec_validation() {
        assert!(SampleSpec::new(SampleFormat::S16Le, 44100, 2).is_valid());
        assert!(SampleSpec::new(SampleFormat::S16Le, 0, 2).validate().is_err());
        assert!(SampleSpec::new(SampleFormat::S16Le, RATE_MAX + 1, 2)
            .validate()
            .is_err());
        assert!(SampleSpec::new(SampleFormat::S16Le, 8000, 0).validate().is_err());
        assert!(matches!(
            SampleSpec::new(SampleFormat::S16Le, 8000, 33).validate(),
            Err(ConfigurationError::TooManyChannels { channels: 33, .. })
        ));
    }

    #[test]
    fn test_frame_align() {
        let spec = SampleSpec::new(SampleFormat::S24Le, 48000, 2);
        assert_eq!(spec.frame_size(), 6);
        assert_eq!(spec.frame_align(13), 12);
        assert!(spec.is_frame_aligned(12));
        assert!(!spec.is_frame_aligned(13));
    }

    #[test]
    fn test_duration_conversion() {
        let spec = SampleSpec::new(SampleFormat::S16Le, 48000, 2);
        assert_eq!(spec.duration_to_bytes(Duration::from_millis(10)), 1920);
        assert_eq!(spec.bytes_to_duration(1920), Duration::from_millis(10));
    }

    #[test]
    fn test_display() {
        let spec = SampleSpec::new(SampleFormat::F32Le, 8000, 1);
        assert_eq!(spec.to_string(), "float32le 1ch 8000Hz");
    }
}
