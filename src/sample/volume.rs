//! Software volumes.

use std::fmt;

use crate::sample::CHANNELS_MAX;

/// Linear volume in 16.16 fixed point.
///
/// `Volume::NORM` is unity gain. The raw value doubles as the integer
/// multiplier applied to 16 bit samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Volume(pub u32);

impl Volume {
    /// Silence.
    pub const MUTED: Self = Self(0);
    /// Unity gain.
    pub const NORM: Self = Self(0x10000);
    /// Largest representable volume.
    pub const MAX: Self = Self(u32::MAX / 2);

    /// Converts a linear gain factor.
    #[must_use]
    pub fn from_linear(gain: f64) -> Self {
        if gain <= 0.0 {
            return Self::MUTED;
        }
        let raw = (gain * f64::from(Self::NORM.0)).round();
        Self(raw.min(f64::from(Self::MAX.0)) as u32)
    }

    /// Linear gain factor.
    #[must_use]
    pub fn linear(self) -> f64 {
        f64::from(self.0) / f64::from(Self::NORM.0)
    }

    /// Product of two volumes, saturating at [`Volume::MAX`].
    #[must_use]
    pub fn multiply(self, other: Self) -> Self {
        let product = u64::from(self.0) * u64::from(other.0) / u64::from(Self::NORM.0);
        Self(product.min(u64::from(Self::MAX.0)) as u32)
    }

    /// Returns true for unity gain.
    #[must_use]
    pub const fn is_norm(self) -> bool {
        self.0 == Self::NORM.0
    }

    /// Returns true for zero gain.
    #[must_use]
    pub const fn is_muted(self) -> bool {
        self.0 == 0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::NORM
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}%", self.linear() * 100.0)
    }
}

/// One volume per channel.
///
/// Fixed capacity so it can be copied into real-time messages without
/// allocating.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelVolumes {
    channels: u8,
    values: [Volume; CHANNELS_MAX],
}

impl ChannelVolumes {
    /// Sets every channel to `volume`.
    #[must_use]
    pub fn uniform(channels: u8, volume: Volume) -> Self {
        debug_assert!(channels as usize <= CHANNELS_MAX);
        Self {
            channels: channels.min(CHANNELS_MAX as u8),
            values: [volume; CHANNELS_MAX],
        }
    }

    /// Unity gain on every channel.
    #[must_use]
    pub fn norm(channels: u8) -> Self {
        Self::uniform(channels, Volume::NORM)
    }

    /// Zero gain on every channel.
    #[must_use]
    pub fn muted(channels: u8) -> Self {
        Self::uniform(channels, Volume::MUTED)
    }

    /// Builds from a slice; extra entries past [`CHANNELS_MAX`] are ignored.
    #[must_use]
    pub fn from_slice(values: &[Volume]) -> Self {
        let mut v = Self::uniform(values.len().min(CHANNELS_MAX) as u8, Volume::NORM);
        for (dst, src) in v.values.iter_mut().zip(values) {
            *dst = *src;
        }
        v
    }

    /// Number of channels.
    #[must_use]
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Per-channel values.
    #[must_use]
    pub fn values(&self) -> &[Volume] {
        &self.values[..self.channels as usize]
    }

    /// Volume of one channel, or unity past the end.
    #[must_use]
    pub fn get(&self, channel: usize) -> Volume {
        self.values().get(channel).copied().unwrap_or(Volume::NORM)
    }

    /// Sets the volume of one channel.
    pub fn set(&mut self, channel: usize, volume: Volume) {
        if let Some(v) = self.values[..self.channels as usize].get_mut(channel) {
            *v = volume;
        }
    }

    /// Returns true if every channel is at unity gain.
    #[must_use]
    pub fn is_norm(&self) -> bool {
        self.values().iter().all(|v| v.is_norm())
    }

    /// Returns true if every channel is silent.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.values().iter().all(|v| v.is_muted())
    }

    /// Channel-wise product. A single-channel operand scales every channel.
    #[must_use]
    pub fn multiply(&self, other: &Self) -> Self {
        let mut out = *self;
        for (i, v) in out.values[..self.channels as usize].iter_mut().enumerate() {
            let factor = if other.channels == 1 {
                other.values[0]
            } else {
                other.get(i)
            };
            *v = v.multiply(factor);
        }
        out
    }

    /// Arithmetic mean of all channels.
    #[must_use]
    pub fn average(&self) -> Volume {
        let values = self.values();
        if values.is_empty() {
            return Volume::MUTED;
        }
        let sum: u64 = values.iter().map(|v| u64::from(v.0)).sum();
        Volume((sum / values.len() as u64) as u32)
    }
}

impl fmt::Debug for ChannelVolumes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_linear() {
        assert!((Volume::NORM.linear() - 1.0).abs() < f64::EPSILON);
        assert_eq!(Volume::from_linear(0.5), Volume(0x8000));
        assert_eq!(Volume::from_linear(-1.0), Volume::MUTED);
    }

    #[test]
    fn test_volume_multiply() {
        let half = Volume(0x8000);
        assert_eq!(half.multiply(half), Volume(0x4000));
        assert_eq!(Volume::NORM.multiply(half), half);
        assert_eq!(Volume::MAX.multiply(Volume::MAX), Volume::MAX);
    }

    #[test]
    fn test_channel_volumes_norm_and_muted() {
        let norm = ChannelVolumes::norm(2);
        assert!(norm.is_norm());
        assert!(!norm.is_muted());
        assert_eq!(norm.values().len(), 2);
        assert!(ChannelVolumes::muted(6).is_muted());
    }

    #[test]
    fn test_channel_volumes_multiply_scalar() {
        let ratio = ChannelVolumes::from_slice(&[Volume::NORM, Volume(0x8000)]);
        let factor = ChannelVolumes::uniform(1, Volume(0x8000));
        let soft = ratio.multiply(&factor);
        assert_eq!(soft.get(0), Volume(0x8000));
        assert_eq!(soft.get(1), Volume(0x4000));
    }

    #[test]
    fn test_channel_volumes_set_and_average() {
        let mut v = ChannelVolumes::norm(2);
        v.set(1, Volume::MUTED);
        v.set(5, Volume::MUTED);
        assert_eq!(v.get(1), Volume::MUTED);
        assert_eq!(v.average(), Volume(0x8000));
        assert!(!v.is_norm());
    }
}
