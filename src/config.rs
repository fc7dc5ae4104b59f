//! Configuration types for the block pool and output devices.

use std::time::Duration;

use crate::error::ConfigurationError;
use crate::resampler::ResampleMethod;
use crate::sample::{ChannelMap, SampleFormat, SampleSpec};
use crate::transport::{BlockSizing, PcmBlockSizing};

/// Maximum length of a stream's render queue in bytes.
pub const RENDER_QUEUE_MAX_LENGTH: usize = 32 * 1024 * 1024;

/// Limits of the shared block pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Largest block the conversion steps will produce.
    ///
    /// Default: 64 KiB
    pub block_size_max: usize,

    /// Number of blocks that may be alive at once.
    ///
    /// Default: 1024
    pub max_blocks: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            block_size_max: 64 * 1024,
            max_blocks: 1024,
        }
    }
}

/// Preset device formats for common use cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreset {
    /// 16 kHz mono S16, as used by telephony and speech links.
    Voice,

    /// 48 kHz stereo float.
    #[default]
    Music,
}

impl DevicePreset {
    /// Sample spec of the preset.
    #[must_use]
    pub fn sample_spec(&self) -> SampleSpec {
        match self {
            Self::Voice => SampleSpec::new(SampleFormat::S16NE, 16_000, 1),
            Self::Music => SampleSpec::new(SampleFormat::F32NE, 48_000, 2),
        }
    }
}

/// Configuration of one output device and its real-time thread.
///
/// Use [`DeviceConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use stream_mixer::DeviceConfig;
/// use std::time::Duration;
///
/// let config = DeviceConfig {
///     period_duration: Duration::from_millis(5),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Name used in logs.
    pub name: String,

    /// Format the device mixes and plays in.
    ///
    /// Default: S16LE, 44100 Hz, stereo
    pub spec: SampleSpec,

    /// Channel positions; `None` uses the default map for the channel count.
    pub channel_map: Option<ChannelMap>,

    /// Audio kept rendered ahead of playback. This is also how far the
    /// device can rewind.
    ///
    /// Default: 50ms
    pub buffer_duration: Duration,

    /// Audio played per wakeup of the real-time thread.
    ///
    /// Default: 10ms
    pub period_duration: Duration,

    /// Link MTU of a block-oriented transport. When set, the period is the
    /// transport's write block size instead of `period_duration`.
    pub transport_mtu: Option<usize>,

    /// Method used for streams that do not pick one.
    ///
    /// Default: [`ResampleMethod::Auto`]
    pub resample_method: ResampleMethod,

    /// Capacity of the control-to-device message queue.
    ///
    /// Default: 256
    pub message_queue_capacity: usize,

    /// Block pool limits.
    pub pool: PoolConfig,
}

impl DeviceConfig {
    /// Creates a default configuration with the sample spec of `preset`.
    #[must_use]
    pub fn from_preset(preset: DevicePreset) -> Self {
        Self {
            spec: preset.sample_spec(),
            ..Self::default()
        }
    }

    /// Checks the sample spec, map and timing values.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.spec.validate()?;
        if let Some(map) = &self.channel_map {
            map.check_compatible(self.spec.channels)?;
        }
        if self.period_bytes() == 0 {
            return Err(ConfigurationError::invalid_spec("period shorter than one frame"));
        }
        if self.buffer_bytes() < self.period_bytes() {
            return Err(ConfigurationError::invalid_spec(
                "buffer shorter than one period",
            ));
        }
        Ok(())
    }

    /// Channel map, falling back to the default for the channel count.
    pub fn resolved_channel_map(&self) -> Result<ChannelMap, ConfigurationError> {
        match &self.channel_map {
            Some(map) => Ok(map.clone()),
            None => ChannelMap::default_for(self.spec.channels),
        }
    }

    /// Buffer size in bytes.
    #[must_use]
    pub fn buffer_bytes(&self) -> usize {
        self.spec.duration_to_bytes(self.buffer_duration)
    }

    /// Period size in bytes.
    #[must_use]
    pub fn period_bytes(&self) -> usize {
        match self.transport_mtu {
            Some(mtu) => PcmBlockSizing::new(self.spec).write_block_size(mtu),
            None => self.spec.duration_to_bytes(self.period_duration),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            spec: SampleSpec::new(SampleFormat::S16Le, 44_100, 2),
            channel_map: None,
            buffer_duration: Duration::from_millis(50),
            period_duration: Duration::from_millis(10),
            transport_mtu: None,
            resample_method: ResampleMethod::Auto,
            message_queue_capacity: 256,
            pool: PoolConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.block_size_max, 65536);
        assert_eq!(config.max_blocks, 1024);
    }

    #[test]
    fn test_device_preset_default() {
        assert_eq!(DevicePreset::default(), DevicePreset::Music);
    }

    #[test]
    fn test_device_preset_voice() {
        let spec = DevicePreset::Voice.sample_spec();
        assert_eq!(spec.rate, 16000);
        assert_eq!(spec.channels, 1);
    }

    #[test]
    fn test_device_config_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.spec, SampleSpec::new(SampleFormat::S16Le, 44100, 2));
        assert_eq!(config.buffer_duration, Duration::from_millis(50));
        assert_eq!(config.period_duration, Duration::from_millis(10));
        assert_eq!(config.buffer_bytes(), 8820);
        assert_eq!(config.period_bytes(), 1764);
        assert!(config.validate().is_ok());
        assert_eq!(config.resolved_channel_map().unwrap(), ChannelMap::stereo());
    }

    #[test]
    fn test_transport_mtu_sets_period() {
        let config = DeviceConfig {
            transport_mtu: Some(895),
            ..DeviceConfig::default()
        };
        assert_eq!(config.period_bytes(), 892);
    }

    #[test]
    fn test_validate_rejects_short_buffer() {
        let config = DeviceConfig {
            buffer_duration: Duration::from_millis(5),
            ..DeviceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_map_mismatch() {
        let config = DeviceConfig {
            channel_map: Some(ChannelMap::mono()),
            ..DeviceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ChannelMapMismatch { .. })
        ));
    }
}
