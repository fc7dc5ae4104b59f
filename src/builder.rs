//! Builder for new playback streams.

use crate::adapter::{DeviceInfo, StreamAdapter, StreamId, StreamProducer};
use crate::error::ConfigurationError;
use crate::event::EventCallback;
use crate::memory::MemPool;
use crate::resampler::{ResampleMethod, ResamplerFlags};
use crate::sample::{ChannelMap, ChannelVolumes, SampleSpec};

/// Everything a stream adapter is created from.
pub(crate) struct StreamSettings {
    pub(crate) name: String,
    pub(crate) spec: SampleSpec,
    pub(crate) map: Option<ChannelMap>,
    pub(crate) volume: Option<ChannelVolumes>,
    pub(crate) volume_factor: Option<ChannelVolumes>,
    pub(crate) muted: bool,
    pub(crate) method: Option<ResampleMethod>,
    pub(crate) flags: ResamplerFlags,
    pub(crate) start_corked: bool,
    pub(crate) events: Option<EventCallback>,
}

/// Builder describing a new playback stream.
///
/// Pass it to [`DeviceHandle::link`](crate::device::DeviceHandle::link)
/// together with a producer, or call [`build`](Self::build) to create an
/// unlinked adapter.
///
/// # Example
///
/// ```
/// use stream_mixer::{ResampleMethod, SampleFormat, SampleSpec, StreamAdapterBuilder};
///
/// let builder = StreamAdapterBuilder::new(SampleSpec::new(SampleFormat::S16NE, 8000, 1))
///     .name("call")
///     .resample_method(ResampleMethod::Trivial)
///     .start_corked(true);
/// ```
#[must_use]
pub struct StreamAdapterBuilder {
    settings: StreamSettings,
}

impl StreamAdapterBuilder {
    /// Creates a builder for a stream delivering audio in `spec`.
    pub fn new(spec: SampleSpec) -> Self {
        Self {
            settings: StreamSettings {
                name: "stream".to_string(),
                spec,
                map: None,
                volume: None,
                volume_factor: None,
                muted: false,
                method: None,
                flags: ResamplerFlags::default(),
                start_corked: false,
                events: None,
            },
        }
    }

    /// Set the name used in logs and events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.settings.name = name.into();
        self
    }

    /// Set the channel positions of the producer's audio.
    ///
    /// Default: the standard layout for the channel count
    pub fn channel_map(mut self, map: ChannelMap) -> Self {
        self.settings.map = Some(map);
        self
    }

    /// Set the user-facing volume, one entry per stream channel.
    pub fn volume(mut self, volume: ChannelVolumes) -> Self {
        self.settings.volume = Some(volume);
        self
    }

    /// Set an attenuation applied on top of the volume.
    pub fn volume_factor(mut self, factor: ChannelVolumes) -> Self {
        self.settings.volume_factor = Some(factor);
        self
    }

    /// Start muted.
    pub fn muted(mut self, muted: bool) -> Self {
        self.settings.muted = muted;
        self
    }

    /// Set the rate conversion method.
    ///
    /// Default: the device's method
    pub fn resample_method(mut self, method: ResampleMethod) -> Self {
        self.settings.method = Some(method);
        self
    }

    /// Allow the stream's rate to change after creation.
    pub fn variable_rate(mut self, enabled: bool) -> Self {
        self.settings.flags.variable_rate = enabled;
        self
    }

    /// Match channels by index instead of by position.
    pub fn no_remap(mut self, enabled: bool) -> Self {
        self.settings.flags.no_remap = enabled;
        self
    }

    /// Never mix one channel into another.
    pub fn no_remix(mut self, enabled: bool) -> Self {
        self.settings.flags.no_remix = enabled;
        self
    }

    /// Keep the LFE channel out of up- and downmixes.
    pub fn no_lfe(mut self, enabled: bool) -> Self {
        self.settings.flags.no_lfe = enabled;
        self
    }

    /// Link the stream paused.
    pub fn start_corked(mut self, corked: bool) -> Self {
        self.settings.start_corked = corked;
        self
    }

    /// Set a callback for this stream's events.
    ///
    /// Default: the device's callback
    pub fn on_event(mut self, callback: EventCallback) -> Self {
        self.settings.events = Some(callback);
        self
    }

    /// Format of the stream.
    #[must_use]
    pub fn spec(&self) -> &SampleSpec {
        &self.settings.spec
    }

    /// Creates the adapter for a device without linking it.
    ///
    /// Fails if the sample spec, channel map or volumes are invalid or no resampler
    /// backend can convert between the stream and the device.
    pub fn build(
        self,
        id: StreamId,
        device: &DeviceInfo,
        pool: &MemPool,
        producer: Box<dyn StreamProducer>,
    ) -> Result<StreamAdapter, ConfigurationError> {
        StreamAdapter::new(id, self.settings, device, pool, producer)
    }
}

impl std::fmt::Debug for StreamAdapterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAdapterBuilder")
            .field("name", &self.settings.name)
            .field("spec", &self.settings.spec)
            .field("map", &self.settings.map)
            .field("muted", &self.settings.muted)
            .field("method", &self.settings.method)
            .field("flags", &self.settings.flags)
            .field("start_corked", &self.settings.start_corked)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{BufferedProducer, StreamState};
    use crate::sample::{ChannelPosition, SampleFormat};

    fn device() -> DeviceInfo {
        let spec = SampleSpec::new(SampleFormat::F32NE, 48000, 2);
        DeviceInfo::new(spec, ChannelMap::stereo())
    }

    #[test]
    fn test_builder_defaults() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
        let adapter = StreamAdapterBuilder::new(spec)
            .build(StreamId::new(1), &device(), &MemPool::default(), Box::new(BufferedProducer::new(spec)))
            .unwrap();
        assert_eq!(adapter.name(), "stream");
        assert_eq!(adapter.state(), StreamState::Init);
        assert_eq!(adapter.channel_map(), &ChannelMap::mono());
        assert!(adapter.volume().is_norm());
        assert!(!adapter.is_muted());
        assert!(adapter.resampler().is_some());
    }

    #[test]
    fn test_builder_settings_reach_adapter() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 48000, 2);
        let adapter = StreamAdapterBuilder::new(spec)
            .name("music")
            .muted(true)
            .resample_method(ResampleMethod::Trivial)
            .variable_rate(true)
            .build(StreamId::new(2), &device(), &MemPool::default(), Box::new(BufferedProducer::new(spec)))
            .unwrap();
        assert_eq!(adapter.name(), "music");
        assert!(adapter.is_muted());
        let resampler = adapter.resampler().unwrap();
        assert_eq!(resampler.method(), ResampleMethod::Trivial);
        assert!(resampler.flags().variable_rate);
    }

    #[test]
    fn test_builder_rejects_mismatched_map() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 48000, 2);
        let result = StreamAdapterBuilder::new(spec)
            .channel_map(ChannelMap::new(vec![ChannelPosition::Mono]).unwrap())
            .build(StreamId::new(3), &device(), &MemPool::default(), Box::new(BufferedProducer::new(spec)));
        assert!(matches!(result, Err(ConfigurationError::ChannelMapMismatch { .. })));
    }

    #[test]
    fn test_builder_rejects_invalid_spec() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 0, 2);
        let result = StreamAdapterBuilder::new(spec)
            .build(StreamId::new(4), &device(), &MemPool::default(), Box::new(BufferedProducer::new(spec)));
        assert!(result.is_err());
    }
}
