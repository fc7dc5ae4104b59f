//! The render half of a playback stream: pulling, converting and handing
//! out audio in the device format.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::producer::StreamProducer;
use super::rewind::{RewindRequest, Rewrite};
use super::{DeviceInfo, StreamId, StreamState};
use crate::builder::StreamSettings;
use crate::config::RENDER_QUEUE_MAX_LENGTH;
use crate::error::{ConfigurationError, MemPoolError, StreamError};
use crate::event::{emit, EventCallback, StreamEvent};
use crate::format;
use crate::memory::{MemBlockQueue, MemChunk, MemPool, SeekMode};
use crate::resampler::{ResampleMethod, Resampler, ResamplerFlags};
use crate::sample::{ChannelMap, ChannelVolumes, SampleSpec};

/// Default amount of device audio rendered per pull.
const CONVERT_BUFFER_LENGTH: usize = 4096;

/// A playback stream attached to a device.
///
/// Created through [`StreamAdapterBuilder`](crate::StreamAdapterBuilder).
/// Once linked, the adapter is owned by the device thread; the control side
/// talks to it only through device messages.
pub struct StreamAdapter {
    pub(super) id: StreamId,
    name: String,
    pub(super) spec: SampleSpec,
    map: ChannelMap,
    method: ResampleMethod,
    flags: ResamplerFlags,
    pub(super) state: StreamState,
    start_corked: bool,

    volume: ChannelVolumes,
    volume_factor: ChannelVolumes,
    soft_volume: ChannelVolumes,
    muted: bool,

    pub(super) device: DeviceInfo,
    pool: MemPool,
    pub(super) resampler: Option<Resampler>,
    pub(super) render: MemBlockQueue,
    pub(super) producer: Box<dyn StreamProducer>,
    /// Popped stream audio not yet converted into the render queue.
    pub(super) pending: Option<MemChunk>,

    pub(super) rewrite: Rewrite,
    pub(super) rewrite_flush: bool,
    pub(super) dont_rewind_render: bool,
    pub(super) device_rewind: RewindRequest,

    pub(super) playing_for: usize,
    underrun_for: Option<usize>,
    underrun_for_device: usize,
    underrun_started: bool,
    last_peek_len: usize,
    drained: Arc<AtomicBool>,
    events: Option<EventCallback>,
}

fn build_resampler(
    pool: &MemPool,
    spec: &SampleSpec,
    map: &ChannelMap,
    info: &DeviceInfo,
    method: ResampleMethod,
    flags: ResamplerFlags,
) -> Result<Option<Resampler>, ConfigurationError> {
    if !flags.variable_rate && *spec == info.spec && *map == info.map {
        return Ok(None);
    }
    Resampler::new(
        pool,
        *spec,
        Some(map),
        info.spec,
        Some(&info.map),
        method,
        flags,
    )
    .map(Some)
}

fn render_queue(info: &DeviceInfo, pool: &MemPool) -> MemBlockQueue {
    let silence_len = info
        .spec
        .frame_align(pool.block_size_max())
        .max(info.spec.frame_size());
    MemBlockQueue::new(
        "render",
        RENDER_QUEUE_MAX_LENGTH,
        info.spec.frame_size(),
        0,
        info.max_rewind,
        MemChunk::silence(info.spec.format, silence_len),
    )
}

fn check_volume(
    volume: Option<ChannelVolumes>,
    channels: u8,
) -> Result<ChannelVolumes, ConfigurationError> {
    match volume {
        Some(v) if v.channels() != channels => Err(ConfigurationError::invalid_spec(format!(
            "volume has {} channels, stream has {channels}",
            v.channels()
        ))),
        Some(v) => Ok(v),
        None => Ok(ChannelVolumes::norm(channels)),
    }
}

impl StreamAdapter {
    pub(crate) fn new(
        id: StreamId,
        settings: StreamSettings,
        info: &DeviceInfo,
        pool: &MemPool,
        producer: Box<dyn StreamProducer>,
    ) -> Result<Self, ConfigurationError> {
        let spec = settings.spec;
        spec.validate()?;
        let map = match settings.map {
            Some(map) => {
                map.check_compatible(spec.channels)?;
                map
            }
            None => ChannelMap::default_for(spec.channels)?,
        };
        let volume = check_volume(settings.volume, spec.channels)?;
        let volume_factor = check_volume(settings.volume_factor, spec.channels)?;
        let method = settings.method.unwrap_or(info.resample_method);
        let resampler = build_resampler(pool, &spec, &map, info, method, settings.flags)?;

        let mut adapter = Self {
            id,
            name: settings.name,
            spec,
            map,
            method,
            flags: settings.flags,
            state: StreamState::Init,
            start_corked: settings.start_corked,
            volume,
            volume_factor,
            soft_volume: volume.multiply(&volume_factor),
            muted: settings.muted,
            device: info.clone(),
            pool: pool.clone(),
            resampler,
            render: render_queue(info, pool),
            producer,
            pending: None,
            rewrite: Rewrite::Bytes(0),
            rewrite_flush: false,
            dont_rewind_render: false,
            device_rewind: RewindRequest::default(),
            playing_for: 0,
            underrun_for: None,
            underrun_for_device: 0,
            underrun_started: false,
            last_peek_len: 0,
            drained: Arc::new(AtomicBool::new(false)),
            events: settings.events,
        };
        adapter.update_max_rewind(info.max_rewind);
        adapter.update_max_request(info.max_request);

        tracing::info!(
            stream = %id,
            name = %adapter.name,
            spec = %spec,
            map = %adapter.map,
            resampler = ?adapter.resampler.as_ref().map(Resampler::method),
            "Created stream adapter"
        );
        Ok(adapter)
    }

    /// Id of the stream.
    #[must_use]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Name of the stream.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Format the producer delivers.
    #[must_use]
    pub fn spec(&self) -> &SampleSpec {
        &self.spec
    }

    /// Channel positions of the producer's audio.
    #[must_use]
    pub fn channel_map(&self) -> &ChannelMap {
        &self.map
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// State the device moves the stream into when linking it.
    #[must_use]
    pub fn initial_state(&self) -> StreamState {
        if self.start_corked {
            StreamState::Corked
        } else {
            StreamState::Running
        }
    }

    /// The converter between producer and device, if one is needed.
    #[must_use]
    pub fn resampler(&self) -> Option<&Resampler> {
        self.resampler.as_ref()
    }

    /// Device the stream is attached to.
    #[must_use]
    pub fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    /// Bytes of device audio waiting in the render queue.
    #[must_use]
    pub fn render_length(&self) -> usize {
        self.render.length()
    }

    /// Returns true if the producer ran dry and everything queued was played.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::Acquire)
    }

    /// Shared drained flag, readable from other threads.
    pub(crate) fn drained_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.drained)
    }

    pub(crate) fn set_events(&mut self, events: Option<EventCallback>) {
        if self.events.is_none() {
            self.events = events;
        }
    }

    /// Returns true once per underrun, right after it started.
    pub(crate) fn take_underrun(&mut self) -> bool {
        std::mem::take(&mut self.underrun_started)
    }

    /// Stream bytes needed to render `nbytes` of device audio.
    pub(super) fn to_stream_bytes(&self, nbytes: usize) -> usize {
        self.resampler.as_ref().map_or(nbytes, |r| r.request(nbytes))
    }

    /// Device bytes rendered from `nbytes` of stream audio, at most.
    pub(super) fn to_device_bytes(&self, nbytes: usize) -> usize {
        self.resampler.as_ref().map_or(nbytes, |r| r.result(nbytes))
    }

    fn volume_applied_here(&self) -> bool {
        self.map != self.device.map
    }

    /// Returns up to one pool block of device audio from the head of the
    /// render queue, together with the volume the device has to apply.
    ///
    /// Pulls from the producer until the render queue is readable. A corked
    /// stream or a producer without data yields silence. The read index is
    /// not moved; call [`drop_bytes`](Self::drop_bytes) with what was consumed.
    ///
    /// # Panics
    ///
    /// Panics if `length` is not a multiple of the device frame size.
    pub fn peek(&mut self, length: usize) -> Result<(MemChunk, ChannelVolumes), StreamError> {
        let dev = self.device.spec;
        assert!(
            dev.is_frame_aligned(length),
            "peek of {length} bytes is not frame aligned"
        );

        if self.rewrite.is_pending() {
            self.process_rewind(0);
        }

        let block_max_device = dev.frame_align(self.pool.block_size_max()).max(dev.frame_size());
        let block_max_input = match &self.resampler {
            Some(r) => r.max_block_size(),
            None => self.spec.frame_align(self.pool.block_size_max()).max(self.spec.frame_size()),
        };

        let slength = if length == 0 {
            dev.frame_align(CONVERT_BUFFER_LENGTH).max(dev.frame_size())
        } else {
            length
        }
        .min(block_max_device);

        let ilength_full = match &self.resampler {
            Some(r) => match r.request(slength) {
                0 => self.spec.frame_align(CONVERT_BUFFER_LENGTH).max(self.spec.frame_size()),
                n => n,
            },
            None => slength,
        };
        let ilength = ilength_full.min(block_max_input);

        let adjust_here = self.volume_applied_here();
        let volume_is_norm = self.soft_volume.is_norm() && !self.muted;

        while !self.render.is_readable() {
            let popped = if self.state == StreamState::Corked {
                None
            } else if let Some(pending) = self.pending.take() {
                Some(pending)
            } else {
                let chunk = self.producer.pop(ilength)?.filter(|c| !c.is_empty());
                if let Some(chunk) = &chunk {
                    if !self.spec.is_frame_aligned(chunk.len()) {
                        return Err(crate::error::ProducerError::failed(format!(
                            "{} bytes is not a whole number of frames",
                            chunk.len()
                        ))
                        .into());
                    }
                }
                chunk
            };

            let Some(mut remaining) = popped else {
                self.render.seek(slength as i64, SeekMode::Relative);
                self.note_silence(ilength_full, slength);
                break;
            };

            while !remaining.is_empty() {
                let n = remaining.len().min(block_max_input);
                // Audio the pool could not take stays pending for the next pass.
                let rendered = match self.render_piece(remaining.slice(0, n), adjust_here && !volume_is_norm) {
                    Ok(rendered) => rendered,
                    Err(e) => {
                        tracing::debug!(stream = %self.id, pending = remaining.len(), error = %e, "Keeping audio for next pass");
                        self.pending = Some(remaining);
                        return Err(e.into());
                    }
                };
                remaining.advance(n);

                self.underrun_for = Some(0);
                self.underrun_for_device = 0;
                self.playing_for += n;
                self.drained.store(false, Ordering::Release);

                if !rendered.is_empty() {
                    let pushed = self.render.push_align(&rendered);
                    debug_assert!(pushed.is_ok(), "render queue rejected push: {pushed:?}");
                    if let Err(e) = pushed {
                        tracing::error!(stream = %self.id, error = %e, "Render queue overflow");
                    }
                }
            }
        }

        let mut chunk = self
            .render
            .peek()
            .unwrap_or_else(|| MemChunk::silence(dev.format, slength));
        if chunk.len() > block_max_device {
            chunk.truncate(block_max_device);
        }
        self.last_peek_len = chunk.len();

        let volume = if adjust_here {
            ChannelVolumes::norm(dev.channels)
        } else if self.muted {
            ChannelVolumes::muted(dev.channels)
        } else {
            self.soft_volume
        };

        tracing::trace!(stream = %self.id, length, peeked = chunk.len(), "Peeked render queue");
        Ok((chunk, volume))
    }

    /// Applies soft volume if needed and converts one piece of stream audio.
    ///
    /// Leaves the stream untouched on failure.
    fn render_piece(&mut self, mut piece: MemChunk, adjust: bool) -> Result<MemChunk, MemPoolError> {
        if adjust {
            let data = piece.make_writable(&self.pool)?;
            if self.muted {
                format::silence(self.spec.format, data);
            } else {
                format::apply_volume(self.spec.format, self.spec.channels, data, &self.soft_volume);
            }
        }
        match &mut self.resampler {
            Some(r) => r.run(&piece),
            None => Ok(piece),
        }
    }

    fn note_silence(&mut self, ilength_full: usize, slength: usize) {
        self.playing_for = 0;
        if let Some(underrun_for) = self.underrun_for.as_mut() {
            if *underrun_for == 0 && self.state == StreamState::Running {
                tracing::debug!(stream = %self.id, "Stream underrun");
                self.underrun_started = true;
                emit(self.events.as_ref(), StreamEvent::Underrun { stream: self.id });
            }
            *underrun_for += ilength_full;
            self.underrun_for_device += slength;
        }
        if self.state == StreamState::Running {
            self.drained.store(true, Ordering::Release);
        }
    }

    /// Consumes `nbytes` from the head of the render queue.
    ///
    /// `nbytes` must not exceed what the preceding [`peek`](Self::peek)
    /// returned.
    pub fn drop_bytes(&mut self, nbytes: usize) {
        debug_assert!(
            nbytes <= self.last_peek_len,
            "dropping {nbytes} bytes after peeking {}",
            self.last_peek_len
        );
        self.render.drop_bytes(nbytes);
        self.last_peek_len = self.last_peek_len.saturating_sub(nbytes);
    }

    /// Checks the stream against `left_to_play` bytes still queued in the
    /// device. Returns how many of those bytes are silence rendered for this
    /// stream, or 0 once all of them are.
    pub fn underrun_bytes(&mut self, left_to_play: usize) -> usize {
        let uf = self.underrun_for_device;
        if uf == 0 {
            return 0;
        }
        if uf >= left_to_play {
            self.process_underrun();
            return 0;
        }
        uf
    }

    /// Discards rewound audio once the producer confirmed it has nothing
    /// left. Returns true if the render queue was silenced.
    pub fn process_underrun(&mut self) -> bool {
        if self.render.is_readable() {
            return false;
        }
        if self.producer.process_underrun() {
            tracing::debug!(stream = %self.id, "Silencing render queue after underrun");
            self.render.silence();
            return true;
        }
        false
    }

    /// Moves the stream to `state`.
    ///
    /// Corking a running stream rewinds the device so mixed but unplayed
    /// audio is dropped. Uncorking rewinds without rewriting, so the stream
    /// is heard right away.
    pub fn set_state(&mut self, state: StreamState) {
        if state == self.state || self.state == StreamState::Unlinked {
            return;
        }
        let old = self.state;

        if old == StreamState::Running && state == StreamState::Corked {
            tracing::debug!(stream = %self.id, "Requesting rewind due to corking");
            self.request_rewind(0, true, true, false);
            self.state = state;
        } else if old == StreamState::Corked && state == StreamState::Running {
            self.underrun_for = None;
            self.underrun_for_device = 0;
            self.playing_for = 0;
            self.drained.store(false, Ordering::Release);
            self.state = state;
            tracing::debug!(stream = %self.id, "Requesting rewind due to uncorking");
            self.request_rewind(0, false, true, true);
        } else {
            self.state = state;
        }

        tracing::debug!(stream = %self.id, ?old, new = ?state, "Stream state changed");
        self.producer.state_changed(state);
    }

    /// User-facing volume of the stream.
    #[must_use]
    pub fn volume(&self) -> &ChannelVolumes {
        &self.volume
    }

    /// Attenuation layered on top of the volume.
    #[must_use]
    pub fn volume_factor(&self) -> &ChannelVolumes {
        &self.volume_factor
    }

    /// Gain actually applied, the product of volume and volume factor.
    #[must_use]
    pub fn soft_volume(&self) -> &ChannelVolumes {
        &self.soft_volume
    }

    /// Returns true if the stream is muted.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Sets the user-facing volume and recomputes the soft volume.
    pub fn set_volume(&mut self, volume: ChannelVolumes) {
        self.set_volumes(volume, self.volume_factor);
    }

    /// Sets the volume factor and recomputes the soft volume.
    pub fn set_volume_factor(&mut self, factor: ChannelVolumes) {
        self.set_volumes(self.volume, factor);
    }

    /// Sets volume and volume factor together.
    pub fn set_volumes(&mut self, volume: ChannelVolumes, factor: ChannelVolumes) {
        self.volume = volume;
        self.volume_factor = factor;
        self.set_soft_volume(volume.multiply(&factor));
    }

    /// Replaces the applied gain and rewrites already mixed audio with it.
    pub fn set_soft_volume(&mut self, volume: ChannelVolumes) {
        debug_assert_eq!(volume.channels(), self.spec.channels);
        if volume == self.soft_volume {
            return;
        }
        self.soft_volume = volume;
        self.request_rewind(0, true, false, false);
    }

    /// Mutes or unmutes and rewrites already mixed audio.
    pub fn set_soft_mute(&mut self, muted: bool) {
        if muted == self.muted {
            return;
        }
        self.muted = muted;
        self.request_rewind(0, true, false, false);
    }

    /// Time until audio handed to the stream now reaches the device mix.
    #[must_use]
    pub fn latency(&self) -> Duration {
        let mut latency = self.device.spec.bytes_to_duration(self.render.length());
        if let Some(r) = &self.resampler {
            let rate = f64::from(r.input_spec().rate);
            latency += Duration::from_secs_f64(r.delay_frames().max(0.0) / rate);
        }
        latency
    }

    /// Changes the producer's sample rate.
    ///
    /// Only streams created with the variable-rate flag can change rate.
    pub fn set_rate(&mut self, rate: u32) -> Result<(), ConfigurationError> {
        if !self.flags.variable_rate {
            return Err(ConfigurationError::NotVariableRate);
        }
        if rate == self.spec.rate {
            return Ok(());
        }
        SampleSpec::new(self.spec.format, rate, self.spec.channels).validate()?;
        if let Some(r) = &mut self.resampler {
            r.set_input_rate(rate)?;
        }
        tracing::debug!(stream = %self.id, from = self.spec.rate, to = rate, "Stream rate changed");
        self.spec.rate = rate;
        Ok(())
    }

    /// Moves the stream to another device.
    ///
    /// Rebuilds the resampler for the new device format and channel map,
    /// starts a fresh render queue and forgets pending rewinds.
    pub fn attach(&mut self, info: &DeviceInfo) -> Result<(), ConfigurationError> {
        let resampler = build_resampler(&self.pool, &self.spec, &self.map, info, self.method, self.flags)?;
        self.resampler = resampler;
        self.device = info.clone();
        self.render = render_queue(info, &self.pool);
        self.rewrite = Rewrite::Bytes(0);
        self.rewrite_flush = false;
        self.dont_rewind_render = false;
        self.device_rewind = RewindRequest::default();
        self.last_peek_len = 0;
        self.update_max_rewind(info.max_rewind);
        self.update_max_request(info.max_request);
        tracing::info!(stream = %self.id, device = %info.spec, "Stream attached to device");
        Ok(())
    }

    /// Updates how far back the device may rewind, in device bytes.
    pub fn update_max_rewind(&mut self, nbytes: usize) {
        self.device.max_rewind = nbytes;
        self.render.set_max_rewind(nbytes);
        let stream_bytes = self.to_stream_bytes(nbytes);
        self.producer.update_max_rewind(stream_bytes);
    }

    /// Updates the largest device request, in device bytes.
    pub fn update_max_request(&mut self, nbytes: usize) {
        self.device.max_request = nbytes;
        let stream_bytes = self.to_stream_bytes(nbytes);
        self.producer.update_max_request(stream_bytes);
    }
}

impl fmt::Debug for StreamAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamAdapter")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("state", &self.state)
            .field("muted", &self.muted)
            .field("render_length", &self.render.length())
            .field("resampler", &self.resampler)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapter::BufferedProducer;
    use crate::config::PoolConfig;
    use crate::error::ProducerError;
    use crate::sample::{ChannelPosition, SampleFormat, Volume};
    use crate::StreamAdapterBuilder;

    pub(crate) fn device(spec: SampleSpec, max_rewind: usize) -> DeviceInfo {
        let mut info = DeviceInfo::new(spec, ChannelMap::default_for(spec.channels).unwrap());
        info.max_rewind = max_rewind;
        info.max_request = max_rewind.max(spec.frame_size());
        info.resample_method = ResampleMethod::Trivial;
        info
    }

    pub(crate) fn s16(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    pub(crate) fn read_s16(data: &[u8]) -> Vec<i16> {
        data.chunks_exact(2)
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .collect()
    }

    fn running(builder: StreamAdapterBuilder, info: &DeviceInfo, producer: BufferedProducer) -> StreamAdapter {
        let pool = MemPool::new(&PoolConfig::default());
        let mut adapter = builder
            .build(StreamId::new(1), info, &pool, Box::new(producer))
            .unwrap();
        adapter.set_state(StreamState::Running);
        adapter
    }

    #[test]
    fn test_no_resampler_for_matching_stream() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 48000, 2);
        let adapter = running(
            StreamAdapterBuilder::new(spec),
            &device(spec, 0),
            BufferedProducer::new(spec),
        );
        assert!(adapter.resampler().is_none());
    }

    #[test]
    fn test_peek_passes_data_through() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 48000, 1);
        let producer = BufferedProducer::new(spec);
        producer.push_bytes(&s16(&[1, 2, 3, 4])).unwrap();
        let mut adapter = running(StreamAdapterBuilder::new(spec), &device(spec, 0), producer);

        let (chunk, volume) = adapter.peek(8).unwrap();
        assert_eq!(read_s16(chunk.as_bytes()), vec![1, 2, 3, 4]);
        assert!(volume.is_norm());
        adapter.drop_bytes(8);
        assert_eq!(adapter.render_length(), 0);
    }

    #[test]
    fn test_peek_without_data_is_silence() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 48000, 2);
        let mut adapter = running(
            StreamAdapterBuilder::new(spec),
            &device(spec, 0),
            BufferedProducer::new(spec),
        );
        let (chunk, _) = adapter.peek(64).unwrap();
        assert_eq!(chunk.len(), 64);
        assert!(format::is_silence(spec.format, chunk.as_bytes()));
        assert!(adapter.is_drained());
    }

    #[test]
    fn test_underrun_reported_once() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
        let producer = BufferedProducer::new(spec);
        let writer = producer.clone();
        writer.push_bytes(&[1; 16]).unwrap();
        let mut adapter = running(StreamAdapterBuilder::new(spec), &device(spec, 0), producer);

        let (chunk, _) = adapter.peek(16).unwrap();
        adapter.drop_bytes(chunk.len());
        assert!(!adapter.take_underrun());

        for _ in 0..3 {
            let (chunk, _) = adapter.peek(16).unwrap();
            adapter.drop_bytes(chunk.len());
        }
        assert!(adapter.take_underrun());
        assert!(!adapter.take_underrun());
    }

    #[test]
    fn test_corked_stream_plays_silence() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
        let producer = BufferedProducer::new(spec);
        producer.push_bytes(&s16(&[100; 8])).unwrap();
        let mut adapter = running(StreamAdapterBuilder::new(spec), &device(spec, 0), producer.clone());
        adapter.set_state(StreamState::Corked);

        let (chunk, _) = adapter.peek(16).unwrap();
        assert!(format::is_silence(spec.format, chunk.as_bytes()));
        assert_eq!(producer.len(), 16);
    }

    #[test]
    fn test_start_corked() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
        let pool = MemPool::default();
        let adapter = StreamAdapterBuilder::new(spec)
            .start_corked(true)
            .build(StreamId::new(1), &device(spec, 0), &pool, Box::new(BufferedProducer::new(spec)))
            .unwrap();
        assert_eq!(adapter.state(), StreamState::Init);
        assert_eq!(adapter.initial_state(), StreamState::Corked);
    }

    #[test]
    fn test_volume_deferred_to_device_when_maps_match() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 2);
        let producer = BufferedProducer::new(spec);
        producer.push_bytes(&s16(&[1000; 8])).unwrap();
        let half = ChannelVolumes::uniform(2, Volume::from_linear(0.5));
        let mut adapter = running(
            StreamAdapterBuilder::new(spec).volume(half),
            &device(spec, 0),
            producer,
        );
        let (chunk, volume) = adapter.peek(16).unwrap();
        assert_eq!(read_s16(chunk.as_bytes()), vec![1000; 8]);
        assert_eq!(volume, half);
    }

    #[test]
    fn test_muted_with_matching_maps_returns_muted_volume() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 2);
        let producer = BufferedProducer::new(spec);
        producer.push_bytes(&s16(&[1000; 8])).unwrap();
        let mut adapter = running(StreamAdapterBuilder::new(spec).muted(true), &device(spec, 0), producer);
        let (_, volume) = adapter.peek(16).unwrap();
        assert!(volume.is_muted());
    }

    #[test]
    fn test_volume_applied_before_remap() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 2);
        let dev_spec = SampleSpec::new(SampleFormat::S16NE, 8000, 3);
        let mut info = device(dev_spec, 0);
        info.map = ChannelMap::new(vec![
            ChannelPosition::FrontLeft,
            ChannelPosition::FrontRight,
            ChannelPosition::Lfe,
        ])
        .unwrap();
        let producer = BufferedProducer::new(spec);
        producer.push_bytes(&s16(&[1000, 2000, 1000, 2000])).unwrap();

        let half = ChannelVolumes::uniform(2, Volume::from_linear(0.5));
        let mut adapter = running(StreamAdapterBuilder::new(spec).volume(half), &info, producer);
        let (chunk, volume) = adapter.peek(12).unwrap();
        assert!(volume.is_norm());
        let out = read_s16(chunk.as_bytes());
        assert!((out[0] - 500).abs() <= 1, "{out:?}");
        assert!((out[1] - 1000).abs() <= 1, "{out:?}");
    }

    #[test]
    fn test_set_rate_requires_variable_rate() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
        let mut adapter = running(
            StreamAdapterBuilder::new(spec),
            &device(SampleSpec::new(SampleFormat::S16NE, 48000, 1), 0),
            BufferedProducer::new(spec),
        );
        assert_eq!(adapter.set_rate(16000), Err(ConfigurationError::NotVariableRate));
        assert_eq!(adapter.spec().rate, 8000);
        assert_eq!(adapter.resampler().unwrap().input_spec().rate, 8000);
    }

    #[test]
    fn test_set_rate_updates_resampler() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
        let mut adapter = running(
            StreamAdapterBuilder::new(spec).variable_rate(true),
            &device(SampleSpec::new(SampleFormat::S16NE, 48000, 1), 0),
            BufferedProducer::new(spec),
        );
        adapter.set_rate(16000).unwrap();
        assert_eq!(adapter.spec().rate, 16000);
        assert_eq!(adapter.resampler().unwrap().input_spec().rate, 16000);
    }

    #[test]
    fn test_latency_counts_render_queue() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
        let producer = BufferedProducer::new(spec);
        producer.push_bytes(&[0; 1600]).unwrap();
        let mut adapter = running(StreamAdapterBuilder::new(spec), &device(spec, 0), producer);
        adapter.peek(1600).unwrap();
        assert_eq!(adapter.latency(), Duration::from_millis(100));
    }

    #[test]
    fn test_attach_rebuilds_resampler() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 48000, 2);
        let mut adapter = running(
            StreamAdapterBuilder::new(spec),
            &device(spec, 0),
            BufferedProducer::new(spec),
        );
        assert!(adapter.resampler().is_none());

        let other = device(SampleSpec::new(SampleFormat::F32NE, 44100, 2), 4096);
        adapter.attach(&other).unwrap();
        let resampler = adapter.resampler().unwrap();
        assert_eq!(resampler.output_spec(), &other.spec);
        assert_eq!(adapter.device_info().max_rewind, 4096);
    }

    #[test]
    fn test_producer_fault_is_reported() {
        struct Broken;
        impl StreamProducer for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn pop(&mut self, _nbytes: usize) -> Result<Option<MemChunk>, ProducerError> {
                Err(ProducerError::failed("decoder crashed"))
            }
        }

        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
        let pool = MemPool::default();
        let mut adapter = StreamAdapterBuilder::new(spec)
            .build(StreamId::new(1), &device(spec, 0), &pool, Box::new(Broken))
            .unwrap();
        adapter.set_state(StreamState::Running);
        assert!(matches!(adapter.peek(16), Err(StreamError::Producer(_))));
    }

    #[test]
    fn test_misaligned_producer_chunk_is_a_fault() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 2);
        struct Odd;
        impl StreamProducer for Odd {
            fn name(&self) -> &str {
                "odd"
            }
            fn pop(&mut self, _nbytes: usize) -> Result<Option<MemChunk>, ProducerError> {
                Ok(Some(MemChunk::from_vec(vec![0; 6])))
            }
        }
        let pool = MemPool::default();
        let mut adapter = StreamAdapterBuilder::new(spec)
            .build(StreamId::new(1), &device(spec, 0), &pool, Box::new(Odd))
            .unwrap();
        adapter.set_state(StreamState::Running);
        assert!(matches!(adapter.peek(16), Err(StreamError::Producer(_))));
    }

    #[test]
    fn test_exhausted_pool_keeps_popped_audio() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
        let info = device(SampleSpec::new(SampleFormat::S16NE, 48000, 2), 0);
        let pool = MemPool::new(&PoolConfig {
            max_blocks: 8,
            ..Default::default()
        });
        let producer = BufferedProducer::new(spec);
        let samples: Vec<i16> = (1..=64).map(|i| i * 100).collect();
        producer.push_bytes(&s16(&samples)).unwrap();

        let mut adapter = StreamAdapterBuilder::new(spec)
            .build(StreamId::new(1), &info, &pool, Box::new(producer.clone()))
            .unwrap();
        adapter.set_state(StreamState::Running);

        let mut held = Vec::new();
        while let Ok(block) = pool.allocate(16) {
            held.push(block);
        }

        assert!(matches!(adapter.peek(4 * 256), Err(StreamError::Resource(_))));
        assert_eq!(adapter.render_length(), 0);
        assert!(!adapter.is_drained());

        drop(held);
        let (chunk, _) = adapter.peek(4 * 256).unwrap();
        let out = read_s16(chunk.as_bytes());
        assert_eq!(&out[..2], &[100, 100]);
        assert!(out.chunks_exact(2).all(|f| f[0] == f[1]));
    }

    #[test]
    fn test_volume_channel_count_checked() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 2);
        let pool = MemPool::default();
        let result = StreamAdapterBuilder::new(spec)
            .volume(ChannelVolumes::norm(3))
            .build(StreamId::new(1), &device(spec, 0), &pool, Box::new(BufferedProducer::new(spec)));
        assert!(result.is_err());
    }
}
