//! Capture streams.
//!
//! A [`CaptureAdapter`] receives every block a device renders, converts it
//! to the capture stream's format and hands it to a [`CaptureConsumer`].
//! The device may still rewrite what it rendered, so audio for consumers
//! that cannot rewind waits in a delay queue as deep as the device's rewind
//! window before it is forwarded.
//!
//! ```text
//! device block → delay queue → [soft volume] → resampler.run → consumer
//! ```

mod consumer;

pub use consumer::{CaptureConsumer, ChannelConsumer};

use std::fmt;
use std::time::Duration;

use crate::adapter::{DeviceInfo, StreamId, StreamState};
use crate::config::RENDER_QUEUE_MAX_LENGTH;
use crate::error::{ConfigurationError, MemPoolError};
use crate::format;
use crate::memory::{MemBlockQueue, MemChunk, MemPool, SeekMode};
use crate::resampler::{Resampler, ResamplerFlags};
use crate::sample::{ChannelMap, ChannelVolumes, SampleSpec};

/// A capture stream attached to a device.
pub struct CaptureAdapter {
    id: StreamId,
    spec: SampleSpec,
    map: ChannelMap,
    device: DeviceInfo,
    pool: MemPool,
    resampler: Option<Resampler>,
    delay: MemBlockQueue,
    soft_volume: ChannelVolumes,
    muted: bool,
    state: StreamState,
    consumer: Box<dyn CaptureConsumer>,
}

impl CaptureAdapter {
    /// Creates a capture stream delivering `spec` audio from `device`.
    ///
    /// Missing channel maps default to the standard layout. Uses the
    /// device's resample method.
    pub fn new(
        id: StreamId,
        spec: SampleSpec,
        map: Option<ChannelMap>,
        device: &DeviceInfo,
        pool: &MemPool,
        consumer: Box<dyn CaptureConsumer>,
    ) -> Result<Self, ConfigurationError> {
        spec.validate()?;
        let map = match map {
            Some(map) => {
                map.check_compatible(spec.channels)?;
                map
            }
            None => ChannelMap::default_for(spec.channels)?,
        };
        let resampler = if spec == device.spec && map == device.map {
            None
        } else {
            Some(Resampler::new(
                pool,
                device.spec,
                Some(&device.map),
                spec,
                Some(&map),
                device.resample_method,
                ResamplerFlags::default(),
            )?)
        };
        let silence = MemChunk::silence(
            device.spec.format,
            device.spec.frame_align(pool.block_size_max()).max(device.spec.frame_size()),
        );
        let delay = MemBlockQueue::new(
            "delay",
            RENDER_QUEUE_MAX_LENGTH,
            device.spec.frame_size(),
            0,
            0,
            silence,
        );

        tracing::info!(
            stream = %id,
            consumer = consumer.name(),
            spec = %spec,
            "Created capture adapter"
        );

        Ok(Self {
            id,
            spec,
            map,
            device: device.clone(),
            pool: pool.clone(),
            resampler,
            delay,
            soft_volume: ChannelVolumes::norm(device.spec.channels),
            muted: false,
            state: StreamState::Init,
            consumer,
        })
    }

    /// Id of the stream.
    #[must_use]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Format delivered to the consumer.
    #[must_use]
    pub fn spec(&self) -> &SampleSpec {
        &self.spec
    }

    /// Channel positions delivered to the consumer.
    #[must_use]
    pub fn channel_map(&self) -> &ChannelMap {
        &self.map
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// The converter between device and consumer, if one is needed.
    #[must_use]
    pub fn resampler(&self) -> Option<&Resampler> {
        self.resampler.as_ref()
    }

    /// Device bytes held back in the delay queue.
    #[must_use]
    pub fn delayed_bytes(&self) -> usize {
        self.delay.length()
    }

    /// Moves the stream to `state`. A corked capture stream drops audio.
    pub fn set_state(&mut self, state: StreamState) {
        if self.state == StreamState::Unlinked || self.state == state {
            return;
        }
        tracing::debug!(stream = %self.id, old = ?self.state, new = ?state, "Capture state changed");
        self.state = state;
    }

    /// Sets the gain applied before conversion.
    ///
    /// A volume with a channel count other than the device's is applied as
    /// its average.
    pub fn set_soft_volume(&mut self, volume: ChannelVolumes) {
        let channels = self.device.spec.channels;
        self.soft_volume = if volume.channels() == channels {
            volume
        } else {
            ChannelVolumes::uniform(channels, volume.average())
        };
    }

    /// Mutes or unmutes.
    pub fn set_soft_mute(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Returns true if the stream is muted.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Updates how far back the device may rewind, in device bytes.
    pub fn update_max_rewind(&mut self, nbytes: usize) {
        self.device.max_rewind = nbytes;
    }

    fn delay_limit(&self) -> usize {
        if self.consumer.supports_rewind() {
            0
        } else {
            self.device.spec.frame_align(self.device.max_rewind)
        }
    }

    /// Takes one block rendered by the device.
    ///
    /// Audio older than the rewind window is converted and forwarded. On
    /// pool exhaustion the unforwarded audio stays queued for the next call.
    pub fn push(&mut self, chunk: &MemChunk) -> Result<(), MemPoolError> {
        if self.state != StreamState::Running {
            return Ok(());
        }

        if self.delay.push(chunk).is_err() {
            tracing::debug!(stream = %self.id, "Delay queue overflow");
            self.delay.seek(chunk.len() as i64, SeekMode::Relative);
        }

        let limit = self.delay_limit();
        let volume_is_norm = self.soft_volume.is_norm() && !self.muted;
        let dev = self.device.spec;

        while self.delay.length() > limit {
            let length = self.delay.length() - limit;
            let Some(mut block) = self.delay.peek() else {
                break;
            };
            if block.len() > length {
                block.truncate(length);
            }
            if let Some(r) = &self.resampler {
                let max = r.max_block_size();
                if block.len() > max {
                    block.truncate(max);
                }
            }
            let n = block.len();
            if n == 0 {
                break;
            }

            if !volume_is_norm {
                let data = block.make_writable(&self.pool)?;
                if self.muted {
                    format::silence(dev.format, data);
                } else {
                    format::apply_volume(dev.format, dev.channels, data, &self.soft_volume);
                }
            }

            match &mut self.resampler {
                Some(r) => {
                    let out = r.run(&block)?;
                    if !out.is_empty() {
                        self.consumer.push(&out);
                    }
                }
                None => self.consumer.push(&block),
            }
            self.delay.drop_bytes(n);
        }
        Ok(())
    }

    /// Follows a device rewind of `nbytes` device bytes.
    ///
    /// Audio still in the delay queue is replaced by what the device renders
    /// next. Consumers that can rewind are told to take back the converted
    /// amount.
    pub fn process_rewind(&mut self, nbytes: usize) {
        if nbytes == 0 {
            return;
        }
        if self.consumer.supports_rewind() {
            debug_assert_eq!(self.delay.length(), 0);
            let n = self.resampler.as_ref().map_or(nbytes, |r| r.result(nbytes));
            tracing::debug!(stream = %self.id, nbytes = n, "Have to rewind bytes on consumer");
            if n > 0 {
                self.consumer.process_rewind(n);
            }
            if let Some(r) = &mut self.resampler {
                r.reset();
            }
        } else {
            let n = nbytes.min(self.delay.length());
            self.delay.seek(-(n as i64), SeekMode::Relative);
        }
    }

    /// Time until audio rendered now reaches the consumer.
    #[must_use]
    pub fn latency(&self) -> Duration {
        let mut latency = self.device.spec.bytes_to_duration(self.delay.length());
        if let Some(r) = &self.resampler {
            let rate = f64::from(r.input_spec().rate);
            latency += Duration::from_secs_f64(r.delay_frames().max(0.0) / rate);
        }
        latency
    }
}

impl fmt::Debug for CaptureAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureAdapter")
            .field("id", &self.id)
            .field("consumer", &self.consumer.name())
            .field("spec", &self.spec)
            .field("state", &self.state)
            .field("delayed", &self.delay.length())
            .finish_non_exhaustive()
    }
}
