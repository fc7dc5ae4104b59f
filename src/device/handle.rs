//! Control-side handle to a running device.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, TrySendError};
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::message::DeviceMessage;
use super::mixer::DeviceCore;
use super::output::DeviceOutput;
use super::stats::{DeviceState, DeviceStats};
use super::thread;
use crate::adapter::{DeviceInfo, LatencyRange, StreamAdapter, StreamId, StreamProducer, StreamState};
use crate::builder::StreamAdapterBuilder;
use crate::capture::{CaptureAdapter, CaptureConsumer};
use crate::config::DeviceConfig;
use crate::error::{ConfigurationError, StreamMixerError};
use crate::event::{emit, EventCallback, StreamEvent};
use crate::memory::MemPool;
use crate::sample::{ChannelMap, ChannelVolumes, SampleSpec};

/// Direction of a linked stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Audio mixed into the device.
    Playback,
    /// Audio taken from what the device renders.
    Capture,
}

/// Control-side view of a linked stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Id of the stream.
    pub id: StreamId,
    /// Name used in logs.
    pub name: String,
    /// Direction.
    pub kind: StreamKind,
    /// Format of the stream.
    pub spec: SampleSpec,
    /// Last volume set.
    pub volume: ChannelVolumes,
    /// Last volume factor set.
    pub volume_factor: ChannelVolumes,
    /// Last mute state set.
    pub muted: bool,
    /// Last cork state set.
    pub corked: bool,
}

struct StreamEntry {
    info: StreamInfo,
    drained: Option<Arc<AtomicBool>>,
}

impl StreamEntry {
    fn playback(adapter: &StreamAdapter) -> Self {
        Self {
            info: StreamInfo {
                id: adapter.id(),
                name: adapter.name().to_string(),
                kind: StreamKind::Playback,
                spec: *adapter.spec(),
                volume: *adapter.volume(),
                volume_factor: *adapter.volume_factor(),
                muted: adapter.is_muted(),
                corked: adapter.initial_state() == StreamState::Corked,
            },
            drained: Some(adapter.drained_flag()),
        }
    }

    fn capture(capture: &CaptureAdapter, name: &str) -> Self {
        let channels = capture.spec().channels;
        Self {
            info: StreamInfo {
                id: capture.id(),
                name: name.to_string(),
                kind: StreamKind::Capture,
                spec: *capture.spec(),
                volume: ChannelVolumes::norm(channels),
                volume_factor: ChannelVolumes::norm(channels),
                muted: capture.is_muted(),
                corked: false,
            },
            drained: None,
        }
    }
}

/// Handle to a device running on its own real-time thread.
///
/// The device thread owns every linked stream. All changes made through
/// the handle travel as [`DeviceMessage`]s over a bounded queue; calls
/// that need an answer await the device's reply, the rest return as soon
/// as the message is queued.
///
/// # Lifecycle
///
/// 1. Created by [`spawn`](Self::spawn)
/// 2. Streams are linked, changed and unlinked while it runs
/// 3. Call [`stop`](Self::stop) for graceful shutdown
/// 4. Dropping the handle also stops the device (but prefer explicit `stop()`)
///
/// # Example
///
/// ```ignore
/// let device = DeviceHandle::spawn(DeviceConfig::default(), Box::new(NullOutput::new()), None)?;
/// let id = device.link(StreamAdapterBuilder::new(spec), Box::new(producer)).await?;
/// device.set_mute(id, true)?;
/// device.stop().await?;
/// ```
pub struct DeviceHandle {
    name: String,
    info: DeviceInfo,
    pool: MemPool,
    sender: Sender<DeviceMessage>,
    killed: Receiver<StreamId>,
    streams: Mutex<HashMap<StreamId, StreamEntry>>,
    state: Arc<DeviceState>,
    next_id: AtomicU32,
    events: Option<EventCallback>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceHandle {
    /// Starts a device writing to `output`.
    ///
    /// The device buffer is `buffer_duration` long and is also the rewind
    /// window handed to every stream.
    pub fn spawn(
        config: DeviceConfig,
        output: Box<dyn DeviceOutput>,
        events: Option<EventCallback>,
    ) -> Result<Self, StreamMixerError> {
        config.validate()?;
        let map = config.resolved_channel_map()?;
        let pool = MemPool::new(&config.pool);
        let buffer_bytes = config.buffer_bytes();
        let period_bytes = config.period_bytes();

        let mut info = DeviceInfo::new(config.spec, map);
        info.max_rewind = buffer_bytes;
        info.max_request = buffer_bytes;
        info.latency = LatencyRange::Fixed(config.buffer_duration);
        info.resample_method = config.resample_method;

        let core = DeviceCore::new(
            config.name.clone(),
            info.clone(),
            pool.clone(),
            period_bytes,
            events.clone(),
        );
        let state = core.shared_state();
        let period = config.spec.bytes_to_duration(core.period_bytes());

        let (sender, messages) = crossbeam::channel::bounded(config.message_queue_capacity.max(1));
        let (killed_tx, killed) = crossbeam::channel::unbounded();
        let output_name = output.name().to_string();

        let thread = std::thread::Builder::new()
            .name(format!("{}-rt", config.name))
            .spawn(move || thread::run(core, output, messages, killed_tx, period))
            .map_err(StreamMixerError::Spawn)?;

        tracing::info!(
            device = %config.name,
            output = %output_name,
            spec = %config.spec,
            buffer_bytes,
            period_bytes,
            "Device started"
        );

        Ok(Self {
            name: config.name,
            info,
            pool,
            sender,
            killed,
            streams: Mutex::new(HashMap::new()),
            state,
            next_id: AtomicU32::new(1),
            events,
            thread: Some(thread),
        })
    }

    /// Name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Format, map and buffer limits streams are created against.
    #[must_use]
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Block pool shared by the device's streams.
    #[must_use]
    pub fn pool(&self) -> &MemPool {
        &self.pool
    }

    /// Returns `true` if the device is still running.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Returns current device statistics.
    pub fn stats(&self) -> DeviceStats {
        self.state.snapshot()
    }

    fn ensure_running(&self) -> Result<(), StreamMixerError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(StreamMixerError::DeviceStopped)
        }
    }

    fn next_stream_id(&self) -> StreamId {
        StreamId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn post(&self, msg: DeviceMessage) -> Result<(), StreamMixerError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(msg) => {
                tracing::warn!(device = %self.name, kind = msg.kind(), "Device message queue full");
                StreamMixerError::QueueFull
            }
            TrySendError::Disconnected(_) => StreamMixerError::DeviceStopped,
        })
    }

    /// Forgets streams the device killed.
    fn reap(&self) {
        let killed: Vec<StreamId> = self.killed.try_iter().collect();
        if killed.is_empty() {
            return;
        }
        let mut streams = self.streams.lock();
        for id in killed {
            if streams.remove(&id).is_some() {
                tracing::debug!(device = %self.name, stream = %id, "Forgot killed stream");
            }
        }
    }

    /// Linked streams, ordered by id.
    pub fn streams(&self) -> Vec<StreamInfo> {
        self.reap();
        let mut streams: Vec<StreamInfo> = self.streams.lock().values().map(|e| e.info.clone()).collect();
        streams.sort_by_key(|s| s.id);
        streams
    }

    /// One linked stream.
    pub fn stream(&self, id: StreamId) -> Option<StreamInfo> {
        self.reap();
        self.streams.lock().get(&id).map(|e| e.info.clone())
    }

    /// Creates a playback stream from `builder` and links it.
    ///
    /// Returns once the device thread mixes the stream.
    pub async fn link(
        &self,
        builder: StreamAdapterBuilder,
        producer: Box<dyn StreamProducer>,
    ) -> Result<StreamId, StreamMixerError> {
        self.ensure_running()?;
        self.reap();

        let id = self.next_stream_id();
        let adapter = builder.build(id, &self.info, &self.pool, producer)?;
        self.streams.lock().insert(id, StreamEntry::playback(&adapter));

        let (reply, ack) = oneshot::channel();
        if let Err(e) = self.post(DeviceMessage::AddAdapter {
            adapter: Box::new(adapter),
            reply,
        }) {
            self.streams.lock().remove(&id);
            return Err(e);
        }
        ack.await.map_err(|_| StreamMixerError::DeviceStopped)?;

        emit(self.events.as_ref(), StreamEvent::StreamLinked { stream: id });
        Ok(id)
    }

    /// Creates a capture stream delivering `spec` audio to `consumer`.
    pub async fn add_capture(
        &self,
        spec: SampleSpec,
        map: Option<ChannelMap>,
        consumer: Box<dyn CaptureConsumer>,
    ) -> Result<StreamId, StreamMixerError> {
        self.ensure_running()?;
        self.reap();

        let id = self.next_stream_id();
        let name = consumer.name().to_string();
        let capture = CaptureAdapter::new(id, spec, map, &self.info, &self.pool, consumer)?;
        self.streams.lock().insert(id, StreamEntry::capture(&capture, &name));

        let (reply, ack) = oneshot::channel();
        if let Err(e) = self.post(DeviceMessage::AddCapture {
            capture: Box::new(capture),
            reply,
        }) {
            self.streams.lock().remove(&id);
            return Err(e);
        }
        ack.await.map_err(|_| StreamMixerError::DeviceStopped)?;

        emit(self.events.as_ref(), StreamEvent::StreamLinked { stream: id });
        Ok(id)
    }

    /// Unlinks a stream.
    ///
    /// The stream is forgotten first, then the device thread hands it back
    /// and it is freed here.
    pub async fn unlink(&self, id: StreamId) -> Result<(), StreamMixerError> {
        self.reap();
        let entry = self
            .streams
            .lock()
            .remove(&id)
            .ok_or(StreamMixerError::UnknownStream { id })?;
        let kind = entry.info.kind;

        let found = match kind {
            StreamKind::Playback => {
                let (reply, rx) = oneshot::channel();
                if let Err(e) = self.post(DeviceMessage::RemoveAdapter { id, reply }) {
                    self.streams.lock().insert(id, entry);
                    return Err(e);
                }
                rx.await.map_err(|_| StreamMixerError::DeviceStopped)?.is_some()
            }
            StreamKind::Capture => {
                let (reply, rx) = oneshot::channel();
                if let Err(e) = self.post(DeviceMessage::RemoveCapture { id, reply }) {
                    self.streams.lock().insert(id, entry);
                    return Err(e);
                }
                rx.await.map_err(|_| StreamMixerError::DeviceStopped)?.is_some()
            }
        };

        if found {
            tracing::info!(device = %self.name, stream = %id, ?kind, "Unlinked stream");
            emit(self.events.as_ref(), StreamEvent::StreamUnlinked { stream: id });
        }
        Ok(())
    }

    /// Unlinks every stream.
    pub async fn unlink_all(&self) -> Result<(), StreamMixerError> {
        let ids: Vec<StreamId> = self.streams.lock().keys().copied().collect();
        let results = join_all(ids.into_iter().map(|id| self.unlink(id))).await;
        for result in results {
            match result {
                Ok(()) | Err(StreamMixerError::UnknownStream { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn update<T>(
        &self,
        id: StreamId,
        f: impl FnOnce(&mut StreamInfo) -> Result<T, StreamMixerError>,
    ) -> Result<T, StreamMixerError> {
        self.ensure_running()?;
        self.reap();
        let mut streams = self.streams.lock();
        let entry = streams.get_mut(&id).ok_or(StreamMixerError::UnknownStream { id })?;
        f(&mut entry.info)
    }

    /// Sets a stream's volume, one entry per stream channel.
    pub fn set_volume(&self, id: StreamId, volume: ChannelVolumes) -> Result<(), StreamMixerError> {
        let factor = self.update(id, |info| {
            check_channels(info, &volume)?;
            info.volume = volume;
            Ok(info.volume_factor)
        })?;
        self.post(DeviceMessage::SetVolume { id, volume, factor })
    }

    /// Sets the attenuation applied on top of a stream's volume.
    pub fn set_volume_factor(&self, id: StreamId, factor: ChannelVolumes) -> Result<(), StreamMixerError> {
        let volume = self.update(id, |info| {
            check_channels(info, &factor)?;
            info.volume_factor = factor;
            Ok(info.volume)
        })?;
        self.post(DeviceMessage::SetVolume { id, volume, factor })
    }

    /// Mutes or unmutes a stream.
    pub fn set_mute(&self, id: StreamId, muted: bool) -> Result<(), StreamMixerError> {
        self.update(id, |info| {
            info.muted = muted;
            Ok(())
        })?;
        self.post(DeviceMessage::SetMute { id, muted })
    }

    /// Pauses or resumes a stream.
    pub fn set_corked(&self, id: StreamId, corked: bool) -> Result<(), StreamMixerError> {
        self.update(id, |info| {
            info.corked = corked;
            Ok(())
        })?;
        let state = if corked {
            StreamState::Corked
        } else {
            StreamState::Running
        };
        self.post(DeviceMessage::SetState { id, state })
    }

    /// Rewinds audio a playback stream already rendered.
    ///
    /// `nbytes` is in the stream's format; 0 means as much as possible.
    pub fn request_rewind(
        &self,
        id: StreamId,
        nbytes: usize,
        rewrite: bool,
        flush: bool,
    ) -> Result<(), StreamMixerError> {
        self.update(id, |_| Ok(()))?;
        self.post(DeviceMessage::RequestRewind {
            id,
            nbytes,
            rewrite,
            flush,
        })
    }

    /// Time until audio the stream produces now is heard.
    pub async fn latency(&self, id: StreamId) -> Result<Duration, StreamMixerError> {
        self.update(id, |_| Ok(()))?;
        let (reply, rx) = oneshot::channel();
        self.post(DeviceMessage::GetLatency { id, reply })?;
        rx.await
            .map_err(|_| StreamMixerError::DeviceStopped)?
            .ok_or(StreamMixerError::UnknownStream { id })
    }

    /// Changes the rate of a stream created with variable rate.
    pub async fn set_rate(&self, id: StreamId, rate: u32) -> Result<(), StreamMixerError> {
        self.update(id, |_| Ok(()))?;
        let (reply, rx) = oneshot::channel();
        self.post(DeviceMessage::SetRate { id, rate, reply })?;
        match rx.await.map_err(|_| StreamMixerError::DeviceStopped)? {
            Some(result) => {
                result?;
                self.update(id, |info| {
                    info.spec.rate = rate;
                    Ok(())
                })
            }
            None => Err(StreamMixerError::UnknownStream { id }),
        }
    }

    /// Returns true once a playback stream's producer ran dry and
    /// everything it rendered was played.
    pub fn is_drained(&self, id: StreamId) -> Result<bool, StreamMixerError> {
        self.reap();
        let streams = self.streams.lock();
        let entry = streams.get(&id).ok_or(StreamMixerError::UnknownStream { id })?;
        Ok(entry.drained.as_ref().is_some_and(|d| d.load(Ordering::Acquire)))
    }

    /// Gracefully stops the device.
    ///
    /// This will:
    /// 1. Unlink every stream
    /// 2. Stop the real-time thread
    /// 3. Wait for it to exit
    pub async fn stop(mut self) -> Result<(), StreamMixerError> {
        self.stop_internal().await
    }

    async fn stop_internal(&mut self) -> Result<(), StreamMixerError> {
        if !self.is_running() {
            return Ok(());
        }

        let unlinked = self.unlink_all().await;
        self.state.running.store(false, Ordering::SeqCst);

        if let Some(thread) = self.thread.take() {
            let sender = self.sender.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let _ = sender.send(DeviceMessage::Shutdown);
                thread.join()
            })
            .await;
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(_)) => tracing::error!(device = %self.name, "Device thread panicked"),
                Err(e) => tracing::error!(device = %self.name, error = %e, "Failed to join device thread"),
            }
        }

        tracing::info!(device = %self.name, "Device stopped");
        unlinked
    }
}

fn check_channels(info: &StreamInfo, volume: &ChannelVolumes) -> Result<(), StreamMixerError> {
    if volume.channels() != info.spec.channels {
        return Err(ConfigurationError::invalid_spec(format!(
            "volume has {} channels, stream {} has {}",
            volume.channels(),
            info.id,
            info.spec.channels
        ))
        .into());
    }
    Ok(())
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if self.state.running.swap(false, Ordering::SeqCst) {
            // Best effort; the thread also exits once the sender is gone.
            let _ = self.sender.try_send(DeviceMessage::Shutdown);
        }
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("name", &self.name)
            .field("spec", &self.info.spec)
            .field("running", &self.is_running())
            .field("streams", &self.streams.lock().len())
            .finish_non_exhaustive()
    }
}
