//! The mixing pass of a device.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::message::DeviceMessage;
use super::output::DeviceOutput;
use super::stats::{DeviceState, DeviceStats};
use crate::adapter::{DeviceInfo, RewindRequest, StreamAdapter, StreamId, StreamState};
use crate::capture::CaptureAdapter;
use crate::config::RENDER_QUEUE_MAX_LENGTH;
use crate::error::{MemPoolError, StreamError};
use crate::event::{emit, EventCallback, StreamEvent};
use crate::format::{self, MixInput};
use crate::memory::{MemBlockQueue, MemChunk, MemPool, SeekMode};
use crate::sample::ChannelVolumes;

/// Everything the device thread owns: linked streams, the device buffer
/// and the pending rewind.
///
/// Each [`iterate`](Self::iterate) rewinds if a stream asked for it, tops
/// the device buffer up to `max_rewind` bytes by mixing every linked
/// stream, and writes one period to the output. Streams are pulled in the
/// order they were linked.
///
/// The core is driven by the real-time thread of a
/// [`DeviceHandle`](super::DeviceHandle), but it has no threads of its own
/// and can be driven directly.
pub struct DeviceCore {
    name: String,
    info: DeviceInfo,
    pool: MemPool,
    period_bytes: usize,
    buffer_bytes: usize,
    adapters: Vec<Box<StreamAdapter>>,
    captures: Vec<Box<CaptureAdapter>>,
    buffer: MemBlockQueue,
    silence: MemChunk,
    rewind: RewindRequest,
    killed: Vec<StreamId>,
    state: Arc<DeviceState>,
    events: Option<EventCallback>,
}

impl DeviceCore {
    /// Creates a core mixing into `info.spec`.
    ///
    /// The device buffer holds `info.max_rewind` bytes, but at least one
    /// period.
    pub fn new(
        name: impl Into<String>,
        info: DeviceInfo,
        pool: MemPool,
        period_bytes: usize,
        events: Option<EventCallback>,
    ) -> Self {
        let spec = info.spec;
        let frame = spec.frame_size();
        let period_bytes = spec.frame_align(period_bytes).max(frame);
        let buffer_bytes = spec.frame_align(info.max_rewind).max(period_bytes);
        let silence = MemChunk::silence(spec.format, spec.frame_align(pool.block_size_max()).max(frame));
        let buffer = MemBlockQueue::new(
            "device",
            RENDER_QUEUE_MAX_LENGTH,
            frame,
            0,
            0,
            silence.clone(),
        );

        Self {
            name: name.into(),
            info,
            pool,
            period_bytes,
            buffer_bytes,
            adapters: Vec::new(),
            captures: Vec::new(),
            buffer,
            silence,
            rewind: RewindRequest::default(),
            killed: Vec::new(),
            state: Arc::new(DeviceState::new()),
            events,
        }
    }

    /// Name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The device streams are converted for.
    #[must_use]
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Bytes written to the output per iteration.
    #[must_use]
    pub fn period_bytes(&self) -> usize {
        self.period_bytes
    }

    /// Bytes kept mixed ahead of the output.
    #[must_use]
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }

    /// Mixed audio not yet written to the output.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.length()
    }

    /// Number of linked playback streams.
    #[must_use]
    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// Number of linked capture streams.
    #[must_use]
    pub fn capture_count(&self) -> usize {
        self.captures.len()
    }

    /// A linked playback stream.
    #[must_use]
    pub fn adapter(&self, id: StreamId) -> Option<&StreamAdapter> {
        self.adapters.iter().find(|a| a.id() == id).map(|a| &**a)
    }

    /// Rewind that will be processed at the next iteration.
    #[must_use]
    pub fn pending_rewind(&self) -> Option<usize> {
        self.rewind.pending()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> DeviceStats {
        self.state.snapshot()
    }

    pub(crate) fn shared_state(&self) -> Arc<DeviceState> {
        Arc::clone(&self.state)
    }

    /// Streams killed since the last call.
    pub fn take_killed(&mut self) -> Vec<StreamId> {
        std::mem::take(&mut self.killed)
    }

    fn adapter_mut(&mut self, id: StreamId) -> Option<&mut StreamAdapter> {
        self.adapters.iter_mut().find(|a| a.id() == id).map(|a| &mut **a)
    }

    fn capture_mut(&mut self, id: StreamId) -> Option<&mut CaptureAdapter> {
        self.captures.iter_mut().find(|c| c.id() == id).map(|c| &mut **c)
    }

    /// Links a playback stream. It is mixed from the next pass on.
    pub fn add_adapter(&mut self, mut adapter: Box<StreamAdapter>) {
        adapter.set_events(self.events.clone());
        let state = adapter.initial_state();
        adapter.set_state(state);
        if state == StreamState::Running {
            // Make the new stream audible without waiting for the buffer.
            adapter.request_rewind(0, false, true, true);
        }
        tracing::info!(
            device = %self.name,
            stream = %adapter.id(),
            name = adapter.name(),
            ?state,
            "Linked stream"
        );
        self.adapters.push(adapter);
        self.collect_rewind_requests();
    }

    /// Unlinks a playback stream and hands it back.
    ///
    /// What the stream contributed to the device buffer is rewritten.
    pub fn remove_adapter(&mut self, id: StreamId) -> Option<Box<StreamAdapter>> {
        let index = self.adapters.iter().position(|a| a.id() == id)?;
        let mut adapter = self.adapters.remove(index);
        if adapter.state() == StreamState::Running {
            self.rewind.request(self.buffer_bytes);
        }
        adapter.set_state(StreamState::Unlinked);
        tracing::info!(device = %self.name, stream = %id, "Unlinked stream");
        Some(adapter)
    }

    /// Links a capture stream.
    pub fn add_capture(&mut self, mut capture: Box<CaptureAdapter>) {
        capture.update_max_rewind(self.buffer_bytes);
        capture.set_state(StreamState::Running);
        tracing::info!(device = %self.name, stream = %capture.id(), "Linked capture stream");
        self.captures.push(capture);
    }

    /// Unlinks a capture stream and hands it back.
    pub fn remove_capture(&mut self, id: StreamId) -> Option<Box<CaptureAdapter>> {
        let index = self.captures.iter().position(|c| c.id() == id)?;
        let mut capture = self.captures.remove(index);
        capture.set_state(StreamState::Unlinked);
        tracing::info!(device = %self.name, stream = %id, "Unlinked capture stream");
        Some(capture)
    }

    /// Applies one control message. Returns false on
    /// [`DeviceMessage::Shutdown`].
    pub fn process_message(&mut self, msg: DeviceMessage) -> bool {
        tracing::trace!(device = %self.name, kind = msg.kind(), "Processing message");
        match msg {
            DeviceMessage::AddAdapter { adapter, reply } => {
                self.add_adapter(adapter);
                let _ = reply.send(());
            }
            DeviceMessage::RemoveAdapter { id, reply } => {
                // A dropped receiver hands the adapter back to us; it is freed here.
                let _ = reply.send(self.remove_adapter(id));
            }
            DeviceMessage::AddCapture { capture, reply } => {
                self.add_capture(capture);
                let _ = reply.send(());
            }
            DeviceMessage::RemoveCapture { id, reply } => {
                let _ = reply.send(self.remove_capture(id));
            }
            DeviceMessage::SetVolume { id, volume, factor } => {
                if let Some(adapter) = self.adapter_mut(id) {
                    adapter.set_volumes(volume, factor);
                } else if let Some(capture) = self.capture_mut(id) {
                    capture.set_soft_volume(volume.multiply(&factor));
                }
            }
            DeviceMessage::SetMute { id, muted } => {
                if let Some(adapter) = self.adapter_mut(id) {
                    adapter.set_soft_mute(muted);
                } else if let Some(capture) = self.capture_mut(id) {
                    capture.set_soft_mute(muted);
                }
            }
            DeviceMessage::SetState { id, state } => {
                if state == StreamState::Unlinked {
                    tracing::warn!(stream = %id, "Ignoring unlink through state change");
                } else if let Some(adapter) = self.adapter_mut(id) {
                    adapter.set_state(state);
                } else if let Some(capture) = self.capture_mut(id) {
                    capture.set_state(state);
                }
            }
            DeviceMessage::SetRate { id, rate, reply } => {
                let result = self.adapter_mut(id).map(|a| a.set_rate(rate));
                let _ = reply.send(result);
            }
            DeviceMessage::RequestRewind {
                id,
                nbytes,
                rewrite,
                flush,
            } => {
                if let Some(adapter) = self.adapter_mut(id) {
                    adapter.request_rewind(nbytes, rewrite, flush, false);
                }
            }
            DeviceMessage::GetLatency { id, reply } => {
                let latency = match self.adapter(id) {
                    Some(adapter) => Some(adapter.latency() + self.buffer_latency()),
                    None => self.captures.iter().find(|c| c.id() == id).map(|c| c.latency()),
                };
                let _ = reply.send(latency);
            }
            DeviceMessage::Shutdown => return false,
        }
        self.collect_rewind_requests();
        true
    }

    fn buffer_latency(&self) -> std::time::Duration {
        self.info.spec.bytes_to_duration(self.buffer.length())
    }

    fn collect_rewind_requests(&mut self) {
        for adapter in &mut self.adapters {
            if let Some(nbytes) = adapter.take_rewind_request() {
                self.rewind.request(nbytes);
            }
        }
    }

    /// Runs one device cycle: rewind, refill, write one period.
    pub fn iterate(&mut self, output: &mut dyn DeviceOutput) {
        if let Some(nbytes) = self.rewind.take(self.buffer_bytes) {
            self.process_rewind(nbytes);
        }

        self.fill();

        match self.next_period() {
            Ok(Some(chunk)) => self.write(output, &chunk),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(device = %self.name, error = %e, "Skipping period");
                self.buffer.drop_bytes(self.period_bytes.min(self.buffer.length()));
            }
        }

        let left = self.buffer.length();
        let unplayed = self.process_underruns(left);
        tracing::trace!(device = %self.name, left, unplayed, "Iteration done");
    }

    /// Seeks the device buffer back by up to `nbytes` and lets every stream
    /// follow. Returns the amount actually rewound.
    ///
    /// Streams are called even if nothing could be rewound, so pending
    /// rewrites are carried out.
    pub fn process_rewind(&mut self, nbytes: usize) -> usize {
        let nbytes = self.info.spec.frame_align(nbytes.min(self.buffer.length()));

        if nbytes > 0 {
            tracing::debug!(device = %self.name, nbytes, "Processing rewind");
            self.buffer.seek(-(nbytes as i64), SeekMode::Relative);
            self.state.rewinds_processed.fetch_add(1, Ordering::Relaxed);
        }

        for adapter in &mut self.adapters {
            adapter.process_rewind(nbytes);
        }

        if nbytes > 0 {
            for capture in &mut self.captures {
                capture.process_rewind(nbytes);
            }
            emit(self.events.as_ref(), StreamEvent::RewindProcessed { nbytes });
        }
        nbytes
    }

    /// Checks every stream against the `left_to_play` bytes still buffered.
    ///
    /// Returns how much of that is real audio for at least one stream.
    pub fn process_underruns(&mut self, left_to_play: usize) -> usize {
        let silent = self
            .adapters
            .iter_mut()
            .map(|a| a.underrun_bytes(left_to_play))
            .max()
            .unwrap_or(0);
        left_to_play - silent.min(left_to_play)
    }

    fn fill(&mut self) {
        while self.buffer.length() < self.buffer_bytes {
            let chunk = self.render(self.buffer_bytes - self.buffer.length());
            if let Err(e) = self.buffer.push(&chunk) {
                tracing::error!(device = %self.name, error = %e, "Device buffer rejected block");
                break;
            }
        }
    }

    fn next_period(&mut self) -> Result<Option<MemChunk>, MemPoolError> {
        let period = self.period_bytes.min(self.buffer.length());
        if period == 0 {
            return Ok(None);
        }
        let Some(first) = self.buffer.peek() else {
            return Ok(None);
        };
        if first.len() >= period {
            self.buffer.drop_bytes(period);
            return Ok(Some(first.slice(0, period)));
        }

        let mut block = self.pool.allocate(period)?;
        let data = block.make_writable(&self.pool)?;
        let mut filled = 0;
        while filled < period {
            let Some(chunk) = self.buffer.peek() else {
                break;
            };
            let n = chunk.len().min(period - filled);
            data[filled..filled + n].copy_from_slice(&chunk.as_bytes()[..n]);
            self.buffer.drop_bytes(n);
            filled += n;
        }
        block.truncate(filled);
        Ok(Some(block))
    }

    fn write(&mut self, output: &mut dyn DeviceOutput, chunk: &MemChunk) {
        match output.write(chunk) {
            Ok(()) => {
                self.state
                    .bytes_written
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                self.state.output_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(device = %self.name, output = output.name(), error = %e, "Output write failed");
                emit(
                    self.events.as_ref(),
                    StreamEvent::OutputError {
                        output: output.name().to_string(),
                        error: e.to_string(),
                    },
                );
            }
        }
    }

    /// Mixes up to `length` bytes from every linked stream.
    ///
    /// Returns at least one frame and at most one pool block. Silence is
    /// returned when no stream is linked. A stream whose producer fails is
    /// unlinked; the others are mixed as usual.
    pub fn render(&mut self, length: usize) -> MemChunk {
        let spec = self.info.spec;
        let block_max = self.silence.len();
        let length = if length == 0 {
            block_max
        } else {
            spec.frame_align(length).max(spec.frame_size()).min(block_max)
        };

        let mut peeked: Vec<(usize, MemChunk, ChannelVolumes)> = Vec::with_capacity(self.adapters.len());
        let mut failed: Vec<(usize, String)> = Vec::new();

        for (i, adapter) in self.adapters.iter_mut().enumerate() {
            match adapter.peek(length) {
                Ok((chunk, volume)) => {
                    if adapter.take_underrun() {
                        self.state.underruns.fetch_add(1, Ordering::Relaxed);
                    }
                    peeked.push((i, chunk, volume));
                }
                Err(StreamError::Producer(e)) => failed.push((i, e.to_string())),
                Err(StreamError::Resource(e)) => {
                    tracing::warn!(
                        device = %self.name,
                        stream = %adapter.id(),
                        error = %e,
                        "Skipping stream for this pass"
                    );
                }
            }
        }

        let mixlength = peeked
            .iter()
            .map(|(_, chunk, _)| chunk.len())
            .min()
            .unwrap_or(length)
            .min(length);

        let result = self.mix(&peeked, mixlength);

        for (i, _, _) in &peeked {
            self.adapters[*i].drop_bytes(mixlength);
        }
        for (i, reason) in failed.into_iter().rev() {
            self.kill(i, reason);
        }
        self.collect_rewind_requests();

        for capture in &mut self.captures {
            if let Err(e) = capture.push(&result) {
                tracing::warn!(stream = %capture.id(), error = %e, "Capture stream fell behind");
            }
        }

        self.state.blocks_rendered.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(device = %self.name, streams = peeked.len(), mixlength, "Rendered block");
        result
    }

    fn mix(&self, peeked: &[(usize, MemChunk, ChannelVolumes)], mixlength: usize) -> MemChunk {
        let spec = self.info.spec;
        match peeked {
            [] => self.silence.slice(0, mixlength),
            [(_, chunk, volume)] => {
                if volume.is_muted() {
                    return self.silence.slice(0, mixlength);
                }
                let mut out = chunk.slice(0, mixlength);
                if !volume.is_norm() {
                    match out.make_writable(&self.pool) {
                        Ok(data) => format::apply_volume(spec.format, spec.channels, data, volume),
                        Err(e) => {
                            tracing::warn!(device = %self.name, error = %e, "Mixing silence");
                            return self.silence.slice(0, mixlength);
                        }
                    }
                }
                out
            }
            _ => {
                let mut out = match self.pool.allocate(mixlength) {
                    Ok(out) => out,
                    Err(e) => {
                        tracing::warn!(device = %self.name, error = %e, "Mixing silence");
                        return self.silence.slice(0, mixlength);
                    }
                };
                let inputs: Vec<MixInput<'_>> = peeked
                    .iter()
                    .map(|(_, chunk, volume)| MixInput {
                        data: &chunk.as_bytes()[..mixlength],
                        volume,
                    })
                    .collect();
                match out.make_writable(&self.pool) {
                    Ok(data) => format::mix(&inputs, &spec, data),
                    Err(e) => {
                        tracing::warn!(device = %self.name, error = %e, "Mixing silence");
                        return self.silence.slice(0, mixlength);
                    }
                }
                out
            }
        }
    }

    fn kill(&mut self, index: usize, reason: String) {
        let mut adapter = self.adapters.remove(index);
        let id = adapter.id();
        tracing::warn!(device = %self.name, stream = %id, %reason, "Producer failed, killing stream");
        adapter.set_state(StreamState::Unlinked);
        self.rewind.request(self.buffer_bytes);
        self.state.streams_killed.fetch_add(1, Ordering::Relaxed);
        self.killed.push(id);
        emit(self.events.as_ref(), StreamEvent::StreamKilled { stream: id, reason });
    }

    /// Unlinks every stream. Called when the device thread exits.
    pub fn shutdown(&mut self) {
        for adapter in &mut self.adapters {
            adapter.set_state(StreamState::Unlinked);
        }
        for capture in &mut self.captures {
            capture.set_state(StreamState::Unlinked);
        }
        tracing::debug!(
            device = %self.name,
            streams = self.adapters.len(),
            captures = self.captures.len(),
            "Dropping remaining streams"
        );
        self.adapters.clear();
        self.captures.clear();
    }
}

impl std::fmt::Debug for DeviceCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCore")
            .field("name", &self.name)
            .field("spec", &self.info.spec)
            .field("period_bytes", &self.period_bytes)
            .field("buffer_bytes", &self.buffer_bytes)
            .field("adapters", &self.adapters.len())
            .field("captures", &self.captures.len())
            .field("buffered", &self.buffer.length())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{BufferedProducer, StreamProducer};
    use crate::capture::ChannelConsumer;
    use crate::device::NullOutput;
    use crate::error::ProducerError;
    use crate::event::event_callback;
    use crate::resampler::ResampleMethod;
    use crate::sample::{ChannelMap, SampleFormat, SampleSpec, Volume};
    use crate::StreamAdapterBuilder;
    use parking_lot::Mutex;
    use tokio::sync::oneshot;

    const PERIOD: usize = 256;
    const BUFFER: usize = 1024;

    fn spec() -> SampleSpec {
        SampleSpec::new(SampleFormat::S16NE, 48000, 2)
    }

    fn s16(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    fn read_s16(data: &[u8]) -> Vec<i16> {
        data.chunks_exact(2).map(|b| i16::from_ne_bytes([b[0], b[1]])).collect()
    }

    fn info() -> DeviceInfo {
        let mut info = DeviceInfo::new(spec(), ChannelMap::stereo());
        info.max_rewind = BUFFER;
        info.max_request = BUFFER;
        info.resample_method = ResampleMethod::Trivial;
        info
    }

    fn core() -> DeviceCore {
        DeviceCore::new("test", info(), MemPool::default(), PERIOD, None)
    }

    fn link(core: &mut DeviceCore, id: u32, producer: Box<dyn StreamProducer>) -> StreamId {
        let id = StreamId::new(id);
        let adapter = StreamAdapterBuilder::new(spec())
            .build(id, core.info(), &MemPool::default(), producer)
            .unwrap();
        core.add_adapter(Box::new(adapter));
        id
    }

    fn constant(value: i16, frames: usize) -> BufferedProducer {
        let producer = BufferedProducer::new(spec());
        producer.push_bytes(&s16(&vec![value; frames * 2])).unwrap();
        producer
    }

    struct FailingProducer;

    impl StreamProducer for FailingProducer {
        fn name(&self) -> &str {
            "failing"
        }

        fn pop(&mut self, _nbytes: usize) -> Result<Option<MemChunk>, ProducerError> {
            Err(ProducerError::failed("decoder crashed"))
        }
    }

    #[test]
    fn test_render_without_streams_is_silence() {
        let mut core = core();
        let chunk = core.render(PERIOD);
        assert_eq!(chunk.len(), PERIOD);
        assert!(format::is_silence(SampleFormat::S16NE, chunk.as_bytes()));
    }

    #[test]
    fn test_single_stream_passes_through() {
        let mut core = core();
        link(&mut core, 1, Box::new(constant(1000, 512)));
        let chunk = core.render(PERIOD);
        assert_eq!(chunk.len(), PERIOD);
        assert!(read_s16(chunk.as_bytes()).iter().all(|&s| s == 1000));
    }

    #[test]
    fn test_two_streams_are_summed() {
        let mut core = core();
        link(&mut core, 1, Box::new(constant(1000, 512)));
        link(&mut core, 2, Box::new(constant(-300, 512)));
        let chunk = core.render(PERIOD);
        assert!(read_s16(chunk.as_bytes()).iter().all(|&s| s == 700));
    }

    #[test]
    fn test_muted_stream_renders_silence() {
        let mut core = core();
        let id = link(&mut core, 1, Box::new(constant(1000, 512)));
        core.process_message(DeviceMessage::SetMute { id, muted: true });
        let chunk = core.render(PERIOD);
        assert!(format::is_silence(SampleFormat::S16NE, chunk.as_bytes()));
    }

    #[test]
    fn test_volume_message_scales_and_rewinds() {
        let mut core = core();
        let id = link(&mut core, 1, Box::new(constant(1000, 4096)));
        let mut output = NullOutput::new();
        core.iterate(&mut output);
        assert_eq!(core.pending_rewind(), None);

        let half = ChannelVolumes::uniform(2, Volume::from_linear(0.5));
        core.process_message(DeviceMessage::SetVolume {
            id,
            volume: half,
            factor: ChannelVolumes::norm(2),
        });
        assert!(core.pending_rewind().is_some());

        core.iterate(&mut output);
        assert_eq!(core.pending_rewind(), None);
        let chunk = core.render(PERIOD);
        assert!(read_s16(chunk.as_bytes()).iter().all(|&s| (s - 500).abs() <= 1));
    }

    #[test]
    fn test_failing_producer_kills_only_that_stream() {
        let killed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&killed);
        let events = event_callback(move |event| {
            if let StreamEvent::StreamKilled { stream, .. } = event {
                sink.lock().push(stream);
            }
        });
        let mut core = DeviceCore::new("test", info(), MemPool::default(), PERIOD, Some(events));
        let good = link(&mut core, 1, Box::new(constant(1000, 512)));
        let bad = link(&mut core, 2, Box::new(FailingProducer));

        let chunk = core.render(PERIOD);
        assert!(read_s16(chunk.as_bytes()).iter().all(|&s| s == 1000));
        assert_eq!(core.adapter_count(), 1);
        assert!(core.adapter(good).is_some());
        assert_eq!(core.take_killed(), vec![bad]);
        assert_eq!(*killed.lock(), vec![bad]);
        assert_eq!(core.stats().streams_killed, 1);
    }

    #[test]
    fn test_exhausted_stream_is_skipped_for_the_pass() {
        let mut core = core();
        let voice = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
        let starved = MemPool::new(&crate::config::PoolConfig {
            max_blocks: 4,
            ..Default::default()
        });
        let producer = BufferedProducer::new(voice);
        producer.push_bytes(&s16(&[500; 800])).unwrap();
        let starved_id = StreamId::new(1);
        let adapter = StreamAdapterBuilder::new(voice)
            .build(starved_id, core.info(), &starved, Box::new(producer.clone()))
            .unwrap();
        core.add_adapter(Box::new(adapter));
        link(&mut core, 2, Box::new(constant(1000, 512)));

        let mut held = Vec::new();
        while let Ok(block) = starved.allocate(16) {
            held.push(block);
        }

        let chunk = core.render(PERIOD);
        assert!(read_s16(chunk.as_bytes()).iter().all(|&s| s == 1000));
        assert_eq!(core.adapter_count(), 2);
        assert!(core.take_killed().is_empty());
        let skipped = core.adapter(starved_id).unwrap();
        assert_eq!(skipped.render_length(), 0);
        assert!(!skipped.is_drained());

        drop(held);
        let chunk = core.render(PERIOD);
        assert!(read_s16(chunk.as_bytes()).iter().all(|&s| s == 1500));
        assert_eq!(producer.len(), 1600 - 22);
    }

    #[test]
    fn test_iterate_writes_one_period() {
        let mut core = core();
        link(&mut core, 1, Box::new(constant(1000, 4096)));
        let mut output = NullOutput::new();

        core.iterate(&mut output);
        assert_eq!(output.bytes_written(), PERIOD as u64);
        assert_eq!(core.buffered(), BUFFER - PERIOD);

        core.iterate(&mut output);
        assert_eq!(output.bytes_written(), 2 * PERIOD as u64);
        let stats = core.stats();
        assert_eq!(stats.bytes_written, 2 * PERIOD as u64);
        assert!(stats.blocks_rendered >= 2);
    }

    #[test]
    fn test_rewind_limited_to_buffered_audio() {
        let mut core = core();
        let mut output = NullOutput::new();
        core.iterate(&mut output);
        assert_eq!(core.process_rewind(10 * BUFFER), BUFFER - PERIOD);
        assert_eq!(core.buffered(), 0);
        assert_eq!(core.stats().rewinds_processed, 1);
    }

    #[test]
    fn test_remove_adapter_hands_stream_back() {
        let mut core = core();
        let id = link(&mut core, 1, Box::new(constant(1000, 512)));
        core.rewind.take(usize::MAX);

        let (reply, mut rx) = oneshot::channel();
        assert!(core.process_message(DeviceMessage::RemoveAdapter { id, reply }));
        let adapter = rx.try_recv().unwrap().unwrap();
        assert_eq!(adapter.state(), StreamState::Unlinked);
        assert_eq!(core.adapter_count(), 0);
        assert_eq!(core.pending_rewind(), Some(BUFFER));
    }

    #[test]
    fn test_remove_unknown_adapter() {
        let mut core = core();
        let (reply, mut rx) = oneshot::channel();
        core.process_message(DeviceMessage::RemoveAdapter {
            id: StreamId::new(9),
            reply,
        });
        assert!(rx.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_corked_stream_is_silent() {
        let mut core = core();
        let id = link(&mut core, 1, Box::new(constant(1000, 512)));
        core.process_message(DeviceMessage::SetState {
            id,
            state: StreamState::Corked,
        });
        let chunk = core.render(PERIOD);
        assert!(format::is_silence(SampleFormat::S16NE, chunk.as_bytes()));
    }

    #[test]
    fn test_capture_receives_rendered_audio() {
        let mut info = info();
        info.max_rewind = 0;
        let mut core = DeviceCore::new("test", info, MemPool::default(), PERIOD, None);
        link(&mut core, 1, Box::new(constant(1000, 512)));

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let capture = CaptureAdapter::new(
            StreamId::new(2),
            spec(),
            None,
            core.info(),
            &MemPool::default(),
            Box::new(ChannelConsumer::new(tx)),
        )
        .unwrap();
        core.add_capture(Box::new(capture));

        // the first block waits out the rewind window
        core.render(PERIOD);
        assert!(rx.try_recv().is_err());
        core.render(PERIOD);
        let chunk = rx.try_recv().unwrap();
        assert_eq!(chunk.len(), PERIOD);
        assert!(read_s16(chunk.as_bytes()).iter().all(|&s| s == 1000));
    }

    #[test]
    fn test_get_latency_includes_device_buffer() {
        let mut core = core();
        let id = link(&mut core, 1, Box::new(constant(1000, 4096)));
        let mut output = NullOutput::new();
        core.iterate(&mut output);

        let (reply, mut rx) = oneshot::channel();
        core.process_message(DeviceMessage::GetLatency { id, reply });
        let latency = rx.try_recv().unwrap().unwrap();
        assert!(latency >= spec().bytes_to_duration(BUFFER - PERIOD));
    }

    #[test]
    fn test_shutdown_message_stops_processing() {
        let mut core = core();
        link(&mut core, 1, Box::new(constant(1000, 512)));
        assert!(!core.process_message(DeviceMessage::Shutdown));
        core.shutdown();
        assert_eq!(core.adapter_count(), 0);
    }
}
