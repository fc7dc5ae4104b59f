//! Rewinding and rewriting audio that was rendered but not played yet.
//!
//! A device keeps up to `max_rewind` bytes of mixed audio queued ahead of
//! the hardware. When a stream changes what it wants to be heard (volume,
//! cork, new data), it asks for a rewind. The device seeks back at its next
//! pass and calls [`StreamAdapter::process_rewind`] on every stream; each
//! stream then rewinds its render queue and, if a rewrite was requested,
//! regenerates the affected region from its producer.

use super::render::StreamAdapter;
use super::StreamState;
use crate::memory::SeekMode;

/// What a stream wants rewritten at the next rewind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rewrite {
    /// Regenerate this many stream bytes; 0 means nothing is pending.
    Bytes(usize),
    /// Drop everything queued and pull fresh data.
    Everything,
}

impl Rewrite {
    pub(crate) fn is_pending(self) -> bool {
        self != Self::Bytes(0)
    }
}

/// An outstanding rewind request, merged to the largest amount asked for.
///
/// # Example
///
/// ```
/// use stream_mixer::adapter::RewindRequest;
///
/// let mut request = RewindRequest::default();
/// request.request(512);
/// request.request(128);
/// assert_eq!(request.take(4096), Some(512));
/// assert_eq!(request.take(4096), None);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewindRequest {
    nbytes: Option<usize>,
}

impl RewindRequest {
    /// Records a request for `nbytes`, keeping the larger of the old and
    /// new amounts.
    pub fn request(&mut self, nbytes: usize) {
        self.nbytes = Some(self.nbytes.map_or(nbytes, |n| n.max(nbytes)));
    }

    /// Returns true if a request is outstanding.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.nbytes.is_some()
    }

    /// Outstanding amount, if any.
    #[must_use]
    pub fn pending(&self) -> Option<usize> {
        self.nbytes
    }

    /// Clears the request and returns its amount, capped at `max`.
    pub fn take(&mut self, max: usize) -> Option<usize> {
        self.nbytes.take().map(|n| n.min(max))
    }
}

impl StreamAdapter {
    /// Rewinds the stream after the device seeked back by `nbytes` device
    /// bytes.
    ///
    /// Called once per device pass in which a rewind happened, with 0 if
    /// the device could not rewind. Pending rewrites are carried out here.
    pub fn process_rewind(&mut self, nbytes: usize) {
        let lbq = self.render.length();

        if nbytes > 0 {
            tracing::debug!(
                stream = %self.id,
                nbytes,
                rewrite = ?self.rewrite,
                flush = self.rewrite_flush,
                "Processing rewind"
            );
        }

        if nbytes > 0 && !self.dont_rewind_render {
            self.render.rewind(nbytes);
        }

        let mut called = false;
        match self.rewrite {
            Rewrite::Everything => self.render.flush_write(),
            Rewrite::Bytes(rewrite) if rewrite > 0 => {
                let max_rewrite = self.to_stream_bytes(nbytes + lbq);
                let amount = rewrite.min(max_rewrite);
                if amount > 0 {
                    // Audio popped but not yet rendered is handed back too.
                    let pending = self.pending.take().map_or(0, |c| c.len());
                    tracing::debug!(stream = %self.id, amount, pending, "Have to rewind stream bytes on producer");
                    self.producer.process_rewind(amount + pending);
                    called = true;

                    let device_amount = self.to_device_bytes(amount);
                    if device_amount > 0 {
                        self.render.seek(-(device_amount as i64), SeekMode::Relative);
                    }
                    if self.rewrite_flush {
                        self.render.silence();
                    }
                    if let Some(r) = &mut self.resampler {
                        r.reset();
                    }
                }
            }
            Rewrite::Bytes(_) => {}
        }

        if !called {
            self.producer.process_rewind(0);
        }

        self.rewrite = Rewrite::Bytes(0);
        self.rewrite_flush = false;
        self.dont_rewind_render = false;
    }

    /// Asks for already rendered audio to be rewound.
    ///
    /// `nbytes` is in the stream's format; 0 means as much as possible.
    /// With `rewrite`, the rewound region is regenerated from the producer
    /// at the next pass; without it, everything queued is dropped and pulled
    /// again. `flush` silences what could not be regenerated.
    /// `dont_rewind_render` keeps the render queue in place and is ignored
    /// together with `rewrite`.
    ///
    /// Repeated requests merge to the largest amount. Nothing happens for
    /// a corked stream.
    pub fn request_rewind(&mut self, nbytes: usize, rewrite: bool, flush: bool, dont_rewind_render: bool) {
        let flush = flush || !rewrite;
        let dont_rewind_render = dont_rewind_render && !rewrite;

        if self.state == StreamState::Corked {
            return;
        }

        let lbq = if rewrite { self.render.length() } else { 0 };

        // None while a full rewrite is already pending.
        let mut nbytes = match self.rewrite {
            Rewrite::Everything => None,
            Rewrite::Bytes(pending) => Some(pending.max(nbytes)),
        };
        if nbytes == Some(0) {
            nbytes = Some(self.to_stream_bytes(self.device.max_rewind + lbq));
        }

        if self.rewrite != Rewrite::Everything {
            if rewrite {
                let n = nbytes.unwrap_or(0).min(self.playing_for);
                self.rewrite = Rewrite::Bytes(n);
                nbytes = Some(n);
            } else {
                self.rewrite = Rewrite::Everything;
            }
        }

        self.rewrite_flush |= flush;
        self.dont_rewind_render |= dont_rewind_render;

        if let Some(n) = nbytes {
            let device_bytes = self.to_device_bytes(n).saturating_sub(lbq);
            self.device_rewind.request(device_bytes);
            tracing::debug!(
                stream = %self.id,
                nbytes = n,
                device_bytes,
                rewrite,
                flush,
                "Rewind requested"
            );
        }
    }

    /// Takes the device rewind this stream asked for since the last call.
    pub fn take_rewind_request(&mut self) -> Option<usize> {
        self.device_rewind.take(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::render::tests::{device, read_s16, s16};
    use crate::adapter::{BufferedProducer, StreamId};
    use crate::format;
    use crate::memory::MemPool;
    use crate::sample::{ChannelVolumes, SampleFormat, SampleSpec, Volume};
    use crate::StreamAdapterBuilder;

    const MAX_REWIND: usize = 4096;

    fn spec() -> SampleSpec {
        SampleSpec::new(SampleFormat::S16NE, 48000, 2)
    }

    fn adapter_with(producer: &BufferedProducer) -> StreamAdapter {
        let pool = MemPool::default();
        let mut adapter = StreamAdapterBuilder::new(spec())
            .build(
                StreamId::new(7),
                &device(spec(), MAX_REWIND),
                &pool,
                Box::new(producer.clone()),
            )
            .unwrap();
        adapter.set_state(StreamState::Running);
        adapter
    }

    fn ramp(frames: i16) -> Vec<u8> {
        s16(&(1..=frames).flat_map(|v| [v, v]).collect::<Vec<_>>())
    }

    #[test]
    fn test_request_merges_to_maximum() {
        let mut request = RewindRequest::default();
        assert!(!request.is_requested());
        request.request(10);
        request.request(300);
        request.request(20);
        assert_eq!(request.pending(), Some(300));
        assert_eq!(request.take(100), Some(100));
        assert!(!request.is_requested());
    }

    #[test]
    fn test_rewind_with_flush_shortens_render_queue() {
        let producer = BufferedProducer::new(spec());
        producer.push_bytes(&ramp(1024)).unwrap();
        let mut adapter = adapter_with(&producer);

        adapter.peek(1024).unwrap();
        assert_eq!(adapter.render_length(), 1024);
        let queued = producer.len();

        adapter.request_rewind(512, true, true, false);
        adapter.process_rewind(0);

        assert_eq!(adapter.render_length(), 512);
        assert_eq!(producer.len(), queued + 512);
        let (chunk, _) = adapter.peek(512).unwrap();
        assert!(format::is_silence(SampleFormat::S16NE, chunk.as_bytes()));
    }

    #[test]
    fn test_rewrite_limited_to_buffered_audio() {
        let producer = BufferedProducer::new(spec());
        producer.push_bytes(&ramp(1024)).unwrap();
        let mut adapter = adapter_with(&producer);

        adapter.peek(256).unwrap();
        adapter.request_rewind(2048, true, true, false);
        adapter.process_rewind(0);
        assert_eq!(adapter.render_length(), 0);
    }

    #[test]
    fn test_rewound_render_queue_replays_data() {
        let producer = BufferedProducer::new(spec());
        producer.push_bytes(&ramp(64)).unwrap();
        let mut adapter = adapter_with(&producer);

        let (first, _) = adapter.peek(128).unwrap();
        let first = first.to_vec();
        adapter.drop_bytes(128);

        adapter.process_rewind(128);
        let (again, _) = adapter.peek(128).unwrap();
        assert_eq!(again.as_bytes(), &first[..]);
    }

    #[test]
    fn test_rewrite_regenerates_from_producer() {
        let producer = BufferedProducer::new(spec());
        producer.push_bytes(&ramp(64)).unwrap();
        let mut adapter = adapter_with(&producer);

        adapter.peek(128).unwrap();
        adapter.drop_bytes(128);

        // device rewinds what it already mixed, the stream rewrites it
        adapter.request_rewind(128, true, false, false);
        adapter.process_rewind(128);
        let (chunk, _) = adapter.peek(128).unwrap();
        assert_eq!(read_s16(chunk.as_bytes())[..4], [1, 1, 2, 2]);
    }

    #[test]
    fn test_request_escalates_to_device() {
        let producer = BufferedProducer::new(spec());
        producer.push_bytes(&ramp(1024)).unwrap();
        let mut adapter = adapter_with(&producer);

        adapter.peek(256).unwrap();
        adapter.drop_bytes(256);
        adapter.peek(256).unwrap();

        // 256 bytes buffered locally, 512 played: 256 must come from the device
        adapter.request_rewind(512, true, false, false);
        assert_eq!(adapter.take_rewind_request(), Some(256));
        assert_eq!(adapter.take_rewind_request(), None);
    }

    #[test]
    fn test_volume_change_requests_rewrite() {
        let producer = BufferedProducer::new(spec());
        producer.push_bytes(&ramp(256)).unwrap();
        let mut adapter = adapter_with(&producer);
        adapter.peek(512).unwrap();

        adapter.set_soft_volume(ChannelVolumes::uniform(2, Volume::from_linear(0.5)));
        assert!(adapter.take_rewind_request().is_some());
    }

    #[test]
    fn test_corked_stream_ignores_requests() {
        let producer = BufferedProducer::new(spec());
        let mut adapter = adapter_with(&producer);
        adapter.set_state(StreamState::Corked);
        adapter.take_rewind_request();

        adapter.request_rewind(128, true, false, false);
        assert_eq!(adapter.take_rewind_request(), None);
    }

    #[test]
    fn test_cork_drops_unplayed_audio() {
        let producer = BufferedProducer::new(spec());
        producer.push_bytes(&ramp(512)).unwrap();
        let mut adapter = adapter_with(&producer);
        adapter.peek(1024).unwrap();

        adapter.set_state(StreamState::Corked);
        adapter.process_rewind(0);
        assert_eq!(adapter.render_length(), 0);
    }

    #[test]
    fn test_uncork_requests_full_device_rewind() {
        let producer = BufferedProducer::new(spec());
        let mut adapter = adapter_with(&producer);
        adapter.set_state(StreamState::Corked);
        adapter.take_rewind_request();

        adapter.set_state(StreamState::Running);
        assert_eq!(adapter.take_rewind_request(), Some(MAX_REWIND));
        adapter.process_rewind(MAX_REWIND);
        assert_eq!(adapter.render_length(), 0);
    }
}
