//! Synthetic audio for tests and demos.

use std::time::Duration;

use super::producer::BufferedProducer;
use crate::format::encode_f32;
use crate::memory::MemChunk;
use crate::sample::SampleSpec;

/// Accumulates generated audio in any sample format.
///
/// Lets the full pipeline run without a real audio source.
///
/// # Example
///
/// ```
/// use stream_mixer::adapter::SignalBuffer;
/// use stream_mixer::{SampleFormat, SampleSpec};
///
/// let mut signal = SignalBuffer::new(SampleSpec::new(SampleFormat::S16NE, 16000, 1));
/// signal.silence(100);
/// signal.sine(440.0, 100);
/// assert_eq!(signal.len(), 2 * 3200);
/// ```
#[derive(Debug, Clone)]
pub struct SignalBuffer {
    spec: SampleSpec,
    data: Vec<u8>,
}

impl SignalBuffer {
    /// Creates an empty buffer for `spec`.
    #[must_use]
    pub fn new(spec: SampleSpec) -> Self {
        Self {
            spec,
            data: Vec::new(),
        }
    }

    /// Format of the generated audio.
    #[must_use]
    pub fn spec(&self) -> &SampleSpec {
        &self.spec
    }

    /// Bytes generated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing was generated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Generated audio.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Duration of the generated audio.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.spec.bytes_to_duration(self.data.len())
    }

    fn frames_for(&self, duration_ms: u64) -> usize {
        (u64::from(self.spec.rate) * duration_ms / 1000) as usize
    }

    /// Appends silence.
    pub fn silence(&mut self, duration_ms: u64) {
        let bytes = self.frames_for(duration_ms) * self.spec.frame_size();
        let fill = self.spec.format.silence_byte();
        self.data.extend(std::iter::repeat(fill).take(bytes));
    }

    /// Appends a full-scale sine wave, identical on every channel.
    pub fn sine(&mut self, frequency: f64, duration_ms: u64) {
        let rate = f64::from(self.spec.rate);
        let mut sample = vec![0u8; self.spec.sample_size()];
        for i in 0..self.frames_for(duration_ms) {
            let t = i as f64 / rate;
            let value = (2.0 * std::f64::consts::PI * frequency * t).sin() as f32;
            encode_f32(self.spec.format, value, &mut sample);
            for _ in 0..self.spec.channels {
                self.data.extend_from_slice(&sample);
            }
        }
    }

    /// Appends deterministic white noise scaled by `amplitude`.
    pub fn noise(&mut self, duration_ms: u64, amplitude: f32) {
        let samples = self.frames_for(duration_ms) * usize::from(self.spec.channels);
        let mut sample = vec![0u8; self.spec.sample_size()];
        // Simple LCG for reproducible output
        let mut seed: u32 = 12345;
        for _ in 0..samples {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let random = f32::from((seed >> 16) as u16) / 32768.0 - 1.0;
            encode_f32(self.spec.format, random * amplitude, &mut sample);
            self.data.extend_from_slice(&sample);
        }
    }

    /// Appends raw bytes in the buffer's format.
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    /// Takes the generated audio as a chunk, leaving the buffer empty.
    pub fn take_chunk(&mut self) -> MemChunk {
        MemChunk::from_vec(std::mem::take(&mut self.data))
    }

    /// Moves the generated audio into a producer.
    #[must_use]
    pub fn into_producer(mut self) -> BufferedProducer {
        let producer = BufferedProducer::new(self.spec);
        if !self.is_empty() {
            let chunk = self.take_chunk();
            if let Err(e) = producer.push(&chunk) {
                tracing::warn!(error = %e, "Signal does not fit into producer");
            }
        }
        producer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StreamProducer;
    use crate::sample::SampleFormat;

    #[test]
    fn test_silence_length() {
        let mut signal = SignalBuffer::new(SampleSpec::new(SampleFormat::S16NE, 16000, 1));
        signal.silence(100);
        assert_eq!(signal.len(), 3200);
        assert!(signal.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_u8_silence_is_midpoint() {
        let mut signal = SignalBuffer::new(SampleSpec::new(SampleFormat::U8, 8000, 1));
        signal.silence(10);
        assert!(signal.as_bytes().iter().all(|&b| b == 0x80));
    }

    #[test]
    fn test_sine_stereo_channels_match() {
        let mut signal = SignalBuffer::new(SampleSpec::new(SampleFormat::F32NE, 48000, 2));
        signal.sine(440.0, 10);
        assert_eq!(signal.len(), 480 * 8);
        for frame in signal.as_bytes().chunks_exact(8) {
            assert_eq!(frame[..4], frame[4..]);
        }
        assert!(signal.as_bytes().iter().any(|&b| b != 0));
    }

    #[test]
    fn test_duration() {
        let mut signal = SignalBuffer::new(SampleSpec::new(SampleFormat::S16NE, 16000, 1));
        signal.silence(500);
        assert_eq!(signal.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_noise_is_deterministic() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
        let mut a = SignalBuffer::new(spec);
        let mut b = SignalBuffer::new(spec);
        a.noise(20, 0.5);
        b.noise(20, 0.5);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_into_producer() {
        let spec = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
        let mut signal = SignalBuffer::new(spec);
        signal.extend_from_slice(&[1, 0, 2, 0]);
        let mut producer = signal.into_producer();
        let chunk = producer.pop(64).unwrap().unwrap();
        assert_eq!(chunk.as_bytes(), &[1, 0, 2, 0]);
    }
}
