//! Mono to stereo example.
//!
//! Converts one 20ms frame of 8 kHz mono voice into the 48 kHz stereo
//! format of a device, the way a device loop pulls it.
//!
//! Run with: cargo run --example mono_to_stereo

use stream_mixer::adapter::{DeviceInfo, SignalBuffer, StreamId, StreamState};
use stream_mixer::{
    ChannelMap, MemPool, ResampleMethod, SampleFormat, SampleSpec, StreamAdapterBuilder,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let voice = SampleSpec::new(SampleFormat::S16NE, 8000, 1);
    let device_spec = SampleSpec::new(SampleFormat::S16NE, 48000, 2);

    let mut device = DeviceInfo::new(device_spec, ChannelMap::stereo());
    device.resample_method = ResampleMethod::Trivial;

    let mut signal = SignalBuffer::new(voice);
    signal.sine(440.0, 20);
    println!("Producer: {} ({} bytes)", voice, signal.len());

    let pool = MemPool::default();
    let mut adapter = StreamAdapterBuilder::new(voice)
        .name("voice")
        .build(StreamId::new(1), &device, &pool, Box::new(signal.into_producer()))?;
    adapter.set_state(StreamState::Running);

    if let Some(resampler) = adapter.resampler() {
        println!(
            "Resampler: {} -> {} using {} (work format {})",
            resampler.input_spec(),
            resampler.output_spec(),
            resampler.method(),
            resampler.work_format().name()
        );
    }

    let (chunk, volume) = adapter.peek(device_spec.frame_size() * 2048)?;
    let frames = chunk.len() / device_spec.frame_size();
    println!("Device got {frames} frames, volume norm: {}", volume.is_norm());

    let samples: Vec<i16> = chunk
        .as_bytes()
        .chunks_exact(2)
        .map(|c| i16::from_ne_bytes([c[0], c[1]]))
        .collect();
    for frame in samples.chunks_exact(2).step_by(120) {
        println!("  L={:6}  R={:6}", frame[0], frame[1]);
    }
    adapter.drop_bytes(chunk.len());

    Ok(())
}
