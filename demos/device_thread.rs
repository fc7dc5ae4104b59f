//! Device thread example.
//!
//! Runs a device on its real-time thread, links two streams with different
//! formats, changes volume and cork state from the control side and prints
//! what reaches the output.
//!
//! Run with: cargo run --example device_thread

use std::time::Duration;

use ringbuf::traits::Producer;
use stream_mixer::adapter::{RingProducer, SignalBuffer};
use stream_mixer::device::{ChannelOutput, DeviceHandle};
use stream_mixer::{
    event_callback, ChannelVolumes, DeviceConfig, DevicePreset, MemChunk, SampleFormat,
    SampleSpec, StreamAdapterBuilder, Volume,
};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = DeviceConfig {
        name: "demo".to_string(),
        period_duration: Duration::from_millis(10),
        ..DeviceConfig::from_preset(DevicePreset::Music)
    };
    let device_spec = config.spec;

    let (tx, mut rx) = mpsc::channel::<MemChunk>(256);
    let device = DeviceHandle::spawn(
        config,
        Box::new(ChannelOutput::new(tx)),
        Some(event_callback(|event| tracing::info!(?event, "Device event"))),
    )?;

    // A prerecorded tone at CD rate.
    let cd = SampleSpec::new(SampleFormat::S16NE, 44100, 2);
    let mut tone = SignalBuffer::new(cd);
    tone.sine(440.0, 2000);
    let music = device
        .link(StreamAdapterBuilder::new(cd).name("music"), Box::new(tone.into_producer()))
        .await?;

    // A live 16 kHz mono stream fed through a ring buffer.
    let voice = SampleSpec::new(SampleFormat::S16NE, 16000, 1);
    let (producer, mut writer) = RingProducer::new(voice, device.pool().clone(), 64 * 1024);
    let call = device
        .link(StreamAdapterBuilder::new(voice).name("call"), Box::new(producer))
        .await?;

    let feeder = tokio::spawn(async move {
        let mut noise = SignalBuffer::new(voice);
        for _ in 0..100 {
            noise.noise(20, 0.1);
            let chunk = noise.take_chunk();
            writer.push_slice(chunk.as_bytes());
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    let reader = tokio::spawn(async move {
        let mut bytes = 0usize;
        let mut peak = 0i32;
        while let Some(chunk) = rx.recv().await {
            bytes += chunk.len();
            for s in chunk.as_bytes().chunks_exact(4) {
                let v = f32::from_ne_bytes([s[0], s[1], s[2], s[3]]);
                peak = peak.max((v.abs() * 100.0) as i32);
            }
        }
        (bytes, peak)
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("Latency of music: {:?}", device.latency(music).await?);

    device.set_volume(music, ChannelVolumes::uniform(2, Volume::from_linear(0.25)))?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    device.set_corked(call, true)?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    device.set_corked(call, false)?;

    feeder.await?;
    for stream in device.streams() {
        println!(
            "{} {:<6} {} drained: {}",
            stream.id,
            stream.name,
            stream.spec,
            device.is_drained(stream.id)?
        );
    }

    let stats = device.stats();
    device.stop().await?;

    let (bytes, peak) = reader.await?;
    println!(
        "Output: {:?} of {} audio, peak {}%",
        device_spec.bytes_to_duration(bytes),
        device_spec,
        peak
    );
    println!(
        "Stats: {} blocks, {} rewinds, {} underruns",
        stats.blocks_rendered, stats.rewinds_processed, stats.underruns
    );

    Ok(())
}
