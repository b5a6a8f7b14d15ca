//! Command Path Performance Benchmark
//!
//! Measures command ring throughput and end-to-end submission cost through a
//! player thread writing into an instant device.
//!
//! **Goal:** Queueing a buffer should cost microseconds, not milliseconds

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use waveout_common::config::PlayerConfig;
use waveout_player::ring::{Command, CommandRing};
use waveout_player::{DeviceError, NoEvents, OutputDevice, WaveBuffer, WaveFormat, WaveOutDevice};

/// Device that plays everything instantly
struct InstantDevice;

impl OutputDevice for InstantDevice {
    fn write(&mut self, data: &[u8]) -> Result<usize, DeviceError> {
        Ok(data.len())
    }

    fn capacity_available(&mut self) -> Result<usize, DeviceError> {
        Ok(1 << 20)
    }

    fn pending_bytes(&mut self) -> Result<usize, DeviceError> {
        Ok(0)
    }

    fn flush_and_drain(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

fn bench_command_ring(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_ring");

    group.bench_function("post_receive_64", |b| {
        let ring = CommandRing::new(64);
        let buffer = Arc::new(WaveBuffer::new(vec![0u8; 4]));

        b.iter(|| {
            for _ in 0..64 {
                ring.post(Command::Submit(Arc::clone(&buffer))).unwrap();
            }
            while let Some(message) = ring.receive() {
                black_box(message);
            }
        });
    });

    group.bench_function("grow_from_small_increment", |b| {
        b.iter(|| {
            let ring = CommandRing::new(4);
            for _ in 0..256 {
                ring.post(Command::UpdatePosition).unwrap();
            }
            black_box(ring.len());
        });
    });

    group.finish();
}

fn bench_player_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("player");
    let device = WaveOutDevice::open(
        WaveFormat::cd_quality(),
        InstantDevice,
        NoEvents,
        &PlayerConfig::default(),
    )
    .unwrap();

    group.bench_function("sync_command_round_trip", |b| {
        b.iter(|| {
            black_box(device.position().unwrap());
        });
    });

    group.bench_function("submit_and_reset_16_buffers", |b| {
        let buffers: Vec<_> = (0..16)
            .map(|_| Arc::new(WaveBuffer::new(vec![0u8; 1_764])))
            .collect();

        b.iter(|| {
            for buffer in &buffers {
                device.submit(buffer).unwrap();
            }
            device.reset().unwrap();
        });
    });

    group.finish();
    device.close().unwrap();
}

criterion_group!(benches, bench_command_ring, bench_player_round_trip);
criterion_main!(benches);
