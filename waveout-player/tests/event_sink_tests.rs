//! Event delivery through channel sinks
//!
//! Tests:
//! - Async consumers receive Opened, Done and Closed over a tokio channel
//! - Blocking consumers can use a std channel

mod helpers;

use helpers::{fast_config, pcm, MockDevice};
use std::sync::mpsc;
use std::time::Duration;
use tokio::time::timeout;
use waveout_player::{callback, OutputEvent, WaveFormat, WaveOutDevice};

#[tokio::test]
async fn test_tokio_channel_receives_events_in_order() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<OutputEvent>();
    let device = WaveOutDevice::open(
        WaveFormat::cd_quality(),
        MockDevice::auto_playing(10_000),
        tx,
        &fast_config(),
    )
    .unwrap();

    let opened = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(opened, OutputEvent::Opened { .. }));
    assert_eq!(opened.device_id(), device.id());

    let buffer = pcm(1_000, 1);
    device.submit(&buffer).unwrap();

    let done = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(done.buffer_id(), Some(buffer.id()));

    device.close().unwrap();
    let closed = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(closed, OutputEvent::Closed { .. }));

    // Sender dropped with the player thread
    assert!(rx.recv().await.is_none());
}

#[test]
fn test_std_channel_sink() {
    let (tx, rx) = mpsc::channel();
    let device =
        WaveOutDevice::open(WaveFormat::cd_quality(), MockDevice::auto_playing(10_000), tx, &fast_config())
            .unwrap();

    let buffer = pcm(1_000, 1);
    device.submit(&buffer).unwrap();
    device.reset().unwrap();
    device.close().unwrap();

    let types: Vec<_> = rx.iter().map(|e: OutputEvent| e.event_type()).collect();
    assert_eq!(types.first(), Some(&"Opened"));
    assert_eq!(types.last(), Some(&"Closed"));
    assert_eq!(types.iter().filter(|t| **t == "Done").count(), 1);
}

#[test]
fn test_events_serialize_as_json() {
    let (tx, rx) = mpsc::channel();
    let device = WaveOutDevice::open(
        WaveFormat::cd_quality(),
        MockDevice::auto_playing(10_000),
        callback(move |event: OutputEvent| {
            let _ = tx.send(serde_json::to_value(&event).unwrap());
        }),
        &fast_config(),
    )
    .unwrap();
    device.close().unwrap();

    let values: Vec<_> = rx.iter().collect();
    assert_eq!(values[0]["type"], "Opened");
    assert_eq!(values[1]["type"], "Closed");
    assert_eq!(values[1]["device_id"], device.id().to_string());
}
