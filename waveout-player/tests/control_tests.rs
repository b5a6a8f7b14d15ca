//! Control commands: reset, pause/restart, close
//!
//! Tests:
//! - Reset hands back every queued buffer and zeroes the position
//! - Reset is idempotent
//! - Pause/Restart loses no audio and freezes the position while paused
//! - Pausing with several loop passes in the device replays exactly the unheard bytes
//! - Reset retires submissions still waiting in the command ring
//! - Close is refused while buffers are queued (linked or still in the ring),
//!   and is final once accepted
//! - Dropping an open handle retires its buffers and closes the device

mod helpers;

use helpers::{fast_config, pcm, EventLog, GatedLog, MockDevice};
use serial_test::serial;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use waveout_common::config::PlayerConfig;
use waveout_player::{Error, NullSink, PlaybackState, WaveBuffer, WaveFormat, WaveOutDevice};

const TIMEOUT: Duration = Duration::from_secs(5);

fn open_stalled(log: &EventLog) -> (MockDevice, WaveOutDevice) {
    // Device that never plays: buffers stay queued until reset
    let mock = MockDevice::new(1_000);
    let device =
        WaveOutDevice::open(WaveFormat::cd_quality(), mock.clone(), log.clone(), &fast_config())
            .unwrap();
    (mock, device)
}

#[test]
fn test_reset_retires_all_queued_buffers() {
    let log = EventLog::new();
    let (mock, device) = open_stalled(&log);

    let buffers: Vec<_> = (1..=3).map(|fill| pcm(2_000, fill)).collect();
    for buffer in &buffers {
        device.submit(buffer).unwrap();
    }

    device.reset().unwrap();

    assert!(buffers.iter().all(|b| b.is_done()));
    let expected: Vec<_> = buffers.iter().map(|b| b.id()).collect();
    assert_eq!(log.done_ids(), expected);
    assert!(mock.reset_calls() >= 1);

    let snapshot = device.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Stopped);
    assert_eq!(snapshot.queued, 0);
    assert_eq!(snapshot.written_total, 0);
    assert_eq!(device.position().unwrap(), 0);

    device.close().unwrap();
}

#[test]
fn test_reset_twice_is_idempotent() {
    let log = EventLog::new();
    let (_mock, device) = open_stalled(&log);

    device.submit(&pcm(2_000, 1)).unwrap();
    device.reset().unwrap();
    let events_after_first = log.events().len();

    device.reset().unwrap();
    assert_eq!(log.events().len(), events_after_first);
    assert_eq!(device.state(), PlaybackState::Stopped);
    assert_eq!(device.position().unwrap(), 0);

    device.close().unwrap();
}

#[test]
#[serial]
fn test_pause_and_restart_lose_no_audio() {
    let format = WaveFormat::cd_quality();
    let config = PlayerConfig {
        fragment_ms: 5,
        device_buffer_ms: 40,
        ..PlayerConfig::default()
    };
    let sink = NullSink::new(format, config.device_buffer_bytes(&format));
    let log = EventLog::new();
    let device = WaveOutDevice::open(format, sink, log.clone(), &config).unwrap();

    // 2 x 100ms
    let first = pcm(17_640, 1);
    let second = pcm(17_640, 2);
    device.submit(&first).unwrap();
    device.submit(&second).unwrap();

    thread::sleep(Duration::from_millis(60));
    device.pause().unwrap();
    assert_eq!(device.state(), PlaybackState::Paused);

    let paused_at = device.position().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(device.position().unwrap(), paused_at);
    assert!(!second.is_done());

    device.restart().unwrap();
    assert_eq!(device.state(), PlaybackState::Playing);

    assert!(log.wait_for_done(2, TIMEOUT));
    assert_eq!(log.done_ids(), vec![first.id(), second.id()]);

    let final_position = device.position().unwrap();
    assert!(final_position >= paused_at);
    // Every byte played exactly once despite the rewind
    assert_eq!(final_position, 2 * 17_640);

    device.close().unwrap();
}

fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !pred() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
    true
}

#[test]
fn test_pause_across_loop_passes_loses_nothing() {
    let mock = MockDevice::new(14_000);
    let log = EventLog::new();
    let device =
        WaveOutDevice::open(WaveFormat::cd_quality(), mock.clone(), log.clone(), &fast_config())
            .unwrap();

    let looped = Arc::new(WaveBuffer::looping(vec![7u8; 4_410], 3));
    let tail = pcm(20_000, 9);

    // Link both before feeding so the loop is not drained on its own
    device.pause().unwrap();
    device.submit(&looped).unwrap();
    device.submit(&tail).unwrap();
    assert!(wait_until(TIMEOUT, || device.snapshot().queued == 2));
    device.restart().unwrap();

    // All three passes and the start of the tail are in the device
    assert!(wait_until(TIMEOUT, || mock.total_written() >= 14_000));
    mock.play(1_000);
    device.pause().unwrap();

    let paused_at = device.position().unwrap();
    assert_eq!(paused_at, 1_000);
    let written_before_pause = mock.total_written() as usize;
    assert!(!looped.is_done());

    mock.with(|s| s.auto_play = true);
    device.restart().unwrap();
    assert!(log.wait_for_done(2, TIMEOUT));
    assert_eq!(log.done_ids(), vec![looped.id(), tail.id()]);

    // Everything after the pause is exactly what had not been heard yet
    let resumed: Vec<u8> = mock.writes().concat().split_off(written_before_pause);
    assert_eq!(resumed.len(), 3 * 4_410 + 20_000 - 1_000);
    assert_eq!(resumed.iter().filter(|b| **b == 7).count(), 3 * 4_410 - 1_000);
    assert_eq!(resumed.iter().filter(|b| **b == 9).count(), 20_000);
    assert_eq!(device.position().unwrap(), 3 * 4_410 + 20_000);

    device.close().unwrap();
}

#[test]
fn test_reset_retires_submissions_still_in_ring() {
    let mock = MockDevice::auto_playing(10_000);
    let sink = GatedLog::new();
    let device =
        WaveOutDevice::open(WaveFormat::cd_quality(), mock.clone(), sink.clone(), &fast_config())
            .unwrap();

    // The player blocks delivering this buffer's Done event
    let first = pcm(1_000, 1);
    device.submit(&first).unwrap();
    assert!(sink.gate.wait_until_held(TIMEOUT));

    let second = pcm(1_000, 2);
    let third = pcm(1_000, 3);
    device.submit(&second).unwrap();
    device.submit(&third).unwrap();

    thread::scope(|scope| {
        let reset = scope.spawn(|| device.reset());
        assert!(wait_until(TIMEOUT, || device.pending_commands() == 3));
        sink.gate.open();
        assert!(reset.join().unwrap().is_ok());
    });

    assert!(second.is_done() && third.is_done());
    assert_eq!(sink.log.done_ids(), vec![first.id(), second.id(), third.id()]);
    // The ring submissions were never written
    assert_eq!(mock.total_written(), 1_000);
    assert_eq!(device.state(), PlaybackState::Stopped);

    device.close().unwrap();
}

#[test]
fn test_close_refused_while_submission_in_ring() {
    let mock = MockDevice::auto_playing(10_000);
    let sink = GatedLog::new();
    let device =
        WaveOutDevice::open(WaveFormat::cd_quality(), mock.clone(), sink.clone(), &fast_config())
            .unwrap();

    let first = pcm(1_000, 1);
    device.submit(&first).unwrap();
    assert!(sink.gate.wait_until_held(TIMEOUT));

    // Nothing is linked any more, but a submission is waiting in the ring
    let second = pcm(1_000, 2);
    device.submit(&second).unwrap();

    thread::scope(|scope| {
        let close = scope.spawn(|| device.close());
        assert!(wait_until(TIMEOUT, || device.pending_commands() == 2));
        sink.gate.open();
        assert!(matches!(close.join().unwrap(), Err(Error::StillPlaying(_))));
    });

    // The waiting submission still plays
    assert!(sink.log.wait_for_done(2, TIMEOUT));
    assert!(second.is_done());

    device.close().unwrap();
    assert_eq!(sink.log.types().last(), Some(&"Closed"));
}

#[test]
fn test_restart_without_pause_is_noop() {
    let log = EventLog::new();
    let (_mock, device) = open_stalled(&log);

    device.restart().unwrap();
    assert_eq!(device.state(), PlaybackState::Stopped);

    device.close().unwrap();
}

#[test]
fn test_submit_while_paused_stays_paused() {
    let mock = MockDevice::auto_playing(10_000);
    let log = EventLog::new();
    let device =
        WaveOutDevice::open(WaveFormat::cd_quality(), mock.clone(), log.clone(), &fast_config())
            .unwrap();

    device.pause().unwrap();
    assert_eq!(device.state(), PlaybackState::Paused);

    let buffer = pcm(1_000, 4);
    device.submit(&buffer).unwrap();

    // Submissions are asynchronous; wait for the player to link it
    let deadline = Instant::now() + TIMEOUT;
    while device.snapshot().queued == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(device.state(), PlaybackState::Paused);
    assert_eq!(device.snapshot().queued, 1);
    assert_eq!(mock.total_written(), 0);

    device.restart().unwrap();
    assert!(log.wait_for_done(1, TIMEOUT));
    assert_eq!(mock.total_written(), 1_000);

    device.close().unwrap();
}

#[test]
fn test_close_refused_while_buffers_queued() {
    let log = EventLog::new();
    let (_mock, device) = open_stalled(&log);

    let buffer = pcm(2_000, 1);
    device.submit(&buffer).unwrap();

    assert!(matches!(device.close(), Err(Error::StillPlaying(_))));
    assert_ne!(device.state(), PlaybackState::Closed);
    assert!(!buffer.is_done());

    device.reset().unwrap();
    device.close().unwrap();
    assert_eq!(device.state(), PlaybackState::Closed);
    assert_eq!(log.types().last(), Some(&"Closed"));

    assert!(matches!(device.submit(&pcm(10, 1)), Err(Error::BadDevice(_))));
    assert!(matches!(device.pause(), Err(Error::BadDevice(_))));
    assert!(matches!(device.close(), Err(Error::BadDevice(_))));
}

#[test]
fn test_drop_without_close_retires_buffers() {
    let log = EventLog::new();
    let (_mock, device) = open_stalled(&log);

    let buffer = pcm(2_000, 1);
    device.submit(&buffer).unwrap();
    drop(device);

    assert!(buffer.is_done());
    assert_eq!(log.types(), vec!["Opened", "Done", "Closed"]);
}
