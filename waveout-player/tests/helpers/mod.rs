//! Test helper modules for waveout-player integration tests
//!
//! Provides reusable test infrastructure components:
//! - MockDevice: scriptable output device with shared, inspectable state
//! - EventLog: event sink that records and waits for events
//! - GatedLog: event log that can hold the player thread at a Done event

pub mod event_log;
pub mod mock_device;

pub use event_log::{EventLog, GatedLog};
pub use mock_device::MockDevice;

use std::sync::Arc;
use waveout_common::config::PlayerConfig;
use waveout_player::WaveBuffer;

/// Config with a short fragment so tests don't wait on the default 20ms
pub fn fast_config() -> PlayerConfig {
    PlayerConfig {
        fragment_ms: 5,
        device_buffer_ms: 50,
        ..PlayerConfig::default()
    }
}

/// Buffer of `len` bytes all set to `fill`
pub fn pcm(len: usize, fill: u8) -> Arc<WaveBuffer> {
    Arc::new(WaveBuffer::new(vec![fill; len]))
}
