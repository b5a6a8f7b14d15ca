//! Playback engine
//!
//! One player thread per open device. The thread owns the device state and
//! the output device; producers reach it only through the command ring and
//! observe it through a published [`PositionSnapshot`].

mod player;
mod queue;
mod state;

pub(crate) use player::Player;

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use waveout_common::PlaybackState;

/// Consistent view of a device's counters, published by the player thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionSnapshot {
    pub state: PlaybackState,
    /// Bytes the device has played since the last reset
    pub played_total: u64,
    /// Bytes handed to the device since the last reset
    pub written_total: u64,
    /// Buffers submitted and not yet retired
    pub queued: usize,
}

/// Snapshot slot shared between the player thread and handles
#[derive(Debug)]
pub(crate) struct SharedStatus {
    snapshot: Mutex<PositionSnapshot>,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self {
            snapshot: Mutex::new(PositionSnapshot {
                state: PlaybackState::Stopped,
                played_total: 0,
                written_total: 0,
                queued: 0,
            }),
        }
    }

    pub fn store(&self, snapshot: PositionSnapshot) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    pub fn load(&self) -> PositionSnapshot {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_status_readable_after_panicking_writer() {
        let status = Arc::new(SharedStatus::new());
        let writer = Arc::clone(&status);
        let result = thread::spawn(move || {
            let _guard = writer.snapshot.lock().unwrap();
            panic!("player thread panicked mid-publish");
        })
        .join();
        assert!(result.is_err());

        status.store(PositionSnapshot {
            state: PlaybackState::Closed,
            played_total: 10,
            written_total: 10,
            queued: 0,
        });
        assert_eq!(status.load().state, PlaybackState::Closed);
        assert_eq!(status.load().played_total, 10);
    }
}
