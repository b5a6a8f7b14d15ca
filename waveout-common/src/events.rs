//! Event types delivered to producers
//!
//! Events are emitted on the player thread and can be serialized for
//! logging or forwarding (the `waveout-play` binary prints them as JSON lines).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Playback state of one output device
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Open with nothing to play, or after Reset
    Stopped,
    /// Feeding the device
    Playing,
    /// Feeding suspended until Restart
    Paused,
    /// Terminal; the player thread has exited
    Closed,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Closed => write!(f, "closed"),
        }
    }
}

/// Output device events
///
/// `Done` is emitted exactly once per submitted buffer, in submission order
/// (loop regions excepted), once the buffer's bytes have reached the speaker
/// or the buffer was force-retired by Reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputEvent {
    /// Player thread is running and ready for commands
    Opened {
        device_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Buffer retired and handed back to the producer
    Done {
        device_id: Uuid,
        buffer_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Device closed; no further events follow
    Closed {
        device_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl OutputEvent {
    pub fn opened(device_id: Uuid) -> Self {
        OutputEvent::Opened {
            device_id,
            timestamp: Utc::now(),
        }
    }

    pub fn done(device_id: Uuid, buffer_id: Uuid) -> Self {
        OutputEvent::Done {
            device_id,
            buffer_id,
            timestamp: Utc::now(),
        }
    }

    pub fn closed(device_id: Uuid) -> Self {
        OutputEvent::Closed {
            device_id,
            timestamp: Utc::now(),
        }
    }

    /// Device the event belongs to
    pub fn device_id(&self) -> Uuid {
        match self {
            OutputEvent::Opened { device_id, .. }
            | OutputEvent::Done { device_id, .. }
            | OutputEvent::Closed { device_id, .. } => *device_id,
        }
    }

    /// Retired buffer, for `Done` events
    pub fn buffer_id(&self) -> Option<Uuid> {
        match self {
            OutputEvent::Done { buffer_id, .. } => Some(*buffer_id),
            _ => None,
        }
    }

    /// Short event name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            OutputEvent::Opened { .. } => "Opened",
            OutputEvent::Done { .. } => "Done",
            OutputEvent::Closed { .. } => "Closed",
        }
    }
}
