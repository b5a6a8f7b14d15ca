//! # waveout Common Library
//!
//! Device-independent code shared by the playback engine and its tools:
//! - Error taxonomy (caller-facing status codes)
//! - PCM stream format and position conversions
//! - Event types delivered to producers
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod format;

pub use error::{Error, Result};
pub use events::{OutputEvent, PlaybackState};
pub use format::{MmTime, TimeFormat, WaveFormat};
