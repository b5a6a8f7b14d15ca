//! # waveout Player Library (waveout-player)
//!
//! Buffered PCM playback engine with a dedicated player thread per device.
//!
//! **Purpose:** Accept discrete audio buffers from producers, stream them to a
//! byte-oriented output device in submission order, honour loop regions, and
//! report each buffer back as `Done` once the device has actually played it.
//!
//! **Architecture:** producers → command ring → player thread → [`OutputDevice`]
//! (cpal or a clocked null sink). State is owned by the player thread;
//! producers see it through published position snapshots.

pub mod buffer;
pub mod device;
pub mod engine;
pub mod events;
pub mod handle;
pub mod registry;
pub mod ring;

pub use buffer::{BufferStatus, WaveBuffer};
pub use device::{DeviceError, NullSink, OutputDevice};
pub use engine::PositionSnapshot;
pub use events::{callback, EventSink, NoEvents};
pub use handle::WaveOutDevice;
pub use registry::DeviceRegistry;
pub use waveout_common::{Error, MmTime, OutputEvent, PlaybackState, Result, TimeFormat, WaveFormat};
