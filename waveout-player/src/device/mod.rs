//! Output device abstraction
//!
//! The player thread talks to the sound device only through [`OutputDevice`].
//! Two implementations ship with the crate:
//! - [`NullSink`]: a clocked virtual device that consumes bytes at the
//!   stream's byte rate (headless runs, timing tests)
//! - [`CpalSink`]: a ring buffer drained by a cpal output callback

mod cpal_sink;
mod null;

pub use cpal_sink::{list_devices, CpalSink, CpalStream};
pub use null::NullSink;

use thiserror::Error;

/// Failures reported by an output device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Device cannot take more data right now; retry later
    #[error("device would block")]
    WouldBlock,

    /// Device's byte accounting no longer matches what was written
    #[error("device desynchronized: {0}")]
    Desync(String),

    /// Any other device failure
    #[error("device failure: {0}")]
    Failed(String),
}

/// Byte-oriented sink the player thread writes PCM data into.
///
/// All methods are called from the player thread only.
pub trait OutputDevice: Send {
    /// Write up to `data.len()` bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, DeviceError>;

    /// Bytes the device can accept without blocking
    fn capacity_available(&mut self) -> Result<usize, DeviceError>;

    /// Bytes written but not yet played
    fn pending_bytes(&mut self) -> Result<usize, DeviceError>;

    /// Block until everything written has been played.
    fn flush_and_drain(&mut self) -> Result<(), DeviceError>;

    /// Discard everything written but not yet played.
    fn reset(&mut self) -> Result<(), DeviceError>;
}

impl<T: OutputDevice + ?Sized> OutputDevice for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<usize, DeviceError> {
        (**self).write(data)
    }

    fn capacity_available(&mut self) -> Result<usize, DeviceError> {
        (**self).capacity_available()
    }

    fn pending_bytes(&mut self) -> Result<usize, DeviceError> {
        (**self).pending_bytes()
    }

    fn flush_and_drain(&mut self) -> Result<(), DeviceError> {
        (**self).flush_and_drain()
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        (**self).reset()
    }
}
