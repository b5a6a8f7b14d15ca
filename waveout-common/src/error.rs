//! Common error types for waveout
//!
//! Every caller-facing operation returns one of these as its status code.
//! None of them imply a state change on the device they were reported for.

use thiserror::Error;

/// Common result type for waveout operations
pub type Result<T> = std::result::Result<T, Error>;

/// Status codes returned by the public playback surface
#[derive(Error, Debug)]
pub enum Error {
    /// Device handle is unknown or has already been closed
    #[error("Bad device: {0}")]
    BadDevice(String),

    /// Buffer has no payload to play
    #[error("Buffer unprepared: {0}")]
    Unprepared(String),

    /// Buffer is already queued, or Close was issued with buffers still queued
    #[error("Still playing: {0}")]
    StillPlaying(String),

    /// Stream format is not a supported PCM layout
    #[error("Bad format: {0}")]
    BadFormat(String),

    /// Invalid parameter passed to an operation
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Command ring could not grow to accept the message
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Player thread has exited; the device can no longer accept commands
    #[error("Device gone: {0}")]
    DeviceGone(String),

    /// Audio output device could not be opened or started
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal consistency error
    #[error("Internal error: {0}")]
    Internal(String),
}
