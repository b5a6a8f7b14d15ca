//! Audio buffer descriptors
//!
//! A [`WaveBuffer`] is one discrete chunk of PCM audio handed to the engine.
//! The payload and loop markers are fixed at construction; the status is the
//! only mutable part and moves through:
//!
//! ```text
//! Prepared --submit--> Queued --retire--> Done --submit--> Queued ...
//! ```
//!
//! The producer keeps an `Arc<WaveBuffer>` and can poll [`WaveBuffer::status`]
//! or wait for the matching `Done` event.

use std::sync::atomic::{AtomicU8, Ordering};
use uuid::Uuid;
use waveout_common::{Error, Result};

/// Lifecycle status of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferStatus {
    /// Owned by the producer, never submitted
    Prepared,
    /// Submitted; owned by the engine until retired
    Queued,
    /// Retired and handed back to the producer
    Done,
}

impl BufferStatus {
    fn as_u8(self) -> u8 {
        match self {
            BufferStatus::Prepared => 0,
            BufferStatus::Queued => 1,
            BufferStatus::Done => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => BufferStatus::Prepared,
            1 => BufferStatus::Queued,
            _ => BufferStatus::Done,
        }
    }
}

impl std::fmt::Display for BufferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferStatus::Prepared => write!(f, "Prepared"),
            BufferStatus::Queued => write!(f, "Queued"),
            BufferStatus::Done => write!(f, "Done"),
        }
    }
}

/// One chunk of interleaved PCM audio
#[derive(Debug)]
pub struct WaveBuffer {
    id: Uuid,
    data: Vec<u8>,
    loop_start: bool,
    loop_end: bool,
    loops: u32,
    status: AtomicU8,
}

impl WaveBuffer {
    /// Create a buffer that plays once.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            data: data.into(),
            loop_start: false,
            loop_end: false,
            loops: 1,
            status: AtomicU8::new(BufferStatus::Prepared.as_u8()),
        }
    }

    /// Set loop markers.
    ///
    /// `loops` is read from the buffer carrying `loop_start` and is the total
    /// number of passes through the region. Zero is treated as one.
    pub fn with_loop(mut self, loop_start: bool, loop_end: bool, loops: u32) -> Self {
        self.loop_start = loop_start;
        self.loop_end = loop_end;
        self.loops = loops.max(1);
        self
    }

    /// A buffer that is a complete loop region on its own
    pub fn looping(data: impl Into<Vec<u8>>, loops: u32) -> Self {
        Self::new(data).with_loop(true, true, loops)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn loop_start(&self) -> bool {
        self.loop_start
    }

    pub fn loop_end(&self) -> bool {
        self.loop_end
    }

    /// Producer-supplied loop count (never modified by the engine)
    pub fn loops(&self) -> u32 {
        self.loops
    }

    pub fn status(&self) -> BufferStatus {
        BufferStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_queued(&self) -> bool {
        self.status() == BufferStatus::Queued
    }

    pub fn is_done(&self) -> bool {
        self.status() == BufferStatus::Done
    }

    /// Claim the buffer for the engine.
    ///
    /// Fails with `Unprepared` for an empty payload and `StillPlaying` when
    /// the buffer is already queued. A `Done` buffer may be resubmitted.
    pub(crate) fn mark_queued(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(Error::Unprepared(format!("buffer {} has no payload", self.id)));
        }

        let mut current = self.status.load(Ordering::Acquire);
        loop {
            if BufferStatus::from_u8(current) == BufferStatus::Queued {
                return Err(Error::StillPlaying(format!("buffer {} is already queued", self.id)));
            }
            match self.status.compare_exchange(
                current,
                BufferStatus::Queued.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Undo a claim whose submission never reached the engine
    pub(crate) fn unmark_queued(&self, previous: BufferStatus) {
        self.status.store(previous.as_u8(), Ordering::Release);
    }

    /// Hand the buffer back to the producer
    pub(crate) fn mark_done(&self) {
        self.status.store(BufferStatus::Done.as_u8(), Ordering::Release);
    }
}
