//! Clocked virtual output device
//!
//! Accepts bytes into a bounded buffer and "plays" them in real time at the
//! stream's byte rate. Nothing is rendered; the device exists so the engine
//! can run headless with realistic timing.

use super::{DeviceError, OutputDevice};
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;
use waveout_common::WaveFormat;

/// Virtual device consuming `avg_bytes_per_sec` bytes per second
#[derive(Debug)]
pub struct NullSink {
    format: WaveFormat,
    capacity: usize,
    /// Total bytes accepted since creation
    written: u64,
    /// Bytes already consumed at `clock`
    consumed_base: u64,
    clock: Instant,
}

impl NullSink {
    /// Create a sink holding at most `capacity` unplayed bytes.
    pub fn new(format: WaveFormat, capacity: usize) -> Self {
        Self {
            format,
            capacity: capacity.max(format.block_align() as usize),
            written: 0,
            consumed_base: 0,
            clock: Instant::now(),
        }
    }

    /// Total bytes accepted since creation
    pub fn total_written(&self) -> u64 {
        self.written
    }

    /// Bytes consumed so far. An idle device restarts its clock so that
    /// time spent starved is not credited to the next write.
    fn consumed(&mut self) -> u64 {
        let elapsed = self.format.duration_to_bytes(self.clock.elapsed());
        let consumed = self.consumed_base + elapsed;
        if consumed >= self.written {
            self.consumed_base = self.written;
            self.clock = Instant::now();
            self.written
        } else {
            consumed
        }
    }

    fn pending(&mut self) -> u64 {
        self.written - self.consumed()
    }
}

impl OutputDevice for NullSink {
    fn write(&mut self, data: &[u8]) -> Result<usize, DeviceError> {
        let available = self.capacity_available()?;
        if available == 0 {
            return Err(DeviceError::WouldBlock);
        }
        let accepted = data.len().min(available);
        self.written += accepted as u64;
        trace!("NullSink accepted {} bytes ({} total)", accepted, self.written);
        Ok(accepted)
    }

    fn capacity_available(&mut self) -> Result<usize, DeviceError> {
        let pending = self.pending() as usize;
        Ok(self.capacity.saturating_sub(pending))
    }

    fn pending_bytes(&mut self) -> Result<usize, DeviceError> {
        Ok(self.pending() as usize)
    }

    fn flush_and_drain(&mut self) -> Result<(), DeviceError> {
        loop {
            let pending = self.pending();
            if pending == 0 {
                return Ok(());
            }
            let wait = self.format.bytes_to_duration(pending);
            thread::sleep(wait.max(Duration::from_millis(1)));
        }
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        self.consumed_base = self.written;
        self.clock = Instant::now();
        Ok(())
    }
}
