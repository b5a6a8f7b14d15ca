//! Scriptable output device
//!
//! All state lives behind an `Arc<Mutex<_>>` so a test can keep a clone of
//! the device after moving the original into the engine, then script
//! playback progress and inject failures.

use std::sync::{Arc, Mutex};
use waveout_player::{DeviceError, OutputDevice};

#[derive(Debug, Default)]
pub struct MockState {
    /// Maximum unplayed bytes the device holds
    pub capacity: usize,
    /// Bytes written but not yet played
    pub pending: usize,
    /// Every accepted write, in order
    pub writes: Vec<Vec<u8>>,
    pub total_written: u64,
    /// Play everything pending whenever the engine asks
    pub auto_play: bool,
    /// Next N writes fail with WouldBlock
    pub would_block: u32,
    /// Extra bytes reported as pending (simulates a desynchronized device)
    pub phantom_pending: usize,
    /// Next write fails hard
    pub fail_write: bool,
    /// Drain plays everything out but still reports a failure
    pub fail_drain: bool,
    pub fail_reset: bool,
    pub reset_calls: u32,
    pub drain_calls: u32,
}

#[derive(Debug, Clone)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    /// Device that only plays when the test says so (or on drain)
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                capacity,
                ..MockState::default()
            })),
        }
    }

    /// Device that plays everything instantly
    pub fn auto_playing(capacity: usize) -> Self {
        let device = Self::new(capacity);
        device.with(|s| s.auto_play = true);
        device
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Simulate the device playing `bytes`.
    pub fn play(&self, bytes: usize) {
        self.with(|s| s.pending = s.pending.saturating_sub(bytes));
    }

    pub fn total_written(&self) -> u64 {
        self.with(|s| s.total_written)
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.with(|s| s.writes.clone())
    }

    pub fn reset_calls(&self) -> u32 {
        self.with(|s| s.reset_calls)
    }

    pub fn drain_calls(&self) -> u32 {
        self.with(|s| s.drain_calls)
    }

    /// Sequence of fill bytes written, with consecutive writes of the same
    /// fill merged into one entry per buffer pass.
    pub fn fill_sequence(&self, buffer_len: usize) -> Vec<u8> {
        let bytes: Vec<u8> = self.writes().concat();
        bytes.chunks(buffer_len).map(|chunk| chunk[0]).collect()
    }
}

impl OutputDevice for MockDevice {
    fn write(&mut self, data: &[u8]) -> Result<usize, DeviceError> {
        self.with(|s| {
            if s.would_block > 0 {
                s.would_block -= 1;
                return Err(DeviceError::WouldBlock);
            }
            if s.fail_write {
                s.fail_write = false;
                return Err(DeviceError::Failed("injected write failure".to_string()));
            }
            let accepted = data.len().min(s.capacity - s.pending);
            if accepted == 0 {
                return Err(DeviceError::WouldBlock);
            }
            s.writes.push(data[..accepted].to_vec());
            s.pending += accepted;
            s.total_written += accepted as u64;
            Ok(accepted)
        })
    }

    fn capacity_available(&mut self) -> Result<usize, DeviceError> {
        self.with(|s| {
            if s.auto_play {
                s.pending = 0;
            }
            Ok(s.capacity - s.pending)
        })
    }

    fn pending_bytes(&mut self) -> Result<usize, DeviceError> {
        self.with(|s| {
            if s.auto_play {
                s.pending = 0;
            }
            Ok(s.pending + s.phantom_pending)
        })
    }

    fn flush_and_drain(&mut self) -> Result<(), DeviceError> {
        self.with(|s| {
            s.drain_calls += 1;
            s.pending = 0;
            if s.fail_drain {
                return Err(DeviceError::Failed("injected drain failure".to_string()));
            }
            Ok(())
        })
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        self.with(|s| {
            s.reset_calls += 1;
            if s.fail_reset {
                return Err(DeviceError::Failed("injected reset failure".to_string()));
            }
            s.pending = 0;
            s.phantom_pending = 0;
            Ok(())
        })
    }
}
