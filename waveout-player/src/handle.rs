//! Output device handles
//!
//! A [`WaveOutDevice`] is the producer's side of one open device. Buffer
//! submission returns immediately; every other command blocks until the
//! player thread has executed it and returns the command's status.

use crate::buffer::WaveBuffer;
use crate::device::OutputDevice;
use crate::engine::{Player, PositionSnapshot, SharedStatus};
use crate::events::EventSink;
use crate::ring::{Command, CommandRing};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use waveout_common::config::PlayerConfig;
use waveout_common::{Error, MmTime, PlaybackState, Result, TimeFormat, WaveFormat};

/// Handle to an open output device
pub struct WaveOutDevice {
    id: Uuid,
    format: WaveFormat,
    ring: Arc<CommandRing>,
    status: Arc<SharedStatus>,
    thread: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl WaveOutDevice {
    /// Open a device and start its player thread.
    ///
    /// The `Opened` event has been delivered to `events` by the time this
    /// returns. The device starts `Stopped` with an empty queue.
    pub fn open<D, E>(format: WaveFormat, device: D, events: E, config: &PlayerConfig) -> Result<Self>
    where
        D: OutputDevice + 'static,
        E: EventSink,
    {
        format.validate()?;
        config.validate()?;

        let id = Uuid::new_v4();
        let ring = Arc::new(CommandRing::new(config.ring_increment));
        let status = Arc::new(SharedStatus::new());
        let player = Player::new(
            id,
            format,
            config.fragment_duration(),
            Arc::clone(&ring),
            Arc::clone(&status),
            Box::new(device),
            Box::new(events),
        );

        let (ready_tx, ready_rx) = sync_channel(1);
        let thread = thread::Builder::new()
            .name(format!("waveout-{}", id.simple()))
            .spawn(move || player.run(ready_tx))?;

        if ready_rx.recv().is_err() {
            let _ = thread.join();
            return Err(Error::Internal(format!("player thread for device {} failed to start", id)));
        }

        info!("Opened output device {} ({})", id, format);

        Ok(Self {
            id,
            format,
            ring,
            status,
            thread: Mutex::new(Some(thread)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn format(&self) -> WaveFormat {
        self.format
    }

    /// Last published state
    pub fn state(&self) -> PlaybackState {
        self.status.load().state
    }

    /// Last published counters, without asking the device for an update
    pub fn snapshot(&self) -> PositionSnapshot {
        self.status.load()
    }

    /// Commands posted but not yet taken by the player thread
    pub fn pending_commands(&self) -> usize {
        self.ring.len()
    }

    /// Queue a buffer for playback.
    ///
    /// Fails with `Unprepared` for an empty buffer and `StillPlaying` if the
    /// buffer is already queued. The buffer belongs to the engine until its
    /// `Done` event.
    pub fn submit(&self, buffer: &Arc<WaveBuffer>) -> Result<()> {
        self.check_open()?;
        let previous = buffer.status();
        buffer.mark_queued()?;

        if let Err(e) = self.ring.post(Command::Submit(Arc::clone(buffer))) {
            buffer.unmark_queued(previous);
            return Err(e);
        }
        debug!("Submitted buffer {} to device {}", buffer.id(), self.id);
        Ok(())
    }

    /// Stop feeding the device; unplayed audio stays queued.
    pub fn pause(&self) -> Result<()> {
        self.command(Command::Pause)
    }

    /// Resume after `pause`. No effect unless paused.
    pub fn restart(&self) -> Result<()> {
        self.command(Command::Restart)
    }

    /// Retire every queued buffer, zero the position and stop.
    pub fn reset(&self) -> Result<()> {
        self.command(Command::Reset)
    }

    /// End the active loop after the current pass.
    pub fn break_loop(&self) -> Result<()> {
        self.command(Command::BreakLoop)
    }

    /// Bytes played since the last reset, reconciled with the device.
    pub fn position(&self) -> Result<u64> {
        self.command(Command::UpdatePosition)?;
        Ok(self.status.load().played_total)
    }

    /// Playback position in the requested time format
    pub fn position_in(&self, time_format: TimeFormat) -> Result<MmTime> {
        Ok(self.format.position(self.position()?, time_format))
    }

    /// Close the device and join its player thread.
    ///
    /// Fails with `StillPlaying` while buffers are queued; reset first.
    /// Closing a device whose player thread already exited succeeds.
    pub fn close(&self) -> Result<()> {
        self.check_open()?;
        if !self.ring.is_shut() {
            self.ring.send(Command::Close)?;
        }
        self.closed.store(true, Ordering::SeqCst);
        self.join();
        info!("Closed output device {}", self.id);
        Ok(())
    }

    fn command(&self, command: Command) -> Result<()> {
        self.check_open()?;
        self.ring.send(command)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::BadDevice(format!("device {} is closed", self.id)));
        }
        Ok(())
    }

    fn join(&self) {
        if let Some(handle) = self.thread.lock().unwrap_or_else(PoisonError::into_inner).take() {
            match handle.join() {
                Ok(()) => debug!("Player thread for device {} joined", self.id),
                Err(e) => error!("Player thread for device {} panicked: {:?}", self.id, e),
            }
        }
    }
}

impl Drop for WaveOutDevice {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) && !self.ring.is_shut() {
            warn!("Device {} dropped without close; resetting", self.id);
            if let Err(e) = self.ring.send(Command::Reset) {
                debug!("Reset on drop failed: {}", e);
            }
            if let Err(e) = self.ring.send(Command::Close) {
                debug!("Close on drop failed: {}", e);
            }
        }
        self.join();
    }
}

impl std::fmt::Debug for WaveOutDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveOutDevice")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("status", &self.status.load())
            .finish()
    }
}
