//! Player thread
//!
//! Each pass of the loop:
//! 1. Sleep until the earlier of the feed deadline and the completion
//!    deadline, or until a command arrives.
//! 2. Drain and execute every queued command.
//! 3. While playing: write as much queued audio as the device accepts, then
//!    retire buffers the device has finished playing.
//! 4. When everything queued has been written, drain the device so the tail
//!    of the stream completes without waiting for more submissions.
//!
//! Device failures force an implicit reset. If the device cannot even be
//! reset, the device is closed and the thread exits.

use super::state::DeviceState;
use super::{PositionSnapshot, SharedStatus};
use crate::buffer::WaveBuffer;
use crate::device::{DeviceError, OutputDevice};
use crate::events::EventSink;
use crate::ring::{Command, CommandRing};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;
use waveout_common::{Error, OutputEvent, PlaybackState, Result, WaveFormat};

enum Flow {
    Continue,
    Exit,
}

pub(crate) struct Player {
    device_id: Uuid,
    format: WaveFormat,
    fragment: Duration,
    ring: Arc<CommandRing>,
    status: Arc<SharedStatus>,
    device: Box<dyn OutputDevice>,
    events: Box<dyn EventSink>,
    st: DeviceState,
    finished: bool,
}

impl Player {
    pub fn new(
        device_id: Uuid,
        format: WaveFormat,
        fragment: Duration,
        ring: Arc<CommandRing>,
        status: Arc<SharedStatus>,
        device: Box<dyn OutputDevice>,
        events: Box<dyn EventSink>,
    ) -> Self {
        Self {
            device_id,
            format,
            fragment,
            ring,
            status,
            device,
            events,
            st: DeviceState::new(),
            finished: false,
        }
    }

    /// Thread body. Signals `ready` once the `Opened` event has been emitted.
    pub fn run(mut self, ready: SyncSender<()>) {
        info!("Player thread started for device {}", self.device_id);
        self.publish();
        self.events.notify(OutputEvent::opened(self.device_id));
        let _ = ready.send(());

        let mut next_feed: Option<Duration> = None;
        let mut next_completion: Option<Duration> = None;

        loop {
            let sleep = earliest(next_feed, next_completion);
            trace!("Player {} waiting {:?}", self.device_id, sleep);
            self.ring.wait(sleep);

            if let Flow::Exit = self.process_messages() {
                break;
            }

            if self.st.state != PlaybackState::Playing {
                next_feed = None;
                next_completion = None;
                continue;
            }

            next_feed = match self.feed() {
                Ok(deadline) => deadline,
                Err(e) => {
                    if let Flow::Exit = self.recover(e) {
                        break;
                    }
                    None
                }
            };
            next_completion = self.notify_completions(false);

            // Everything written: let the tail play out unless more commands
            // are already waiting
            if next_feed.is_none()
                && self.st.state == PlaybackState::Playing
                && self.st.written_total > self.st.played_total
                && self.ring.is_empty()
            {
                self.drain();
                next_completion = self.notify_completions(false);
            }

            self.publish();
        }

        self.finish();
        info!("Player thread for device {} exiting", self.device_id);
    }

    fn process_messages(&mut self) -> Flow {
        while let Some(message) = self.ring.receive() {
            trace!("Player {} received {}", self.device_id, message.command.name());

            let (status, flow) = self.execute(&message.command);
            self.publish();
            message.acknowledge(status);

            if let Flow::Exit = flow {
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    fn execute(&mut self, command: &Command) -> (Result<()>, Flow) {
        match command {
            Command::Submit(buffer) => {
                debug!(
                    "Queueing buffer {} ({} bytes) on device {}",
                    buffer.id(),
                    buffer.len(),
                    self.device_id
                );
                self.st.enqueue(Arc::clone(buffer));
                (Ok(()), Flow::Continue)
            }
            Command::Pause => match self.pause() {
                Ok(()) => (Ok(()), Flow::Continue),
                Err(e) => self.fail(e),
            },
            Command::Restart => {
                if self.st.state == PlaybackState::Paused {
                    debug!("Restarting device {}", self.device_id);
                    self.st.state = PlaybackState::Playing;
                }
                (Ok(()), Flow::Continue)
            }
            Command::Reset => match self.reset() {
                Ok(()) => (Ok(()), Flow::Continue),
                Err(e) => self.fail(e),
            },
            Command::UpdatePosition => match self.reconcile() {
                Ok(()) => (Ok(()), Flow::Continue),
                Err(e) => (Ok(()), self.recover(e)),
            },
            Command::BreakLoop => {
                if self.st.break_loop() {
                    debug!("Breaking loop on device {}", self.device_id);
                }
                (Ok(()), Flow::Continue)
            }
            Command::Close => self.close(),
        }
    }

    /// Write queued audio until the device is full or the queue is exhausted.
    ///
    /// Returns when to try again, or `None` when nothing is left to write.
    fn feed(&mut self) -> std::result::Result<Option<Duration>, DeviceError> {
        self.reconcile()?;
        if self.st.play.is_none() {
            return Ok(None);
        }

        let mut available = match self.device.capacity_available() {
            Ok(n) => n,
            Err(DeviceError::WouldBlock) => 0,
            Err(e) => return Err(e),
        };

        while available > 0 {
            let Some(id) = self.st.play else { break };
            self.st.stamp_watermark();

            let buffer = Arc::clone(self.st.queue.buffer(id));
            let remaining = &buffer.data()[self.st.partial_offset..];
            let chunk = remaining.len().min(available);

            let accepted = match self.device.write(&remaining[..chunk]) {
                Ok(n) => n.min(chunk),
                Err(DeviceError::WouldBlock) => 0,
                Err(e) => return Err(e),
            };
            if accepted == 0 {
                break;
            }

            self.st.written_total += accepted as u64;
            available -= accepted;
            if accepted == remaining.len() {
                self.st.advance_buffer();
            } else {
                self.st.partial_offset += accepted;
            }
        }

        trace!(
            "Device {} fed: written={} played={}",
            self.device_id,
            self.st.written_total,
            self.st.played_total
        );
        Ok(self.st.play.map(|_| self.fragment))
    }

    /// Update `played_total` from the device's pending count.
    fn reconcile(&mut self) -> std::result::Result<(), DeviceError> {
        let pending = match self.device.pending_bytes() {
            Ok(n) => n as u64,
            Err(DeviceError::WouldBlock) => return Ok(()),
            Err(e) => return Err(e),
        };

        let outstanding = self.st.written_total - self.st.played_total;
        if pending > outstanding {
            return Err(DeviceError::Desync(format!(
                "device reports {} bytes pending but only {} are outstanding",
                pending, outstanding
            )));
        }
        self.st.reconcile(pending);
        Ok(())
    }

    /// Retire finished buffers and return when the next one completes.
    fn notify_completions(&mut self, force: bool) -> Option<Duration> {
        let device_id = self.device_id;
        let events = &mut self.events;
        self.st
            .retire_ready(force, |buffer| hand_back(device_id, &mut **events, buffer));
        self.st.next_completion(&self.format)
    }

    fn drain(&mut self) {
        debug!(
            "Device {} queue exhausted, draining {} bytes",
            self.device_id,
            self.st.written_total - self.st.played_total
        );
        if let Err(e) = self.device.flush_and_drain() {
            warn!("Device {} drain failed: {}", self.device_id, e);
        }
        self.st.played_total = self.st.written_total;
    }

    /// Stop feeding and discard device data, keeping every unplayed byte
    /// queued for Restart.
    fn pause(&mut self) -> std::result::Result<(), DeviceError> {
        if let Err(e) = self.reconcile() {
            warn!("Device {} position unavailable while pausing: {}", self.device_id, e);
        }
        self.notify_completions(false);
        self.device.reset()?;
        self.st.rewind_to_played();
        self.st.state = PlaybackState::Paused;
        debug!(
            "Device {} paused at {} bytes",
            self.device_id, self.st.played_total
        );
        Ok(())
    }

    /// Retire every queued buffer (and pending submissions), zero the
    /// counters and stop.
    fn reset(&mut self) -> std::result::Result<(), DeviceError> {
        if let Err(e) = self.reconcile() {
            debug!("Device {} position unavailable while resetting: {}", self.device_id, e);
        }
        self.notify_completions(false);
        let result = self.device.reset();

        self.notify_completions(true);
        for message in self.ring.drain_submissions() {
            if let Command::Submit(buffer) = &message.command {
                hand_back(self.device_id, &mut *self.events, Arc::clone(buffer));
            }
            message.acknowledge(Ok(()));
        }

        self.st.clear();
        self.st.state = PlaybackState::Stopped;
        debug!("Device {} reset", self.device_id);
        result
    }

    /// Answer Close: refused while buffers are still queued.
    fn close(&mut self) -> (Result<()>, Flow) {
        let queued = self.st.queue.len();
        if queued > 0 || self.ring.has_submissions() {
            error!(
                "Device {} asked to close with {} buffers still queued",
                self.device_id, queued
            );
            return (
                Err(Error::StillPlaying(format!(
                    "{} buffers still queued on device {}",
                    queued, self.device_id
                ))),
                Flow::Continue,
            );
        }

        info!("Closing device {}", self.device_id);
        self.finish();
        (Ok(()), Flow::Exit)
    }

    /// Recover from a device failure by forcing a reset.
    fn recover(&mut self, err: DeviceError) -> Flow {
        error!("Device {} failed: {} - forcing reset", self.device_id, err);
        match self.reset() {
            Ok(()) => Flow::Continue,
            Err(reset_err) => {
                self.abandon(&reset_err);
                Flow::Exit
            }
        }
    }

    /// A command could not complete because the device cannot be reset.
    fn fail(&mut self, err: DeviceError) -> (Result<()>, Flow) {
        self.abandon(&err);
        (
            Err(Error::DeviceGone(format!("device reset failed: {}", err))),
            Flow::Exit,
        )
    }

    fn abandon(&mut self, err: &DeviceError) {
        error!("Device {} is unusable ({}), closing", self.device_id, err);
        self.notify_completions(true);
        self.st.clear();
        self.finish();
    }

    /// Shut the ring, hand back anything still submitted and emit `Closed`.
    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        for message in self.ring.shut() {
            if let Command::Submit(buffer) = &message.command {
                hand_back(self.device_id, &mut *self.events, Arc::clone(buffer));
            }
            message.acknowledge(Err(Error::DeviceGone(format!(
                "device {} closed",
                self.device_id
            ))));
        }

        self.st.state = PlaybackState::Closed;
        self.publish();
        self.events.notify(OutputEvent::closed(self.device_id));
    }

    fn publish(&self) {
        self.status.store(PositionSnapshot {
            state: self.st.state,
            played_total: self.st.played_total,
            written_total: self.st.written_total,
            queued: self.st.queue.len(),
        });
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        // Only reached without finish() if the thread is unwinding
        if !self.finished {
            error!("Player thread for device {} terminated abnormally", self.device_id);
            drop(self.ring.shut());
            self.st.state = PlaybackState::Closed;
            self.publish();
        }
    }
}

fn hand_back(device_id: Uuid, events: &mut dyn EventSink, buffer: Arc<WaveBuffer>) {
    buffer.mark_done();
    debug!("Buffer {} done on device {}", buffer.id(), device_id);
    events.notify(OutputEvent::done(device_id, buffer.id()));
}

fn earliest(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earliest_deadline() {
        let short = Some(Duration::from_millis(5));
        let long = Some(Duration::from_millis(50));
        assert_eq!(earliest(short, long), short);
        assert_eq!(earliest(long, short), short);
        assert_eq!(earliest(None, long), long);
        assert_eq!(earliest(short, None), short);
        assert_eq!(earliest(None, None), None);
    }
}
