//! Command ring between producers and the player thread
//!
//! Producers post commands; the player thread drains them between feed
//! passes. Two delivery modes:
//!
//! - **Posted** (buffer submissions): appended at the back, caller returns
//!   immediately.
//! - **Sent** (control commands): inserted at the front so they overtake any
//!   pending submissions, and the caller blocks until the player thread
//!   replies with the command's status.
//!
//! The ring grows by a configured increment when full. Growth that cannot be
//! allocated is reported as `ResourceExhausted` instead of aborting.

use crate::buffer::WaveBuffer;
use std::collections::VecDeque;
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};
use waveout_common::{Error, Result};

/// Commands understood by the player thread
#[derive(Debug, Clone)]
pub enum Command {
    Pause,
    Restart,
    Reset,
    Submit(Arc<WaveBuffer>),
    UpdatePosition,
    BreakLoop,
    Close,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Pause => "Pause",
            Command::Restart => "Restart",
            Command::Reset => "Reset",
            Command::Submit(_) => "Submit",
            Command::UpdatePosition => "UpdatePosition",
            Command::BreakLoop => "BreakLoop",
            Command::Close => "Close",
        }
    }
}

/// One queued command, with the reply channel for sent commands
#[derive(Debug)]
pub struct Message {
    pub command: Command,
    pub reply: Option<SyncSender<Result<()>>>,
}

impl Message {
    /// Deliver the command's status to a blocked sender, if any.
    pub fn acknowledge(self, status: Result<()>) {
        if let Some(reply) = self.reply {
            // Sender may have given up (device handle dropped); nothing to do then
            let _ = reply.send(status);
        }
    }
}

struct RingState {
    messages: VecDeque<Message>,
    /// Set once the player thread has exited
    shut: bool,
}

/// Growable MPSC command queue with priority insertion
pub struct CommandRing {
    state: Mutex<RingState>,
    wake: Condvar,
    increment: usize,
}

impl CommandRing {
    /// Create a ring with `increment` initial slots, growing by the same amount.
    pub fn new(increment: usize) -> Self {
        let increment = increment.max(1);
        Self {
            state: Mutex::new(RingState {
                messages: VecDeque::with_capacity(increment),
                shut: false,
            }),
            wake: Condvar::new(),
            increment,
        }
    }

    /// Append a command and return without waiting for it to be processed.
    pub fn post(&self, command: Command) -> Result<()> {
        self.insert(Message { command, reply: None }, false)
    }

    /// Insert a command ahead of pending submissions and block until the
    /// player thread has processed it. Returns the command's status.
    pub fn send(&self, command: Command) -> Result<()> {
        let name = command.name();
        let (tx, rx) = sync_channel(1);
        self.insert(
            Message {
                command,
                reply: Some(tx),
            },
            true,
        )?;

        match rx.recv() {
            Ok(status) => status,
            // Player thread dropped the message without answering
            Err(_) => Err(Error::DeviceGone(format!("player exited before answering {}", name))),
        }
    }

    fn insert(&self, message: Message, front: bool) -> Result<()> {
        {
            let mut state = self.lock();
            if state.shut {
                return Err(Error::DeviceGone(format!(
                    "player thread has exited, cannot deliver {}",
                    message.command.name()
                )));
            }

            if state.messages.len() == state.messages.capacity() {
                state.messages.try_reserve(self.increment).map_err(|e| {
                    Error::ResourceExhausted(format!(
                        "command ring cannot grow past {} slots: {}",
                        state.messages.capacity(),
                        e
                    ))
                })?;
                debug!("Command ring grown to {} slots", state.messages.capacity());
            }

            if front {
                if let Some(ahead) = state.messages.front() {
                    if !matches!(ahead.command, Command::Submit(_)) {
                        warn!(
                            "Two control commands queued back to back ({} ahead of {})",
                            message.command.name(),
                            ahead.command.name()
                        );
                    }
                }
                state.messages.push_front(message);
            } else {
                state.messages.push_back(message);
            }
        }

        self.wake.notify_one();
        Ok(())
    }

    /// Pop the next command, if any
    pub fn receive(&self) -> Option<Message> {
        self.lock().messages.pop_front()
    }

    /// Block until a command is available, the timeout expires, or the ring
    /// is shut. `None` waits indefinitely.
    pub fn wait(&self, timeout: Option<Duration>) {
        let state = self.lock();
        match timeout {
            Some(timeout) => {
                let _unused = self
                    .wake
                    .wait_timeout_while(state, timeout, |s| s.messages.is_empty() && !s.shut)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            None => {
                let _unused = self
                    .wake
                    .wait_while(state, |s| s.messages.is_empty() && !s.shut)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }

    /// Remove every pending submission, leaving control commands in place.
    pub fn drain_submissions(&self) -> Vec<Message> {
        let mut state = self.lock();
        let (taken, kept): (VecDeque<_>, VecDeque<_>) = state
            .messages
            .drain(..)
            .partition(|m| matches!(m.command, Command::Submit(_)));
        state.messages = kept;
        taken.into()
    }

    /// Refuse further commands and hand back whatever is still queued.
    ///
    /// Called by the player thread on its way out.
    pub fn shut(&self) -> Vec<Message> {
        let remaining = {
            let mut state = self.lock();
            state.shut = true;
            state.messages.drain(..).collect()
        };
        self.wake.notify_all();
        remaining
    }

    /// Whether any buffer submission is still waiting to be processed
    pub fn has_submissions(&self) -> bool {
        self.lock()
            .messages
            .iter()
            .any(|m| matches!(m.command, Command::Submit(_)))
    }

    pub fn is_shut(&self) -> bool {
        self.lock().shut
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().messages.capacity()
    }

    /// The queue stays consistent even if a holder panicked
    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
