//! Recording event sinks
//!
//! `GatedLog` additionally holds the player thread inside `Done`
//! notifications until its gate is opened, so a test can queue commands
//! behind a busy player.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;
use waveout_player::{EventSink, OutputEvent};

#[derive(Debug, Clone, Default)]
pub struct EventLog {
    inner: Arc<(Mutex<Vec<OutputEvent>>, Condvar)>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.inner.0.lock().unwrap().clone()
    }

    pub fn types(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.event_type()).collect()
    }

    pub fn done_ids(&self) -> Vec<Uuid> {
        self.events().iter().filter_map(|e| e.buffer_id()).collect()
    }

    /// Wait until `pred` holds for the recorded events. Returns false on timeout.
    pub fn wait_for(&self, timeout: Duration, pred: impl Fn(&[OutputEvent]) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.inner;
        let mut events = lock.lock().unwrap();
        loop {
            if pred(&events) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            events = cvar.wait_timeout(events, deadline - now).unwrap().0;
        }
    }

    /// Wait for `count` Done events.
    pub fn wait_for_done(&self, count: usize, timeout: Duration) -> bool {
        self.wait_for(timeout, |events| {
            events.iter().filter(|e| e.buffer_id().is_some()).count() >= count
        })
    }
}

impl EventSink for EventLog {
    fn notify(&mut self, event: OutputEvent) {
        let (lock, cvar) = &*self.inner;
        lock.lock().unwrap().push(event);
        cvar.notify_all();
    }
}

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    held: bool,
}

/// Blocks whoever passes through it until opened
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl Gate {
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().unwrap().open = true;
        cvar.notify_all();
    }

    /// Wait until a thread is blocked at the gate. Returns false on timeout.
    pub fn wait_until_held(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap();
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |state| !state.held)
            .unwrap();
        guard.held
    }

    fn pass(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap();
        if !state.open {
            state.held = true;
            cvar.notify_all();
            state = cvar.wait_while(state, |state| !state.open).unwrap();
            state.held = false;
        }
    }
}

/// Event log whose `Done` notifications wait at a gate
#[derive(Debug, Clone)]
pub struct GatedLog {
    pub log: EventLog,
    pub gate: Gate,
}

impl GatedLog {
    pub fn new() -> Self {
        Self {
            log: EventLog::new(),
            gate: Gate::closed(),
        }
    }
}

impl EventSink for GatedLog {
    fn notify(&mut self, event: OutputEvent) {
        if event.buffer_id().is_some() {
            self.gate.pass();
        }
        self.log.notify(event);
    }
}
