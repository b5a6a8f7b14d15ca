//! Event delivery to producers
//!
//! The player thread owns one [`EventSink`] per device and calls it for every
//! `Opened`, `Done` and `Closed` event, in emission order. Sinks run on the
//! player thread and should return quickly.

use std::sync::mpsc;
use tracing::trace;
use waveout_common::OutputEvent;

/// Receiver of device events
pub trait EventSink: Send + 'static {
    fn notify(&mut self, event: OutputEvent);
}

/// Discards all events (producers polling buffer status instead)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvents;

impl EventSink for NoEvents {
    fn notify(&mut self, event: OutputEvent) {
        trace!("Dropping {} event", event.event_type());
    }
}

/// Calls a closure for every event
pub struct CallbackSink<F>(F);

/// Wrap a closure as an event sink.
pub fn callback<F>(f: F) -> CallbackSink<F>
where
    F: FnMut(OutputEvent) + Send + 'static,
{
    CallbackSink(f)
}

impl<F> EventSink for CallbackSink<F>
where
    F: FnMut(OutputEvent) + Send + 'static,
{
    fn notify(&mut self, event: OutputEvent) {
        (self.0)(event)
    }
}

// A disconnected receiver means the producer stopped listening; events are dropped.

impl EventSink for mpsc::Sender<OutputEvent> {
    fn notify(&mut self, event: OutputEvent) {
        let _ = self.send(event);
    }
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<OutputEvent> {
    fn notify(&mut self, event: OutputEvent) {
        let _ = self.send(event);
    }
}

impl EventSink for tokio::sync::broadcast::Sender<OutputEvent> {
    fn notify(&mut self, event: OutputEvent) {
        let _ = self.send(event);
    }
}

impl EventSink for Box<dyn EventSink> {
    fn notify(&mut self, event: OutputEvent) {
        (**self).notify(event)
    }
}
