//! Per-device playback state
//!
//! Everything here is owned by the player thread. The queue runs from the
//! oldest unretired buffer (head) to the newest submission (tail); the play
//! cursor marks the next buffer to write and the loop anchor marks the
//! buffer that opened the active loop region.
//!
//! Byte counters:
//! - `written_total`: bytes handed to the device since the last reset
//! - `played_total`: bytes the device has actually played
//!
//! `played_total <= written_total` holds at all times.
//!
//! Every time a buffer becomes the write target a [`Segment`] is logged with
//! the loop state at that moment. The log covers every byte from the oldest
//! unplayed one onward, so a pause can put the cursor back exactly where the
//! device stopped, even several loop passes back.

use super::queue::{BufferQueue, SlotId};
use crate::buffer::WaveBuffer;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use waveout_common::{PlaybackState, WaveFormat};

#[derive(Debug)]
pub(crate) struct DeviceState {
    pub state: PlaybackState,
    pub queue: BufferQueue,
    /// Next buffer to write; `None` once everything queued has been written
    pub play: Option<SlotId>,
    /// Buffer that opened the active loop region
    pub loop_anchor: Option<SlotId>,
    /// Passes left through the active loop, including the current one
    pub loops_remaining: u32,
    /// Bytes of the play buffer already written
    pub partial_offset: usize,
    pub written_total: u64,
    pub played_total: u64,
    /// Write passes not yet fully played, oldest first
    segments: VecDeque<Segment>,
}

/// One pass of the write cursor over a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    slot: SlotId,
    /// `written_total` when the first byte of this pass was written
    written_at: u64,
    loop_anchor: Option<SlotId>,
    loops_remaining: u32,
}

impl DeviceState {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Stopped,
            queue: BufferQueue::new(),
            play: None,
            loop_anchor: None,
            loops_remaining: 0,
            partial_offset: 0,
            written_total: 0,
            played_total: 0,
            segments: VecDeque::new(),
        }
    }

    /// Link a submitted buffer at the tail.
    ///
    /// Becomes the play cursor when everything before it was already written.
    /// A stopped device starts playing; a paused one stays paused.
    pub fn enqueue(&mut self, buffer: Arc<WaveBuffer>) {
        let id = self.queue.push_back(buffer);
        if self.play.is_none() {
            self.begin_buffer(Some(id));
        }
        if self.state == PlaybackState::Stopped {
            self.state = PlaybackState::Playing;
        }
    }

    /// Make `next` the play cursor, opening a loop region if it starts one.
    pub fn begin_buffer(&mut self, next: Option<SlotId>) {
        self.play = next;
        self.partial_offset = 0;

        let Some(id) = next else { return };
        let buffer = self.queue.buffer(id);
        if buffer.loop_start() {
            if self.loop_anchor.is_some() {
                warn!(
                    "Buffer {} starts a loop while another loop is active; loop start ignored",
                    buffer.id()
                );
            } else {
                debug!("Starting loop at buffer {} ({} passes)", buffer.id(), buffer.loops());
                self.loops_remaining = buffer.loops();
                self.loop_anchor = Some(id);
            }
        }
        self.log_segment(id);
    }

    fn log_segment(&mut self, slot: SlotId) {
        self.segments.push_back(Segment {
            slot,
            written_at: self.written_total,
            loop_anchor: self.loop_anchor,
            loops_remaining: self.loops_remaining,
        });
    }

    /// Move past the fully written play buffer.
    ///
    /// At a loop end with passes remaining, jumps back to the anchor (without
    /// re-beginning it). Otherwise closes any active loop and moves on to the
    /// successor.
    pub fn advance_buffer(&mut self) {
        let Some(current) = self.play else { return };
        self.partial_offset = 0;

        let buffer = self.queue.buffer(current);
        let (loop_start, loop_end, buffer_id) = (buffer.loop_start(), buffer.loop_end(), buffer.id());

        if loop_end {
            if let Some(anchor) = self.loop_anchor {
                self.loops_remaining = self.loops_remaining.saturating_sub(1);
                if self.loops_remaining > 0 {
                    self.play = Some(anchor);
                    self.log_segment(anchor);
                    return;
                }
                if loop_start && anchor != current {
                    warn!(
                        "Buffer {} both ends and starts a loop; closing the loop only",
                        buffer_id
                    );
                }
                debug!("Loop closed at buffer {}", buffer_id);
                self.loop_anchor = None;
            }
        }

        let next = self.queue.next(current);
        self.begin_buffer(next);
    }

    /// Make the pass in flight the last one through the active loop. Passes
    /// logged for a later rewind are capped too.
    pub fn break_loop(&mut self) -> bool {
        let Some(anchor) = self.loop_anchor else { return false };
        self.loops_remaining = 1;
        for segment in self.segments.iter_mut().filter(|s| s.loop_anchor == Some(anchor)) {
            segment.loops_remaining = 1;
        }
        true
    }

    /// Record the watermark for the play buffer given the bytes it still
    /// has to write.
    pub fn stamp_watermark(&mut self) {
        if let Some(id) = self.play {
            let remaining = self.queue.buffer(id).len() - self.partial_offset;
            self.queue.set_watermark(id, self.written_total + remaining as u64);
        }
    }

    /// Whether the head buffer may be handed back now
    pub fn head_retirable(&self, force: bool) -> bool {
        match self.queue.head() {
            None => false,
            Some(_) if force => true,
            Some(head) => {
                Some(head) != self.play
                    && Some(head) != self.loop_anchor
                    && self.queue.watermark(head) <= self.played_total
            }
        }
    }

    /// Retire head buffers that have been fully played (or all of them when
    /// forced), calling `on_retire` for each in queue order.
    pub fn retire_ready(&mut self, force: bool, mut on_retire: impl FnMut(Arc<WaveBuffer>)) {
        while self.head_retirable(force) {
            match self.queue.pop_front() {
                Some(buffer) => on_retire(buffer),
                None => break,
            }
        }
    }

    /// Time until the head buffer finishes playing, if it is waiting only on
    /// the device. At least 1ms.
    pub fn next_completion(&self, format: &WaveFormat) -> Option<Duration> {
        let head = self.queue.head()?;
        if Some(head) == self.play || Some(head) == self.loop_anchor {
            return None;
        }
        let remaining = self.queue.watermark(head).saturating_sub(self.played_total);
        Some(format.bytes_to_duration(remaining).max(Duration::from_millis(1)))
    }

    /// Raise `played_total` from the device's pending count.
    ///
    /// Never moves backwards and never passes `written_total`.
    pub fn reconcile(&mut self, pending: u64) {
        let played = self.written_total.saturating_sub(pending);
        if played > self.played_total {
            self.played_total = played;
        }

        // Keep the segment holding the first unplayed byte
        while self.segments.len() > 1 && self.segments[1].written_at <= self.played_total {
            self.segments.pop_front();
        }
    }

    /// Rewind the play cursor to the first unplayed byte after the device
    /// discarded its pending data, so nothing written but unheard is lost.
    ///
    /// The loop anchor and pass counter are restored to what they were when
    /// that byte was first written.
    pub fn rewind_to_played(&mut self) {
        let played = self.played_total;
        if self.written_total == played {
            return;
        }

        let Some(index) = self.segments.iter().rposition(|s| s.written_at <= played) else {
            warn!("No write record covers byte {}; resuming from the play cursor", played);
            self.written_total = played;
            return;
        };
        self.segments.truncate(index + 1);
        let segment = self.segments[index];

        self.play = Some(segment.slot);
        self.partial_offset = (played - segment.written_at) as usize;
        self.loop_anchor = segment.loop_anchor;
        self.loops_remaining = segment.loops_remaining;
        self.written_total = played;
    }

    /// Forget all queued buffers and counters (after force-retiring them).
    pub fn clear(&mut self) {
        self.queue = BufferQueue::new();
        self.play = None;
        self.loop_anchor = None;
        self.loops_remaining = 0;
        self.partial_offset = 0;
        self.written_total = 0;
        self.played_total = 0;
        self.segments.clear();
    }
}
