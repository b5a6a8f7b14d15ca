//! Queued-buffer arena
//!
//! Buffers owned by the engine live in a slab of slots linked in submission
//! order. The engine refers to buffers by slot index (play cursor, loop
//! anchor), which stays valid until the buffer is popped from the head.

use crate::buffer::WaveBuffer;
use std::sync::Arc;

pub(crate) type SlotId = usize;

#[derive(Debug)]
struct Slot {
    buffer: Arc<WaveBuffer>,
    next: Option<SlotId>,
    /// Value `played_total` must reach for the buffer to be fully heard
    watermark: u64,
}

#[derive(Debug, Default)]
pub(crate) struct BufferQueue {
    slots: Vec<Option<Slot>>,
    free: Vec<SlotId>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

impl BufferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a buffer at the tail and return its slot.
    pub fn push_back(&mut self, buffer: Arc<WaveBuffer>) -> SlotId {
        let slot = Slot {
            buffer,
            next: None,
            watermark: 0,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(slot);
                id
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };

        match self.tail {
            Some(tail) => self.slot_mut(tail).next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
        id
    }

    /// Unlink the head buffer and release its slot.
    pub fn pop_front(&mut self) -> Option<Arc<WaveBuffer>> {
        let id = self.head?;
        let slot = self.slots[id].take()?;
        self.head = slot.next;
        if self.head.is_none() {
            self.tail = None;
        }
        self.free.push(id);
        self.len -= 1;
        Some(slot.buffer)
    }

    pub fn head(&self) -> Option<SlotId> {
        self.head
    }

    pub fn next(&self, id: SlotId) -> Option<SlotId> {
        self.slot(id).next
    }

    pub fn buffer(&self, id: SlotId) -> &Arc<WaveBuffer> {
        &self.slot(id).buffer
    }

    pub fn watermark(&self, id: SlotId) -> u64 {
        self.slot(id).watermark
    }

    pub fn set_watermark(&mut self, id: SlotId, watermark: u64) {
        self.slot_mut(id).watermark = watermark;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slots from head to tail
    pub fn iter(&self) -> impl Iterator<Item = SlotId> + '_ {
        std::iter::successors(self.head, move |&id| self.next(id))
    }

    fn slot(&self, id: SlotId) -> &Slot {
        self.slots[id]
            .as_ref()
            .expect("slot handle must refer to a queued buffer")
    }

    fn slot_mut(&mut self, id: SlotId) -> &mut Slot {
        self.slots[id]
            .as_mut()
            .expect("slot handle must refer to a queued buffer")
    }
}
