//! Ring-buffered queue of timestamped MIDI events (`spec.md` §4.7).
//!
//! Short messages are stored inline; Sysex payloads are appended to a
//! separate byte arena and the queue entry records only their `(offset,
//! len)` range, so a burst of Sysex data can't force short messages out
//! of their slots. Single-producer/single-consumer: the caller pushes
//! from `play_msg`/`play_sysex` and drains from `render`, never both at
//! once.

use crate::constants::{MAX_SYSEX_LEN, MIDI_QUEUE_CAPACITY};
use crate::midi::{MidiEvent, ShortMessage};
use crate::{MT32Error, Result};

#[derive(Clone, Copy, Debug)]
enum QueuedKind {
    Short(ShortMessage),
    Sysex { offset: usize, len: usize },
}

#[derive(Clone, Copy, Debug)]
struct QueuedEvent {
    timestamp: u32,
    kind: QueuedKind,
}

/// Fixed-capacity ring buffer of pending MIDI events, with a side arena
/// for Sysex payload bytes.
///
/// Capacity is rounded up to a power of two so the read/write cursors
/// can wrap with a mask instead of a modulo.
#[derive(Clone, Debug)]
pub struct MidiEventQueue {
    slots: Vec<Option<QueuedEvent>>,
    mask: usize,
    write_pos: usize,
    read_pos: usize,
    len: usize,
    sysex_arena: Vec<u8>,
}

impl MidiEventQueue {
    /// Builds a queue sized to [`MIDI_QUEUE_CAPACITY`] (rounded up to a
    /// power of two).
    pub fn new() -> Self {
        Self::with_capacity(MIDI_QUEUE_CAPACITY)
    }

    /// Builds a queue with the given minimum capacity.
    pub fn with_capacity(requested_capacity: usize) -> Self {
        let capacity = requested_capacity.max(1).next_power_of_two();
        MidiEventQueue {
            slots: vec![None; capacity],
            mask: capacity - 1,
            write_pos: 0,
            read_pos: 0,
            len: 0,
            sysex_arena: Vec::with_capacity(MAX_SYSEX_LEN * 4),
        }
    }

    /// Total slot capacity.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of events currently queued.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if no events are queued.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` if the queue has no room for another event.
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Queues a short message at `timestamp`.
    ///
    /// # Errors
    /// Returns [`MT32Error::MidiQueueFull`] if the queue has no free slot.
    pub fn push_short(&mut self, timestamp: u32, message: ShortMessage) -> Result<()> {
        self.push(timestamp, QueuedKind::Short(message))
    }

    /// Queues a Sysex payload (framing bytes excluded) at `timestamp`,
    /// copying `payload` into the side arena.
    ///
    /// # Errors
    /// Returns [`MT32Error::MidiQueueFull`] if the queue has no free slot.
    pub fn push_sysex(&mut self, timestamp: u32, payload: &[u8]) -> Result<()> {
        let offset = self.sysex_arena.len();
        let kind = QueuedKind::Sysex { offset, len: payload.len() };
        self.push(timestamp, kind)?;
        self.sysex_arena.extend_from_slice(payload);
        Ok(())
    }

    fn push(&mut self, timestamp: u32, kind: QueuedKind) -> Result<()> {
        if self.is_full() {
            return Err(MT32Error::MidiQueueFull);
        }
        let idx = self.write_pos & self.mask;
        self.slots[idx] = Some(QueuedEvent { timestamp, kind });
        self.write_pos = self.write_pos.wrapping_add(1);
        self.len += 1;
        Ok(())
    }

    /// Pops the oldest queued event, if any, along with its timestamp.
    pub fn pop(&mut self) -> Option<(u32, MidiEvent)> {
        if self.is_empty() {
            return None;
        }
        let idx = self.read_pos & self.mask;
        let queued = self.slots[idx].take()?;
        self.read_pos = self.read_pos.wrapping_add(1);
        self.len -= 1;

        let event = match queued.kind {
            QueuedKind::Short(message) => MidiEvent::Short(message),
            QueuedKind::Sysex { offset, len } => {
                MidiEvent::Sysex(self.sysex_arena[offset..offset + len].to_vec())
            }
        };

        if self.is_empty() {
            // Nothing left referencing earlier Sysex bytes; reclaim the arena.
            self.sysex_arena.clear();
        }
        Some((queued.timestamp, event))
    }

    /// Drops every queued event without processing them (used by
    /// `Synth::close`/`open` to reset ingest state).
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.write_pos = 0;
        self.read_pos = 0;
        self.len = 0;
        self.sysex_arena.clear();
    }
}

impl Default for MidiEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        let q = MidiEventQueue::with_capacity(1000);
        assert_eq!(q.capacity(), 1024);
    }

    #[test]
    fn fifo_order_preserved() {
        let mut q = MidiEventQueue::with_capacity(4);
        q.push_short(0, ShortMessage::from_packed(0x00_3c_90)).unwrap();
        q.push_short(1, ShortMessage::from_packed(0x00_3e_90)).unwrap();

        let (ts0, ev0) = q.pop().unwrap();
        assert_eq!(ts0, 0);
        assert_eq!(ev0, MidiEvent::Short(ShortMessage::from_packed(0x00_3c_90)));

        let (ts1, _) = q.pop().unwrap();
        assert_eq!(ts1, 1);
        assert!(q.is_empty());
    }

    #[test]
    fn full_queue_rejects_further_pushes() {
        let mut q = MidiEventQueue::with_capacity(2);
        q.push_short(0, ShortMessage::from_packed(0)).unwrap();
        q.push_short(0, ShortMessage::from_packed(0)).unwrap();
        let result = q.push_short(0, ShortMessage::from_packed(0));
        assert!(matches!(result, Err(MT32Error::MidiQueueFull)));
    }

    #[test]
    fn sysex_payload_round_trips_through_side_arena() {
        let mut q = MidiEventQueue::with_capacity(4);
        let payload = vec![0x41, 0x10, 0x16, 0x12];
        q.push_sysex(5, &payload).unwrap();
        let (ts, event) = q.pop().unwrap();
        assert_eq!(ts, 5);
        assert_eq!(event, MidiEvent::Sysex(payload));
    }

    #[test]
    fn wraps_around_ring_without_losing_events() {
        let mut q = MidiEventQueue::with_capacity(2);
        for i in 0..8u32 {
            q.push_short(i, ShortMessage::from_packed(0)).unwrap();
            let (ts, _) = q.pop().unwrap();
            assert_eq!(ts, i);
        }
        assert!(q.is_empty());
    }
}
