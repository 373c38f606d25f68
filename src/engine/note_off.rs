//! Scheduled Note-Off tasks
//!
//! A tap sends its Note On immediately and leaves a Note Off here, due after
//! the mapping's duration. The tick polls due entries. Every entry has a
//! handle so it can be cancelled before it fires.

use std::time::Instant;
use tracing::trace;

/// Cancellation handle for a scheduled Note-Off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteOffHandle(u64);

/// A Note-Off waiting for its due time
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledNoteOff {
    pub handle: NoteOffHandle,
    pub device_id: String,
    pub note: u8,
    /// 1-based MIDI channel
    pub channel: u8,
    pub due: Instant,
}

/// Queue of pending Note-Offs
#[derive(Debug, Default)]
pub struct NoteOffScheduler {
    next_id: u64,
    pending: Vec<ScheduledNoteOff>,
}

impl NoteOffScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, device_id: &str, note: u8, channel: u8, due: Instant) -> NoteOffHandle {
        let handle = NoteOffHandle(self.next_id);
        self.next_id += 1;
        self.pending.push(ScheduledNoteOff {
            handle,
            device_id: device_id.to_string(),
            note,
            channel,
            due,
        });
        trace!("Scheduled Note-Off {:?} for {} note {}", handle, device_id, note);
        handle
    }

    /// Cancel one entry; false if it already fired or was cancelled
    pub fn cancel(&mut self, handle: NoteOffHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.handle != handle);
        before != self.pending.len()
    }

    /// Cancel everything; returns how many entries were dropped
    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Remove and return entries due at `now`, oldest first
    pub fn take_due(&mut self, now: Instant) -> Vec<ScheduledNoteOff> {
        let (mut due, keep): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = keep;
        due.sort_by_key(|p| p.due);
        due
    }

    /// Remove and return every entry regardless of due time, oldest first
    pub fn drain_all(&mut self) -> Vec<ScheduledNoteOff> {
        let mut all = std::mem::take(&mut self.pending);
        all.sort_by_key(|p| p.due);
        all
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
