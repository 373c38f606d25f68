//! Debounced field edits
//!
//! Typed edits to some fields are held until the user stops typing. Each
//! `(device, key, field)` slot keeps only its latest value; every new
//! keystroke replaces the value and restarts the quiet period. The owner
//! polls [`FieldDebouncer::take_due`] from its tick.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

use super::{MappingField, SensorKey};

/// Default quiet period before a typed value is committed
pub const DEFAULT_QUIET_MS: u64 = 1000;

type SlotKey = (String, SensorKey, MappingField);

struct Slot {
    value: f64,
    due: Instant,
}

/// An edit whose quiet period has elapsed
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEdit {
    pub device_id: String,
    pub key: SensorKey,
    pub field: MappingField,
    pub value: f64,
}

/// Per-field cancel-and-restart debouncer
pub struct FieldDebouncer {
    quiet: Duration,
    slots: HashMap<SlotKey, Slot>,
}

impl FieldDebouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            slots: HashMap::new(),
        }
    }

    /// Record a typed value, replacing any pending one for the same field
    pub fn schedule(
        &mut self,
        device_id: &str,
        key: SensorKey,
        field: MappingField,
        value: f64,
        now: Instant,
    ) {
        let due = now + self.quiet;
        let replaced = self
            .slots
            .insert((device_id.to_string(), key, field), Slot { value, due })
            .is_some();
        trace!(
            "Debounce {} {}.{} = {} (restart: {})",
            device_id,
            key,
            field,
            value,
            replaced
        );
    }

    /// Remove and return every edit whose quiet period has elapsed
    pub fn take_due(&mut self, now: Instant) -> Vec<PendingEdit> {
        let mut due: Vec<(Instant, PendingEdit)> = Vec::new();
        self.slots.retain(|(device_id, key, field), slot| {
            if slot.due <= now {
                due.push((
                    slot.due,
                    PendingEdit {
                        device_id: device_id.clone(),
                        key: *key,
                        field: *field,
                        value: slot.value,
                    },
                ));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(at, _)| *at);
        due.into_iter().map(|(_, edit)| edit).collect()
    }

    /// Remove and return every pending edit regardless of timing
    pub fn flush_all(&mut self) -> Vec<PendingEdit> {
        let mut all: Vec<(Instant, PendingEdit)> = self
            .slots
            .drain()
            .map(|((device_id, key, field), slot)| {
                (
                    slot.due,
                    PendingEdit {
                        device_id,
                        key,
                        field,
                        value: slot.value,
                    },
                )
            })
            .collect();
        all.sort_by_key(|(at, _)| *at);
        all.into_iter().map(|(_, edit)| edit).collect()
    }

    /// Drop pending edits without committing them
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for FieldDebouncer {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_QUIET_MS))
    }
}
