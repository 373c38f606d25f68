//! Engine-private per-device runtime state

use std::collections::HashMap;

use super::note_off::NoteOffHandle;
use crate::mapping::SensorKey;

/// Smoothing accumulators and edge state for one device.
///
/// Never persisted; rebuilt from scratch when a device reappears.
#[derive(Debug, Default)]
pub struct RuntimeState {
    smoothed: HashMap<SensorKey, f64>,
    last_values: HashMap<SensorKey, f64>,
    /// Tap flag seen on the previous tick
    pub previous_tap: bool,
    pub(crate) pending_note_offs: Vec<NoteOffHandle>,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last output of the smoothing filter for a key
    pub fn smoothed(&self, key: SensorKey) -> Option<f64> {
        self.smoothed.get(&key).copied()
    }

    pub(crate) fn store_smoothed(&mut self, key: SensorKey, value: f64) {
        self.smoothed.insert(key, value);
    }

    /// Last value sent for a key, before rounding
    pub fn last_value(&self, key: SensorKey) -> Option<f64> {
        self.last_values.get(&key).copied()
    }

    pub(crate) fn store_last_value(&mut self, key: SensorKey, value: f64) {
        self.last_values.insert(key, value);
    }

    /// Handles of Note-Offs scheduled for this device and not yet fired
    pub fn pending_note_offs(&self) -> &[NoteOffHandle] {
        &self.pending_note_offs
    }
}
