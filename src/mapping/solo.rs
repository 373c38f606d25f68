//! Mute/solo for a device's mappings
//!
//! Soloing a mapping remembers every sibling's enabled flag and leaves only
//! the soloed mapping enabled. Unsoloing restores the remembered flags. There
//! is one snapshot per device, not a stack: soloing a second mapping before
//! unsoloing the first overwrites the snapshot.

use std::collections::HashMap;
use tracing::debug;

use super::{MappingStore, SensorKey};

/// Enabled flags captured when solo was switched on, per device
#[derive(Debug, Clone, Default)]
pub struct SoloSnapshots {
    snapshots: HashMap<String, [bool; 5]>,
}

impl SoloSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_snapshot(&self, device_id: &str) -> bool {
        self.snapshots.contains_key(device_id)
    }

    /// Forget every snapshot (e.g. after a preset import)
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    /// Switch solo on or off for one mapping
    pub fn toggle(&mut self, store: &mut MappingStore, device_id: &str, key: SensorKey, on: bool) {
        if on {
            self.solo_on(store, device_id, key);
        } else {
            self.solo_off(store, device_id, key);
        }
    }

    fn solo_on(&mut self, store: &mut MappingStore, device_id: &str, key: SensorKey) {
        let mappings = store.ensure(device_id);
        self.snapshots
            .insert(device_id.to_string(), mappings.enabled_flags());

        for (sibling, mapping) in mappings.iter_mut() {
            let soloed = sibling == key;
            mapping.enabled = soloed;
            mapping.solo = soloed;
        }
        debug!("Solo on: {} {}", device_id, key);
    }

    fn solo_off(&mut self, store: &mut MappingStore, device_id: &str, key: SensorKey) {
        let mappings = store.ensure(device_id);
        match self.snapshots.remove(device_id) {
            Some(flags) => {
                for (sibling, mapping) in mappings.iter_mut() {
                    mapping.enabled = flags[sibling.index()];
                    mapping.solo = false;
                }
                debug!("Solo off: {} {} (restored snapshot)", device_id, key);
            }
            None => {
                mappings[key].solo = false;
                debug!("Solo off: {} {} (no snapshot)", device_id, key);
            }
        }
    }
}
