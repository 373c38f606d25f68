//! In-memory device registry fed by incoming sensor frames

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{DeviceCollection, SensorSnapshot};

struct DeviceEntry {
    snapshot: SensorSnapshot,
    last_seen: Instant,
}

/// Insertion-ordered map of device id to latest sensor frame
#[derive(Default)]
pub struct DeviceRegistry {
    order: Vec<String>,
    entries: HashMap<String, DeviceEntry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest frame for its device.
    ///
    /// Frames without an id are ignored. Returns true when the device is new.
    pub fn upsert(&mut self, snapshot: SensorSnapshot, now: Instant) -> bool {
        if snapshot.id.is_empty() {
            debug!("Ignoring sensor frame without device id");
            return false;
        }

        match self.entries.get_mut(&snapshot.id) {
            Some(entry) => {
                entry.snapshot = snapshot;
                entry.last_seen = now;
                false
            }
            None => {
                info!("New device: {}", snapshot.id);
                self.order.push(snapshot.id.clone());
                self.entries.insert(
                    snapshot.id.clone(),
                    DeviceEntry {
                        snapshot,
                        last_seen: now,
                    },
                );
                true
            }
        }
    }

    /// Forget a device
    pub fn remove(&mut self, id: &str) -> bool {
        if self.entries.remove(id).is_some() {
            self.order.retain(|known| known != id);
            true
        } else {
            false
        }
    }

    /// Drop devices silent for longer than `timeout`; returns their ids
    pub fn prune_stale(&mut self, now: Instant, timeout: Duration) -> Vec<String> {
        let stale: Vec<String> = self
            .order
            .iter()
            .filter(|id| {
                self.entries
                    .get(*id)
                    .is_some_and(|e| now.saturating_duration_since(e.last_seen) > timeout)
            })
            .cloned()
            .collect();

        for id in &stale {
            info!("Device timed out: {}", id);
            self.remove(id);
        }
        stale
    }

    pub fn get(&self, id: &str) -> Option<&SensorSnapshot> {
        self.entries.get(id).map(|e| &e.snapshot)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl DeviceCollection for DeviceRegistry {
    fn devices(&self) -> Vec<(String, SensorSnapshot)> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|e| (id.clone(), e.snapshot.clone())))
            .collect()
    }

    fn device_count(&self) -> usize {
        self.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str, ax: f64) -> SensorSnapshot {
        SensorSnapshot {
            id: id.to_string(),
            ax,
            ..Default::default()
        }
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let now = Instant::now();
        let mut registry = DeviceRegistry::new();
        assert!(registry.upsert(frame("b", 1.0), now));
        assert!(registry.upsert(frame("a", 2.0), now));
        assert!(!registry.upsert(frame("b", 3.0), now));

        let ids: Vec<String> = registry.devices().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(registry.get("b").unwrap().ax, 3.0);
        assert_eq!(registry.device_count(), 2);
    }

    #[test]
    fn test_frames_without_id_are_ignored() {
        let mut registry = DeviceRegistry::new();
        assert!(!registry.upsert(frame("", 1.0), Instant::now()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_prune_stale_devices() {
        let start = Instant::now();
        let mut registry = DeviceRegistry::new();
        registry.upsert(frame("old", 0.0), start);
        registry.upsert(frame("fresh", 0.0), start + Duration::from_secs(4));

        let removed = registry.prune_stale(start + Duration::from_secs(6), Duration::from_secs(5));
        assert_eq!(removed, vec!["old"]);
        assert_eq!(registry.device_count(), 1);
        assert!(registry.get("fresh").is_some());
    }
}
