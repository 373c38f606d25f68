//! Per-device sensor mapping model
//!
//! Every device owns exactly one [`ChannelMapping`] per [`SensorKey`]. Device
//! entries are created lazily with defaults the first time a device is
//! referenced, and can never be partially populated.

pub mod debounce;
pub mod edit;
pub mod solo;
mod types;

pub use debounce::{FieldDebouncer, PendingEdit};
pub use edit::{EditOutcome, MappingField};
pub use solo::SoloSnapshots;
pub use types::{
    ChannelMapping, MappingTarget, OutputKind, SensorKey, UnknownSensorKey, ValueRange,
    DEFAULT_DURATION_MS, DEFAULT_NOTE, DEFAULT_VELOCITY,
};

use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};
use tracing::debug;

/// The five mappings of one device, indexed by sensor key
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMappings {
    slots: [ChannelMapping; 5],
}

impl DeviceMappings {
    /// All mappings at their per-key defaults
    pub fn with_defaults() -> Self {
        Self {
            slots: SensorKey::ALL.map(ChannelMapping::default_for),
        }
    }

    pub fn get(&self, key: SensorKey) -> &ChannelMapping {
        &self.slots[key.index()]
    }

    pub fn get_mut(&mut self, key: SensorKey) -> &mut ChannelMapping {
        &mut self.slots[key.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SensorKey, &ChannelMapping)> {
        SensorKey::ALL.into_iter().zip(self.slots.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SensorKey, &mut ChannelMapping)> {
        SensorKey::ALL.into_iter().zip(self.slots.iter_mut())
    }

    /// Enabled flag of every mapping, in key order
    pub fn enabled_flags(&self) -> [bool; 5] {
        std::array::from_fn(|i| self.slots[i].enabled)
    }

    /// Keys whose mapping is currently enabled
    pub fn enabled_keys(&self) -> Vec<SensorKey> {
        self.iter()
            .filter(|(_, m)| m.enabled)
            .map(|(key, _)| key)
            .collect()
    }
}

impl Default for DeviceMappings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Index<SensorKey> for DeviceMappings {
    type Output = ChannelMapping;

    fn index(&self, key: SensorKey) -> &ChannelMapping {
        self.get(key)
    }
}

impl IndexMut<SensorKey> for DeviceMappings {
    fn index_mut(&mut self, key: SensorKey) -> &mut ChannelMapping {
        self.get_mut(key)
    }
}

/// Mapping configuration of every known device, keyed by device id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingStore {
    devices: BTreeMap<String, DeviceMappings>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mappings for a device, creating defaults on first reference
    pub fn ensure(&mut self, device_id: &str) -> &mut DeviceMappings {
        if !self.devices.contains_key(device_id) {
            debug!("Creating default mappings for device {}", device_id);
        }
        self.devices.entry(device_id.to_string()).or_default()
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceMappings> {
        self.devices.get(device_id)
    }

    /// Replace a device's mappings wholesale
    pub fn insert(&mut self, device_id: impl Into<String>, mappings: DeviceMappings) {
        self.devices.insert(device_id.into(), mappings);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DeviceMappings)> {
        self.devices.iter().map(|(id, m)| (id.as_str(), m))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Idempotent lazy init of a device's mappings
pub fn ensure_device_mappings<'a>(
    store: &'a mut MappingStore,
    device_id: &str,
) -> &'a mut DeviceMappings {
    store.ensure(device_id)
}
