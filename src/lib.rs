//! Sensor MIDI mapper
//!
//! Maps live sensor frames from Hitloop devices (accelerometer axes, derived
//! movement magnitude, tap detection) to MIDI Control Change and Note messages
//! through a per-device, per-channel mapping model.

pub mod app;
pub mod command;
pub mod config;
pub mod device;
pub mod engine;
pub mod mapping;
pub mod midi;
pub mod paths;
pub mod preset;
pub mod transport;

pub use app::MapperApp;
pub use device::{DeviceCollection, DeviceRegistry, SensorSnapshot};
pub use engine::MappingEngine;
pub use mapping::{ensure_device_mappings, ChannelMapping, MappingStore, SensorKey};
pub use transport::{MidiTransport, TransportError};
