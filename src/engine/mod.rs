//! Sensor mapping engine
//!
//! Turns device sensor frames into MIDI through the per-device mapping model.
//! Called once per display tick for every known device:
//!
//! - `ax`/`ay`/`az` and the derived movement `magnitude` are smoothed,
//!   normalized into the mapping's output range, rounded and sent as CC.
//! - `tap` sends a Note On on each rising edge and schedules the matching
//!   Note Off after the mapping's duration.
//!
//! A failing transport call is logged and skipped; it never stops the loop
//! over the remaining channels and devices.

pub mod note_off;
mod runtime;


pub use note_off::{NoteOffHandle, NoteOffScheduler, ScheduledNoteOff};
pub use runtime::RuntimeState;

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::device::{DeviceCollection, SensorSnapshot};
use crate::mapping::{ChannelMapping, MappingStore, MappingTarget, OutputKind, SensorKey};
use crate::midi::clamp::round_value;
use crate::transport::MidiTransport;

/// Nominal gravity removed from the acceleration magnitude, in g
const GRAVITY_G: f64 = 1.0;

/// Map `value` from the input range onto the output range.
///
/// A degenerate input range (equal or non-finite bounds) yields `out_min`.
/// The input position is clamped to the range before inversion, so the result
/// always lies between `out_min` and `out_max`; it is not clamped to MIDI
/// ranges here.
pub fn normalize(
    value: f64,
    in_min: f64,
    in_max: f64,
    out_min: f64,
    out_max: f64,
    invert: bool,
) -> f64 {
    if !in_min.is_finite() || !in_max.is_finite() || in_max == in_min {
        return out_min;
    }
    let value = if value.is_finite() { value } else { 0.0 };

    let mut t = ((value - in_min) / (in_max - in_min)).clamp(0.0, 1.0);
    if invert {
        t = 1.0 - t;
    }
    out_min + t * (out_max - out_min)
}

/// Single-pole low-pass (EMA) over a device channel.
///
/// `alpha` outside the open interval (0, 1) disables smoothing: the raw value
/// is stored and returned. The first sample seeds the filter.
pub fn apply_smoothing(runtime: &mut RuntimeState, key: SensorKey, raw: f64, alpha: f64) -> f64 {
    if !(alpha > 0.0 && alpha < 1.0) {
        runtime.store_smoothed(key, raw);
        return raw;
    }

    let smoothed = match runtime.smoothed(key) {
        Some(prev) => prev + alpha * (raw - prev),
        None => raw,
    };
    runtime.store_smoothed(key, smoothed);
    smoothed
}

/// Movement beyond gravity, in g, from three accelerometer bytes.
///
/// Each byte maps linearly onto -2g..+2g. Result is clamped at 0.
pub fn compute_magnitude(ax: f64, ay: f64, az: f64) -> f64 {
    let to_g = |raw: f64| (raw / 255.0) * 4.0 - 2.0;
    let (gx, gy, gz) = (to_g(ax), to_g(ay), to_g(az));
    let magnitude = (gx * gx + gy * gy + gz * gz).sqrt();
    (magnitude - GRAVITY_G).max(0.0)
}

/// Drives mappings for all devices and owns their runtime state
#[derive(Debug, Default)]
pub struct MappingEngine {
    runtime: HashMap<String, RuntimeState>,
    note_offs: NoteOffScheduler,
}

impl MappingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// One tick for one device
    pub fn process_device<T: MidiTransport + ?Sized>(
        &mut self,
        device_id: &str,
        snapshot: &SensorSnapshot,
        store: &mut MappingStore,
        transport: &T,
        now: Instant,
    ) {
        let mappings = store.ensure(device_id);
        let runtime = self.runtime.entry(device_id.to_string()).or_insert_with(|| {
            debug!("Runtime state created for device {}", device_id);
            RuntimeState::new()
        });

        let (ax, ay, az) = (
            sensor_value(snapshot.ax),
            sensor_value(snapshot.ay),
            sensor_value(snapshot.az),
        );

        for key in SensorKey::AXES {
            let raw = match key {
                SensorKey::Ax => ax,
                SensorKey::Ay => ay,
                _ => az,
            };
            send_continuous(device_id, key, raw, &mappings[key], runtime, transport);
        }

        let movement = compute_magnitude(ax, ay, az);
        send_continuous(
            device_id,
            SensorKey::Magnitude,
            movement,
            &mappings[SensorKey::Magnitude],
            runtime,
            transport,
        );

        let tap_mapping = &mappings[SensorKey::Tap];
        let rising_edge = snapshot.tap && !runtime.previous_tap;
        runtime.previous_tap = snapshot.tap;

        match tap_mapping.target {
            MappingTarget::Note {
                note_number,
                velocity,
                duration_ms,
            } if tap_mapping.enabled => {
                if rising_edge {
                    let channel = tap_mapping.channel;
                    trace!("Tap rising edge on {}: note {}", device_id, note_number);
                    if let Err(e) = transport.send_note_on(
                        i64::from(note_number),
                        i64::from(velocity),
                        i64::from(channel),
                    ) {
                        warn!("Failed to send Note On for {}: {}", device_id, e);
                    }
                    let due = now + Duration::from_millis(duration_ms);
                    let handle = self.note_offs.schedule(device_id, note_number, channel, due);
                    runtime.pending_note_offs.push(handle);
                }
            }
            _ => {
                for handle in runtime.pending_note_offs.drain(..) {
                    if self.note_offs.cancel(handle) {
                        debug!("Cancelled pending Note-Off for {} (tap mapping off)", device_id);
                    }
                }
            }
        }
    }

    /// One tick for every device in the collection.
    ///
    /// Devices missing from the collection lose their runtime state and any
    /// pending Note-Offs.
    pub fn process_all_devices<D, T>(
        &mut self,
        devices: &D,
        store: &mut MappingStore,
        transport: &T,
        now: Instant,
    ) where
        D: DeviceCollection + ?Sized,
        T: MidiTransport + ?Sized,
    {
        let devices = devices.devices();

        let present: HashSet<&str> = devices.iter().map(|(id, _)| id.as_str()).collect();
        let absent: Vec<String> = self
            .runtime
            .keys()
            .filter(|id| !present.contains(id.as_str()))
            .cloned()
            .collect();
        for id in absent {
            self.forget_device(&id);
        }

        for (id, snapshot) in &devices {
            self.process_device(id, snapshot, store, transport, now);
        }
    }

    /// Send every Note-Off that is due; returns how many fired
    pub fn poll_note_offs<T: MidiTransport + ?Sized>(&mut self, now: Instant, transport: &T) -> usize {
        let due = self.note_offs.take_due(now);
        self.send_note_offs(due, transport)
    }

    /// Send every pending Note-Off immediately (shutdown)
    pub fn release_all_notes<T: MidiTransport + ?Sized>(&mut self, transport: &T) -> usize {
        let all = self.note_offs.drain_all();
        self.send_note_offs(all, transport)
    }

    fn send_note_offs<T: MidiTransport + ?Sized>(
        &mut self,
        due: Vec<ScheduledNoteOff>,
        transport: &T,
    ) -> usize {
        for entry in &due {
            if let Some(runtime) = self.runtime.get_mut(&entry.device_id) {
                runtime.pending_note_offs.retain(|h| *h != entry.handle);
            }
            if let Err(e) =
                transport.send_note_off(i64::from(entry.note), i64::from(entry.channel))
            {
                warn!("Failed to send Note Off for {}: {}", entry.device_id, e);
            }
        }
        due.len()
    }

    /// Drop a device's runtime state and cancel its pending Note-Offs
    pub fn forget_device(&mut self, device_id: &str) {
        if let Some(runtime) = self.runtime.remove(device_id) {
            let cancelled = runtime
                .pending_note_offs
                .iter()
                .filter(|h| self.note_offs.cancel(**h))
                .count();
            debug!(
                "Runtime state dropped for {} ({} Note-Off(s) cancelled)",
                device_id, cancelled
            );
        }
    }

    /// Cancel every pending Note-Off, e.g. when the output changes
    pub fn cancel_pending_note_offs(&mut self) -> usize {
        for runtime in self.runtime.values_mut() {
            runtime.pending_note_offs.clear();
        }
        self.note_offs.cancel_all()
    }

    pub fn runtime(&self, device_id: &str) -> Option<&RuntimeState> {
        self.runtime.get(device_id)
    }

    /// Last value sent for a device channel, before rounding
    pub fn last_value(&self, device_id: &str, key: SensorKey) -> Option<f64> {
        self.runtime.get(device_id).and_then(|r| r.last_value(key))
    }

    pub fn pending_note_off_count(&self) -> usize {
        self.note_offs.len()
    }

    pub fn tracked_devices(&self) -> usize {
        self.runtime.len()
    }
}

/// Smooth, normalize and send one continuous channel if its CC mapping is on
/// Non-finite readings count as 0 so they never reach the smoothing state
fn sensor_value(raw: f64) -> f64 {
    if raw.is_finite() {
        raw
    } else {
        0.0
    }
}

fn send_continuous<T: MidiTransport + ?Sized>(
    device_id: &str,
    key: SensorKey,
    raw: f64,
    mapping: &ChannelMapping,
    runtime: &mut RuntimeState,
    transport: &T,
) {
    let MappingTarget::Cc { cc_number } = mapping.target else {
        return;
    };
    if !mapping.enabled || mapping.kind() != OutputKind::Cc {
        return;
    }

    let smoothed = apply_smoothing(runtime, key, raw, mapping.smoothing_alpha);
    let value = normalize(
        smoothed,
        mapping.input_range.min,
        mapping.input_range.max,
        mapping.output_range.min,
        mapping.output_range.max,
        mapping.invert,
    );
    runtime.store_last_value(key, value);

    if let Err(e) = transport.send_control_change(
        i64::from(cc_number),
        round_value(value),
        i64::from(mapping.channel),
    ) {
        warn!("Failed to send CC {} for {} {}: {}", cc_number, device_id, key, e);
    }
}
