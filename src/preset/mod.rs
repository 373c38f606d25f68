//! Preset import/export
//!
//! A preset is a version-tagged JSON document holding the selected MIDI
//! output and every device's mappings:
//!
//! ```json
//! {
//!   "version": 1,
//!   "exportedAt": "2026-01-01T12:00:00.000Z",
//!   "selectedOutputId": "IAC Driver Bus 1",
//!   "mappingsByDevice": {
//!     "0a1b": { "ax": { "enabled": true, "midiType": "cc", "ccNumber": 1, ... } }
//!   }
//! }
//! ```
//!
//! Import is lenient: each field of each mapping is read on its own and falls
//! back to the key's default when missing or mistyped. Only a payload that is
//! not a JSON object is rejected.

pub mod persistence;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::mapping::edit::{apply_edit, MappingField};
use crate::mapping::{
    ChannelMapping, DeviceMappings, MappingStore, MappingTarget, OutputKind, SensorKey,
};

/// Preset document version written on export
pub const PRESET_VERSION: u32 = 1;

/// Preset import/export failure
#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("invalid preset JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid preset JSON: expected an object, got {0}")]
    NotAnObject(&'static str),
}

/// Serialized form of one mapping
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRecord {
    pub enabled: bool,
    pub sensor_key: SensorKey,
    pub midi_type: OutputKind,
    pub channel: u8,
    pub input_min: f64,
    pub input_max: f64,
    pub output_min: f64,
    pub output_max: f64,
    pub invert: bool,
    pub smoothing_alpha: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc_number: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_number: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub solo: bool,
}

impl MappingRecord {
    pub fn from_mapping(key: SensorKey, mapping: &ChannelMapping) -> Self {
        let (cc_number, note_number, velocity, duration_ms) = match mapping.target {
            MappingTarget::Cc { cc_number } => (Some(cc_number), None, None, None),
            MappingTarget::Note {
                note_number,
                velocity,
                duration_ms,
            } => (None, Some(note_number), Some(velocity), Some(duration_ms)),
        };

        Self {
            enabled: mapping.enabled,
            sensor_key: key,
            midi_type: mapping.kind(),
            channel: mapping.channel,
            input_min: mapping.input_range.min,
            input_max: mapping.input_range.max,
            output_min: mapping.output_range.min,
            output_max: mapping.output_range.max,
            invert: mapping.invert,
            smoothing_alpha: mapping.smoothing_alpha,
            cc_number,
            note_number,
            velocity,
            duration_ms,
            solo: mapping.solo,
        }
    }
}

/// A captured preset, ready to serialize
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub version: u32,
    pub exported_at: String,
    pub selected_output_id: Option<String>,
    pub mappings_by_device: BTreeMap<String, BTreeMap<SensorKey, MappingRecord>>,
}

impl Preset {
    /// Capture the current mappings and output selection
    pub fn capture(store: &MappingStore, selected_output_id: Option<&str>) -> Self {
        let mappings_by_device = store
            .iter()
            .map(|(id, mappings)| {
                let records = mappings
                    .iter()
                    .map(|(key, m)| (key, MappingRecord::from_mapping(key, m)))
                    .collect();
                (id.to_string(), records)
            })
            .collect();

        Self {
            version: PRESET_VERSION,
            exported_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            selected_output_id: selected_output_id.map(str::to_string),
            mappings_by_device,
        }
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, PresetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Export the current state as preset JSON
pub fn export_json(
    store: &MappingStore,
    selected_output_id: Option<&str>,
) -> Result<String, PresetError> {
    Preset::capture(store, selected_output_id).to_json()
}

/// Result of a successful import
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedPreset {
    pub selected_output_id: Option<String>,
    pub store: MappingStore,
}

/// Parse preset JSON into a fresh mapping store
pub fn import_json(json: &str) -> Result<ImportedPreset, PresetError> {
    let value: Value = serde_json::from_str(json)?;
    import_value(&value)
}

/// Like [`import_json`], from an already parsed document
pub fn import_value(value: &Value) -> Result<ImportedPreset, PresetError> {
    let root = value
        .as_object()
        .ok_or_else(|| PresetError::NotAnObject(json_type_name(value)))?;

    let selected_output_id = match root.get("selectedOutputId") {
        Some(Value::String(id)) => Some(id.clone()),
        _ => None,
    };

    let mut store = MappingStore::new();
    match root.get("mappingsByDevice") {
        Some(Value::Object(devices)) => {
            for (device_id, device) in devices {
                match device.as_object() {
                    Some(entries) => store.insert(device_id.clone(), import_device(entries)),
                    None => warn!("Preset: skipping device {} (not an object)", device_id),
                }
            }
        }
        Some(other) => warn!(
            "Preset: mappingsByDevice is {}, importing no devices",
            json_type_name(other)
        ),
        None => {}
    }

    debug!("Preset parsed: {} device(s)", store.len());
    Ok(ImportedPreset {
        selected_output_id,
        store,
    })
}

fn import_device(entries: &Map<String, Value>) -> DeviceMappings {
    let mut mappings = DeviceMappings::with_defaults();
    for (name, entry) in entries {
        let Ok(key) = name.parse::<SensorKey>() else {
            debug!("Preset: ignoring unknown sensor key '{}'", name);
            continue;
        };
        if let Some(fields) = entry.as_object() {
            overlay_mapping(&mut mappings[key], key, fields);
        }
    }
    mappings
}

/// Overlay every well-typed field onto a default mapping
fn overlay_mapping(mapping: &mut ChannelMapping, key: SensorKey, fields: &Map<String, Value>) {
    let flag = |name: &str| fields.get(name).and_then(Value::as_bool);

    if let Some(enabled) = flag("enabled") {
        mapping.enabled = enabled;
    }
    if let Some(invert) = flag("invert") {
        mapping.invert = invert;
    }
    if let Some(solo) = flag("solo") {
        mapping.solo = solo;
    }

    match fields.get("midiType").and_then(Value::as_str) {
        Some("cc") => mapping.set_kind(OutputKind::Cc, key),
        Some("note") => mapping.set_kind(OutputKind::Note, key),
        _ => {}
    }

    const NUMERIC: [MappingField; 10] = [
        MappingField::Channel,
        MappingField::InputMin,
        MappingField::InputMax,
        MappingField::OutputMin,
        MappingField::OutputMax,
        MappingField::SmoothingAlpha,
        MappingField::CcNumber,
        MappingField::NoteNumber,
        MappingField::Velocity,
        MappingField::DurationMs,
    ];
    for field in NUMERIC {
        if let Some(number) = fields.get(field.as_str()).and_then(Value::as_f64) {
            apply_edit(mapping, field, number);
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
