//! Device sensor frames and the device collection boundary
//!
//! Sensor frames arrive from an external device manager. Every field is read
//! with a safe default: malformed or missing numbers become `0`, a malformed
//! tap flag becomes `false`. A bad frame never faults the tick loop.

mod registry;

pub use registry::DeviceRegistry;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Latest sensor frame reported by one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value")]
pub struct SensorSnapshot {
    pub id: String,
    /// Accelerometer bytes (0-255, 0 = -2g, 255 = +2g)
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    /// Beacon distances per corner (0-255)
    #[serde(rename = "dNW")]
    pub d_nw: f64,
    #[serde(rename = "dNE")]
    pub d_ne: f64,
    #[serde(rename = "dSE")]
    pub d_se: f64,
    #[serde(rename = "dSW")]
    pub d_sw: f64,
    pub tap: bool,
    pub color: [u8; 3],
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self {
            id: String::new(),
            ax: 0.0,
            ay: 0.0,
            az: 0.0,
            d_nw: 0.0,
            d_ne: 0.0,
            d_se: 0.0,
            d_sw: 0.0,
            tap: false,
            color: [255, 255, 255],
        }
    }
}

impl SensorSnapshot {
    /// Build a snapshot from loosely-typed JSON, defaulting every bad field
    pub fn from_json(value: &Value) -> Self {
        let field = |name: &str| value.get(name).map(coerce_number).unwrap_or(0.0);

        Self {
            id: value.get("id").map(coerce_id).unwrap_or_default(),
            ax: field("ax"),
            ay: field("ay"),
            az: field("az"),
            d_nw: field("dNW"),
            d_ne: field("dNE"),
            d_se: field("dSE"),
            d_sw: field("dSW"),
            tap: value.get("tap").map(coerce_bool).unwrap_or(false),
            color: value
                .get("color")
                .and_then(coerce_color)
                .unwrap_or([255, 255, 255]),
        }
    }
}

impl From<Value> for SensorSnapshot {
    fn from(value: Value) -> Self {
        Self::from_json(&value)
    }
}

/// Ordered view of the devices currently known upstream
pub trait DeviceCollection {
    /// All devices with their latest frame, in insertion order
    fn devices(&self) -> Vec<(String, SensorSnapshot)>;

    fn device_count(&self) -> usize {
        self.devices().len()
    }
}

/// Read a number leniently: numbers pass, numeric strings parse, bools map
/// to 0/1, everything else is 0. Non-finite results are 0.
pub fn coerce_number(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Read a flag leniently: `true`, non-zero numbers and "true"/"1" are set
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}

fn coerce_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn coerce_color(value: &Value) -> Option<[u8; 3]> {
    let items = value.as_array()?;
    if items.len() < 3 {
        return None;
    }
    let channel = |v: &Value| coerce_number(v).round().clamp(0.0, 255.0) as u8;
    Some([channel(&items[0]), channel(&items[1]), channel(&items[2])])
}
