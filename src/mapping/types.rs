//! Mapping model type definitions
//!
//! A [`ChannelMapping`] describes how one sensor channel of one device turns
//! into MIDI. The output target is a tagged variant, so a CC mapping can never
//! carry half-filled note fields and vice versa.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default note for tap mappings (middle C)
pub const DEFAULT_NOTE: u8 = 60;
/// Default tap note velocity
pub const DEFAULT_VELOCITY: u8 = 110;
/// Default tap note length
pub const DEFAULT_DURATION_MS: u64 = 200;

/// Sensor channel a mapping reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKey {
    /// Accelerometer X byte
    Ax,
    /// Accelerometer Y byte
    Ay,
    /// Accelerometer Z byte
    Az,
    /// Derived movement beyond gravity, in g
    Magnitude,
    /// Tap detection flag
    Tap,
}

impl SensorKey {
    /// Every key, in display order
    pub const ALL: [SensorKey; 5] = [
        SensorKey::Ax,
        SensorKey::Ay,
        SensorKey::Az,
        SensorKey::Magnitude,
        SensorKey::Tap,
    ];

    /// The three raw accelerometer axes
    pub const AXES: [SensorKey; 3] = [SensorKey::Ax, SensorKey::Ay, SensorKey::Az];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKey::Ax => "ax",
            SensorKey::Ay => "ay",
            SensorKey::Az => "az",
            SensorKey::Magnitude => "magnitude",
            SensorKey::Tap => "tap",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            SensorKey::Ax => "Accel X",
            SensorKey::Ay => "Accel Y",
            SensorKey::Az => "Accel Z",
            SensorKey::Magnitude => "Movement magnitude",
            SensorKey::Tap => "Tap",
        }
    }

    /// Position in [`SensorKey::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKey {
    type Err = UnknownSensorKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownSensorKey(s.to_string()))
    }
}

/// Returned when a string is not a known sensor key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sensor key '{0}'")]
pub struct UnknownSensorKey(pub String);

/// Kind of MIDI output a mapping produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Cc,
    Note,
}

impl OutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::Cc => "cc",
            OutputKind::Note => "note",
        }
    }
}

/// Closed numeric range used for input domains and output targets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Output side of a mapping
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MappingTarget {
    /// Continuous Control Change
    Cc { cc_number: u8 },
    /// Note On on rising edge, Note Off after `duration_ms`
    Note {
        note_number: u8,
        velocity: u8,
        duration_ms: u64,
    },
}

impl MappingTarget {
    pub fn kind(&self) -> OutputKind {
        match self {
            MappingTarget::Cc { .. } => OutputKind::Cc,
            MappingTarget::Note { .. } => OutputKind::Note,
        }
    }

    /// Default target of the given kind for a sensor key
    pub fn default_for(kind: OutputKind, key: SensorKey) -> Self {
        match kind {
            OutputKind::Cc => MappingTarget::Cc {
                cc_number: default_cc_number(key),
            },
            OutputKind::Note => MappingTarget::Note {
                note_number: DEFAULT_NOTE,
                velocity: DEFAULT_VELOCITY,
                duration_ms: DEFAULT_DURATION_MS,
            },
        }
    }
}

/// Distinct starting CC numbers per axis; tap has none
fn default_cc_number(key: SensorKey) -> u8 {
    match key {
        SensorKey::Ax => 1,
        SensorKey::Ay => 2,
        SensorKey::Az => 3,
        SensorKey::Magnitude => 4,
        SensorKey::Tap => 0,
    }
}

/// Configuration of one device's sensor channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMapping {
    pub enabled: bool,
    /// Set while this mapping is soloed on its device
    pub solo: bool,
    /// MIDI channel, 1-16
    pub channel: u8,
    /// Domain of the raw or derived sensor value
    pub input_range: ValueRange,
    /// Target range, normally 0..127
    pub output_range: ValueRange,
    pub invert: bool,
    /// EMA factor; 0 (or 1) disables smoothing
    pub smoothing_alpha: f64,
    pub target: MappingTarget,
}

impl ChannelMapping {
    /// Documented defaults for a sensor key
    pub fn default_for(key: SensorKey) -> Self {
        let (kind, input_max) = match key {
            SensorKey::Tap => (OutputKind::Note, 255.0),
            SensorKey::Magnitude => (OutputKind::Cc, 2.0),
            SensorKey::Ax | SensorKey::Ay | SensorKey::Az => (OutputKind::Cc, 255.0),
        };

        Self {
            enabled: false,
            solo: false,
            channel: 1,
            input_range: ValueRange::new(0.0, input_max),
            output_range: ValueRange::new(0.0, 127.0),
            invert: false,
            smoothing_alpha: 0.0,
            target: MappingTarget::default_for(kind, key),
        }
    }

    pub fn kind(&self) -> OutputKind {
        self.target.kind()
    }

    /// CC number when this is a CC mapping
    pub fn cc_number(&self) -> Option<u8> {
        match self.target {
            MappingTarget::Cc { cc_number } => Some(cc_number),
            MappingTarget::Note { .. } => None,
        }
    }

    /// Switch the output kind, resetting target fields to the key's defaults.
    ///
    /// Keeps the current target when the kind is unchanged.
    pub fn set_kind(&mut self, kind: OutputKind, key: SensorKey) {
        if self.kind() != kind {
            self.target = MappingTarget::default_for(kind, key);
        }
    }
}
