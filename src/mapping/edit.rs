//! Numeric field edits on a mapping
//!
//! Each editable field has its own clamping rule. Values that are not finite
//! (blank or unparsable input) fall back to the field's floor default.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use super::{ChannelMapping, MappingTarget};

/// Editable numeric field of a [`ChannelMapping`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MappingField {
    Channel,
    CcNumber,
    NoteNumber,
    Velocity,
    DurationMs,
    InputMin,
    InputMax,
    OutputMin,
    OutputMax,
    SmoothingAlpha,
}

impl MappingField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingField::Channel => "channel",
            MappingField::CcNumber => "ccNumber",
            MappingField::NoteNumber => "noteNumber",
            MappingField::Velocity => "velocity",
            MappingField::DurationMs => "durationMs",
            MappingField::InputMin => "inputMin",
            MappingField::InputMax => "inputMax",
            MappingField::OutputMin => "outputMin",
            MappingField::OutputMax => "outputMax",
            MappingField::SmoothingAlpha => "smoothingAlpha",
        }
    }

    /// Fields whose typed edits are committed only after a quiet period
    pub fn is_debounced(&self) -> bool {
        matches!(
            self,
            MappingField::Channel | MappingField::CcNumber | MappingField::NoteNumber
        )
    }
}

impl fmt::Display for MappingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = match s {
            "channel" => MappingField::Channel,
            "ccNumber" => MappingField::CcNumber,
            "noteNumber" => MappingField::NoteNumber,
            "velocity" => MappingField::Velocity,
            "durationMs" => MappingField::DurationMs,
            "inputMin" => MappingField::InputMin,
            "inputMax" => MappingField::InputMax,
            "outputMin" => MappingField::OutputMin,
            "outputMax" => MappingField::OutputMax,
            "smoothingAlpha" => MappingField::SmoothingAlpha,
            other => return Err(format!("unknown mapping field '{}'", other)),
        };
        Ok(field)
    }
}

/// Result of applying an edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    /// Held by the debouncer until typing goes quiet
    Deferred,
    /// The field does not exist on this mapping's output kind
    NotApplicable,
}

/// Parse typed text the way a number input does; blank or invalid is NaN
pub fn parse_input(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

fn or_default(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        default
    }
}

fn to_byte(value: f64, min: f64, max: f64, default: f64) -> u8 {
    or_default(value, default).clamp(min, max).round() as u8
}

/// Apply a numeric edit with the field's clamping rule
pub fn apply_edit(mapping: &mut ChannelMapping, field: MappingField, value: f64) -> EditOutcome {
    match (field, &mut mapping.target) {
        (MappingField::Channel, _) => {
            mapping.channel = to_byte(value, 1.0, 16.0, 1.0);
        }
        (MappingField::CcNumber, MappingTarget::Cc { cc_number }) => {
            *cc_number = to_byte(value, 0.0, 127.0, 0.0);
        }
        (MappingField::NoteNumber, MappingTarget::Note { note_number, .. }) => {
            *note_number = to_byte(value, 0.0, 127.0, 0.0);
        }
        (MappingField::Velocity, MappingTarget::Note { velocity, .. }) => {
            *velocity = to_byte(value, 0.0, 127.0, 0.0);
        }
        (MappingField::DurationMs, MappingTarget::Note { duration_ms, .. }) => {
            *duration_ms = or_default(value, 200.0).clamp(10.0, 2000.0).round() as u64;
        }
        (MappingField::InputMin, _) => {
            mapping.input_range.min = or_default(value, 0.0).clamp(0.0, 255.0);
        }
        (MappingField::InputMax, _) => {
            mapping.input_range.max = or_default(value, 0.0).clamp(0.0, 255.0);
        }
        // Output endpoints may leave 0..127; the transport clamps on send
        (MappingField::OutputMin, _) => {
            mapping.output_range.min = or_default(value, 0.0);
        }
        (MappingField::OutputMax, _) => {
            mapping.output_range.max = or_default(value, 0.0);
        }
        (MappingField::SmoothingAlpha, _) => {
            mapping.smoothing_alpha = or_default(value, 0.0).clamp(0.0, 1.0);
        }
        _ => return EditOutcome::NotApplicable,
    }
    EditOutcome::Applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::SensorKey;

    #[test]
    fn test_channel_clamps_and_defaults() {
        let mut m = ChannelMapping::default_for(SensorKey::Ax);
        apply_edit(&mut m, MappingField::Channel, 20.0);
        assert_eq!(m.channel, 16);
        apply_edit(&mut m, MappingField::Channel, parse_input("abc"));
        assert_eq!(m.channel, 1);
    }

    #[test]
    fn test_duration_clamps_and_defaults() {
        let mut m = ChannelMapping::default_for(SensorKey::Tap);
        apply_edit(&mut m, MappingField::DurationMs, 5.0);
        assert!(matches!(m.target, MappingTarget::Note { duration_ms: 10, .. }));
        apply_edit(&mut m, MappingField::DurationMs, parse_input(""));
        assert!(matches!(m.target, MappingTarget::Note { duration_ms: 200, .. }));
    }

    #[test]
    fn test_output_endpoints_are_not_clamped() {
        let mut m = ChannelMapping::default_for(SensorKey::Ay);
        apply_edit(&mut m, MappingField::OutputMax, 300.0);
        apply_edit(&mut m, MappingField::OutputMin, -20.0);
        assert_eq!(m.output_range.max, 300.0);
        assert_eq!(m.output_range.min, -20.0);
    }

    #[test]
    fn test_note_fields_do_not_apply_to_cc_mapping() {
        let mut m = ChannelMapping::default_for(SensorKey::Az);
        assert_eq!(
            apply_edit(&mut m, MappingField::NoteNumber, 64.0),
            EditOutcome::NotApplicable
        );
        assert_eq!(m, ChannelMapping::default_for(SensorKey::Az));
    }

    #[test]
    fn test_smoothing_alpha_clamped_to_unit_range() {
        let mut m = ChannelMapping::default_for(SensorKey::Magnitude);
        apply_edit(&mut m, MappingField::SmoothingAlpha, 3.0);
        assert_eq!(m.smoothing_alpha, 1.0);
        apply_edit(&mut m, MappingField::SmoothingAlpha, 0.25);
        assert_eq!(m.smoothing_alpha, 0.25);
    }

    #[test]
    fn test_field_names_parse() {
        assert_eq!("ccNumber".parse::<MappingField>(), Ok(MappingField::CcNumber));
        assert!("solo".parse::<MappingField>().is_err());
        assert!(MappingField::NoteNumber.is_debounced());
        assert!(!MappingField::Velocity.is_debounced());
    }
}
