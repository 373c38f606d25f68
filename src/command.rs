//! JSON-lines input: sensor frames and control commands
//!
//! Every input line is one JSON object. Objects with a `type` field are
//! control commands (the edits a user makes on a mapping); everything else
//! is a sensor frame.
//!
//! ```text
//! {"id":"0a1b","ax":130,"ay":127,"az":250,"tap":false}
//! {"type":"enable","device":"0a1b","key":"ax","enabled":true}
//! {"type":"edit","device":"0a1b","key":"ax","field":"ccNumber","value":"12"}
//! ```

use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Instant;

use crate::app::MapperApp;
use crate::device::SensorSnapshot;
use crate::mapping::{EditOutcome, MappingField, OutputKind, SensorKey};

/// User command addressed to one mapping or to the app
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlCommand {
    /// Typed numeric edit; `value` is the raw text (numbers are accepted too)
    Edit {
        device: String,
        key: SensorKey,
        field: MappingField,
        #[serde(default)]
        value: Value,
    },
    Enable {
        device: String,
        key: SensorKey,
        enabled: bool,
    },
    Invert {
        device: String,
        key: SensorKey,
        invert: bool,
    },
    /// Switch a mapping between CC and Note output
    Kind {
        device: String,
        key: SensorKey,
        kind: OutputKind,
    },
    Solo {
        device: String,
        key: SensorKey,
        on: bool,
    },
    SelectOutput {
        #[serde(default)]
        output: Option<String>,
    },
    ImportPreset {
        path: PathBuf,
    },
    ExportPreset {
        path: PathBuf,
    },
}

/// Work left for the caller after a command touched the app
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEffect {
    /// Fully handled
    Done,
    /// Field edit result
    Edited(EditOutcome),
    /// Open this output on the transport, then record it on the app
    SelectOutput(Option<String>),
    /// Read and import this preset file
    Import(PathBuf),
    /// Write the exported preset here
    Export(PathBuf),
}

impl ControlCommand {
    /// Apply everything that needs no I/O
    pub fn apply(self, app: &mut MapperApp, now: Instant) -> CommandEffect {
        match self {
            ControlCommand::Edit {
                device,
                key,
                field,
                value,
            } => CommandEffect::Edited(app.edit_field(&device, key, field, &raw_text(&value), now)),
            ControlCommand::Enable {
                device,
                key,
                enabled,
            } => {
                app.set_enabled(&device, key, enabled);
                CommandEffect::Done
            }
            ControlCommand::Invert {
                device,
                key,
                invert,
            } => {
                app.set_invert(&device, key, invert);
                CommandEffect::Done
            }
            ControlCommand::Kind { device, key, kind } => {
                app.set_output_kind(&device, key, kind);
                CommandEffect::Done
            }
            ControlCommand::Solo { device, key, on } => {
                app.set_solo(&device, key, on);
                CommandEffect::Done
            }
            ControlCommand::SelectOutput { output } => CommandEffect::SelectOutput(output),
            ControlCommand::ImportPreset { path } => CommandEffect::Import(path),
            ControlCommand::ExportPreset { path } => CommandEffect::Export(path),
        }
    }
}

/// Text as a number input would hold it
fn raw_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// One decoded input line
#[derive(Debug, Clone, PartialEq)]
pub enum InputLine {
    Frame(SensorSnapshot),
    Command(ControlCommand),
}

/// Decoding failure for one input line
#[derive(Debug, thiserror::Error)]
pub enum InputLineError {
    #[error("not JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("invalid command: {0}")]
    Command(#[source] serde_json::Error),
}

/// Decode one input line; blank lines yield `Ok(None)`
pub fn parse_line(line: &str) -> Result<Option<InputLine>, InputLineError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(line).map_err(InputLineError::Json)?;
    if !value.is_object() {
        return Err(InputLineError::NotAnObject);
    }

    if value.get("type").is_some() {
        let command = serde_json::from_value(value).map_err(InputLineError::Command)?;
        Ok(Some(InputLine::Command(command)))
    } else {
        Ok(Some(InputLine::Frame(SensorSnapshot::from_json(&value))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_line() {
        let line = r#"{"id":"d1","ax":"200","tap":1}"#;
        let Some(InputLine::Frame(frame)) = parse_line(line).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.id, "d1");
        assert_eq!(frame.ax, 200.0);
        assert!(frame.tap);
    }

    #[test]
    fn test_command_lines() {
        let edit = parse_line(
            r#"{"type":"edit","device":"d1","key":"magnitude","field":"smoothingAlpha","value":0.5}"#,
        )
        .unwrap();
        assert_eq!(
            edit,
            Some(InputLine::Command(ControlCommand::Edit {
                device: "d1".to_string(),
                key: SensorKey::Magnitude,
                field: MappingField::SmoothingAlpha,
                value: serde_json::json!(0.5),
            }))
        );

        let select = parse_line(r#"{"type":"selectOutput","output":null}"#).unwrap();
        assert_eq!(
            select,
            Some(InputLine::Command(ControlCommand::SelectOutput { output: None }))
        );
    }

    #[test]
    fn test_bad_lines() {
        assert!(parse_line("   ").unwrap().is_none());
        assert!(matches!(parse_line("{"), Err(InputLineError::Json(_))));
        assert!(matches!(parse_line("[1]"), Err(InputLineError::NotAnObject)));
        assert!(matches!(
            parse_line(r#"{"type":"edit","device":"d1","key":"dNW","field":"channel"}"#),
            Err(InputLineError::Command(_))
        ));
    }

    #[test]
    fn test_apply_commands() {
        let mut app = MapperApp::default();
        let now = Instant::now();

        let enable = ControlCommand::Enable {
            device: "d1".to_string(),
            key: SensorKey::Tap,
            enabled: true,
        };
        assert_eq!(enable.apply(&mut app, now), CommandEffect::Done);
        assert!(app.store().get("d1").unwrap()[SensorKey::Tap].enabled);

        let edit = ControlCommand::Edit {
            device: "d1".to_string(),
            key: SensorKey::Tap,
            field: MappingField::Velocity,
            value: serde_json::json!(90),
        };
        assert_eq!(
            edit.apply(&mut app, now),
            CommandEffect::Edited(EditOutcome::Applied)
        );

        let export = ControlCommand::ExportPreset {
            path: PathBuf::from("out.json"),
        };
        assert_eq!(
            export.apply(&mut app, now),
            CommandEffect::Export(PathBuf::from("out.json"))
        );
    }
}
