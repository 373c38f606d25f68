//! MIDI output transport backed by midir
//!
//! Holds at most one open output connection. Sending while nothing is
//! selected is a silent no-op, so the engine can keep ticking while the user
//! picks a port. Selecting a different output always closes the current one
//! first: a failed selection leaves nothing selected.

use midir::{MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::{MidiTransport, TransportError};
use crate::midi::{format_hex, MidiMessage};

/// Output port as presented to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPortInfo {
    /// Stable identifier (the backend port name)
    pub id: String,
    /// Display name
    pub name: String,
}

/// Open connection to one output port
pub trait OutputConnection: Send {
    fn send(&mut self, bytes: &[u8]) -> Result<(), midir::SendError>;

    fn close(self);
}

impl OutputConnection for MidiOutputConnection {
    fn send(&mut self, bytes: &[u8]) -> Result<(), midir::SendError> {
        MidiOutputConnection::send(self, bytes)
    }

    fn close(self) {
        MidiOutputConnection::close(self);
    }
}

/// Port enumeration and connection
pub trait OutputBackend: Send + Sync {
    type Connection: OutputConnection;

    /// Names of the ports currently available
    fn port_names(&self) -> Result<Vec<String>, TransportError>;

    /// Open the port with exactly this name
    fn connect(&self, port_name: &str) -> Result<Self::Connection, TransportError>;
}

/// System MIDI outputs through midir
pub struct MidirBackend {
    client_name: String,
}

impl OutputBackend for MidirBackend {
    type Connection = MidiOutputConnection;

    fn port_names(&self) -> Result<Vec<String>, TransportError> {
        let midi_out = MidiOutput::new(&self.client_name)?;
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|port| midi_out.port_name(port).ok())
            .collect())
    }

    fn connect(&self, port_name: &str) -> Result<MidiOutputConnection, TransportError> {
        let midi_out = MidiOutput::new(&self.client_name)?;
        let port = midi_out
            .ports()
            .into_iter()
            .find(|port| midi_out.port_name(port).is_ok_and(|name| name == port_name))
            .ok_or_else(|| TransportError::PortNotFound(port_name.to_string()))?;

        midi_out
            .connect(&port, &format!("{}-out", self.client_name))
            .map_err(|e| TransportError::Connect {
                port: port_name.to_string(),
                reason: e.to_string(),
            })
    }
}

struct SelectedOutput<C> {
    info: OutputPortInfo,
    connection: C,
}

/// Transport with a single selectable output
pub struct MidirTransport<B: OutputBackend = MidirBackend> {
    backend: B,
    selected: Mutex<Option<SelectedOutput<B::Connection>>>,
}

impl MidirTransport<MidirBackend> {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self::with_backend(MidirBackend {
            client_name: client_name.into(),
        })
    }
}

impl<B: OutputBackend> MidirTransport<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            selected: Mutex::new(None),
        }
    }

    /// List available output ports
    pub fn list_outputs(&self) -> Result<Vec<OutputPortInfo>, TransportError> {
        Ok(self
            .backend
            .port_names()?
            .into_iter()
            .map(|name| OutputPortInfo {
                id: name.clone(),
                name,
            })
            .collect())
    }

    /// Id of the currently selected output
    pub fn selected_output_id(&self) -> Option<String> {
        self.selected.lock().as_ref().map(|s| s.info.id.clone())
    }

    /// Select an output by id, or clear the selection with `None`.
    ///
    /// The current output is closed before the new one is resolved. Matching
    /// tries the exact id first, then a case-insensitive substring.
    pub fn select_output(&self, id: Option<&str>) -> Result<Option<OutputPortInfo>, TransportError> {
        let mut selected = self.selected.lock();
        if let Some(previous) = selected.take() {
            info!("MIDI output closed: {}", previous.info.name);
            previous.connection.close();
        }

        let Some(id) = id.filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        let names = self.backend.port_names()?;
        let name = find_output_port(&names, id)
            .ok_or_else(|| TransportError::PortNotFound(id.to_string()))?;
        let connection = self.backend.connect(&name)?;

        let info = OutputPortInfo {
            id: name.clone(),
            name,
        };
        *selected = Some(SelectedOutput {
            info: info.clone(),
            connection,
        });

        info!("MIDI output selected: {}", info.name);
        Ok(Some(info))
    }

    /// Drop the selection if its port has disappeared.
    ///
    /// Returns true when the selection was cleared.
    pub fn refresh(&self) -> Result<bool, TransportError> {
        let outputs = self.list_outputs()?;
        let mut selected = self.selected.lock();
        let gone = selected
            .as_ref()
            .is_some_and(|s| !outputs.iter().any(|o| o.id == s.info.id));
        if gone {
            if let Some(previous) = selected.take() {
                warn!("MIDI output '{}' disappeared, clearing selection", previous.info.name);
                previous.connection.close();
            }
        }
        Ok(gone)
    }
}

impl<B: OutputBackend> MidiTransport for MidirTransport<B> {
    fn send(&self, message: MidiMessage) -> Result<(), TransportError> {
        let mut selected = self.selected.lock();
        let Some(output) = selected.as_mut() else {
            trace!("MIDI TX skipped (no output selected): {}", message);
            return Ok(());
        };

        let bytes = message.encode();
        match output.connection.send(&bytes) {
            Ok(()) => {
                debug!("MIDI TX -> {}: {} [{}]", output.info.name, message, format_hex(&bytes));
                Ok(())
            }
            Err(e) => {
                // Broken connection: close it so later sends become no-ops
                if let Some(broken) = selected.take() {
                    broken.connection.close();
                }
                Err(TransportError::Send(e))
            }
        }
    }
}

/// Find a port by exact name, then by case-insensitive substring
fn find_output_port(names: &[String], pattern: &str) -> Option<String> {
    if let Some(exact) = names.iter().find(|name| *name == pattern) {
        return Some(exact.clone());
    }

    let needle = pattern.to_lowercase();
    names
        .iter()
        .find(|name| name.to_lowercase().contains(&needle))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct PortLog {
        ports: Vec<String>,
        sent: Vec<(String, [u8; 3])>,
        closed: Vec<String>,
        broken: bool,
    }

    #[derive(Clone, Default)]
    struct FakeBackend(Arc<Mutex<PortLog>>);

    impl FakeBackend {
        fn with_ports(ports: &[&str]) -> Self {
            let backend = Self::default();
            backend.0.lock().ports = ports.iter().map(|p| p.to_string()).collect();
            backend
        }
    }

    struct FakeConnection {
        port: String,
        log: Arc<Mutex<PortLog>>,
    }

    impl OutputConnection for FakeConnection {
        fn send(&mut self, bytes: &[u8]) -> Result<(), midir::SendError> {
            let mut log = self.log.lock();
            if log.broken {
                return Err(midir::SendError::Other("port gone"));
            }
            log.sent.push((self.port.clone(), [bytes[0], bytes[1], bytes[2]]));
            Ok(())
        }

        fn close(self) {
            self.log.lock().closed.push(self.port);
        }
    }

    impl OutputBackend for FakeBackend {
        type Connection = FakeConnection;

        fn port_names(&self) -> Result<Vec<String>, TransportError> {
            Ok(self.0.lock().ports.clone())
        }

        fn connect(&self, port_name: &str) -> Result<FakeConnection, TransportError> {
            Ok(FakeConnection {
                port: port_name.to_string(),
                log: self.0.clone(),
            })
        }
    }

    #[test]
    fn test_send_without_selection_is_noop() {
        let backend = FakeBackend::with_ports(&["Synth A"]);
        let transport = MidirTransport::with_backend(backend.clone());

        transport.send_control_change(1, 64, 1).unwrap();
        assert!(backend.0.lock().sent.is_empty());
    }

    #[test]
    fn test_select_matches_exact_then_substring() {
        let backend = FakeBackend::with_ports(&["loopMIDI Port", "loopMIDI Port 2"]);
        let transport = MidirTransport::with_backend(backend);

        let exact = transport.select_output(Some("loopMIDI Port 2")).unwrap();
        assert_eq!(exact.map(|p| p.id), Some("loopMIDI Port 2".to_string()));

        let fuzzy = transport.select_output(Some("loopmidi")).unwrap();
        assert_eq!(fuzzy.map(|p| p.id), Some("loopMIDI Port".to_string()));
    }

    #[test]
    fn test_failed_selection_closes_previous_output() {
        let backend = FakeBackend::with_ports(&["Synth A"]);
        let transport = MidirTransport::with_backend(backend.clone());

        transport.select_output(Some("Synth A")).unwrap();
        transport.send_control_change(1, 10, 1).unwrap();

        let result = transport.select_output(Some("Missing"));
        assert!(matches!(result, Err(TransportError::PortNotFound(_))));
        assert_eq!(transport.selected_output_id(), None);

        // Nothing reaches the old port after the switch
        transport.send_control_change(1, 20, 1).unwrap();
        let log = backend.0.lock();
        assert_eq!(log.sent, vec![("Synth A".to_string(), [0xB0, 1, 10])]);
        assert_eq!(log.closed, vec!["Synth A".to_string()]);
    }

    #[test]
    fn test_wanted_port_can_be_selected_once_it_appears() {
        let backend = FakeBackend::with_ports(&[]);
        let transport = MidirTransport::with_backend(backend.clone());

        assert!(transport.select_output(Some("Synth B")).is_err());
        backend.0.lock().ports.push("Synth B".to_string());

        assert!(!transport.refresh().unwrap());
        assert_eq!(transport.selected_output_id(), None);
        transport.select_output(Some("Synth B")).unwrap();
        assert_eq!(transport.selected_output_id(), Some("Synth B".to_string()));
    }

    #[test]
    fn test_refresh_clears_vanished_port() {
        let backend = FakeBackend::with_ports(&["Synth A"]);
        let transport = MidirTransport::with_backend(backend.clone());
        transport.select_output(Some("Synth A")).unwrap();

        backend.0.lock().ports.clear();
        assert!(transport.refresh().unwrap());
        assert_eq!(transport.selected_output_id(), None);
        assert_eq!(backend.0.lock().closed, vec!["Synth A".to_string()]);
    }

    #[test]
    fn test_send_failure_drops_connection() {
        let backend = FakeBackend::with_ports(&["Synth A"]);
        let transport = MidirTransport::with_backend(backend.clone());
        transport.select_output(Some("Synth A")).unwrap();

        backend.0.lock().broken = true;
        assert!(matches!(
            transport.send_note_on(60, 100, 1),
            Err(TransportError::Send(_))
        ));
        assert_eq!(transport.selected_output_id(), None);
        assert!(transport.send_note_on(60, 100, 1).is_ok());
    }
}
