//! In-process transports: recording (tests, tooling) and log-only (dry run)

use parking_lot::Mutex;
use tracing::info;

use super::{MidiTransport, TransportError};
use crate::midi::{format_hex, MidiMessage};

/// Transport that keeps every sent message in memory
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<MidiMessage>>,
    failing: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every send fails, without recording anything
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    /// Snapshot of all messages sent so far
    pub fn messages(&self) -> Vec<MidiMessage> {
        self.sent.lock().clone()
    }

    /// Drain the recorded messages
    pub fn take(&self) -> Vec<MidiMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Number of Note On messages sent so far
    pub fn note_on_count(&self) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|m| matches!(m, MidiMessage::NoteOn { .. }))
            .count()
    }
}

impl MidiTransport for RecordingTransport {
    fn send(&self, message: MidiMessage) -> Result<(), TransportError> {
        if self.failing {
            return Err(TransportError::PortNotFound("recording".to_string()));
        }
        self.sent.lock().push(message);
        Ok(())
    }
}

/// Transport that only logs what it would send
#[derive(Debug, Default)]
pub struct LogTransport;

impl MidiTransport for LogTransport {
    fn send(&self, message: MidiMessage) -> Result<(), TransportError> {
        info!("DRY {} [{}]", message, format_hex(&message.encode()));
        Ok(())
    }
}
