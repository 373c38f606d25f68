//! Output transports for mapped MIDI messages
//!
//! The mapping engine only talks to the [`MidiTransport`] trait. The
//! convenience senders clamp every argument into its protocol range before
//! building the message, so callers can pass raw computed values.

mod midir_out;
mod recording;

pub use midir_out::{MidirBackend, MidirTransport, OutputBackend, OutputConnection, OutputPortInfo};
pub use recording::{LogTransport, RecordingTransport};

use crate::midi::MidiMessage;
use thiserror::Error;

/// Errors raised by an output transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("MIDI backend unavailable: {0}")]
    Backend(#[from] midir::InitError),

    #[error("MIDI output port '{0}' not found")]
    PortNotFound(String),

    #[error("failed to connect to MIDI output '{port}': {reason}")]
    Connect { port: String, reason: String },

    #[error("MIDI send failed: {0}")]
    Send(#[from] midir::SendError),
}

/// Destination for mapped MIDI messages
///
/// Implementations must be a silent no-op when no destination is selected.
pub trait MidiTransport {
    /// Send an already-built message
    fn send(&self, message: MidiMessage) -> Result<(), TransportError>;

    /// Send a Control Change (cc 0-127, value 0-127, channel 1-16; clamped)
    fn send_control_change(&self, cc: i64, value: i64, channel: i64) -> Result<(), TransportError> {
        self.send(MidiMessage::control_change(cc, value, channel))
    }

    /// Send a Note On (note 0-127, velocity 0-127, channel 1-16; clamped)
    fn send_note_on(&self, note: i64, velocity: i64, channel: i64) -> Result<(), TransportError> {
        self.send(MidiMessage::note_on(note, velocity, channel))
    }

    /// Send a Note Off (note 0-127, channel 1-16; clamped)
    fn send_note_off(&self, note: i64, channel: i64) -> Result<(), TransportError> {
        self.send(MidiMessage::note_off(note, channel))
    }
}

impl<T: MidiTransport + ?Sized> MidiTransport for &T {
    fn send(&self, message: MidiMessage) -> Result<(), TransportError> {
        (**self).send(message)
    }
}

impl<T: MidiTransport + ?Sized> MidiTransport for Box<T> {
    fn send(&self, message: MidiMessage) -> Result<(), TransportError> {
        (**self).send(message)
    }
}
