//! MIDI message types and value clamping
//!
//! Only the channel voice messages the mapper emits are modelled: Note On,
//! Note Off and Control Change. Channels are stored 0-based (0-15) and shown
//! 1-based, matching the way MIDI tools display them.

use std::fmt;

/// MIDI messages produced by the mapping engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },
}

impl MidiMessage {
    /// Build a Control Change from user-facing numbers.
    ///
    /// `channel` is 1-based. Every argument is clamped into its protocol
    /// range, so out-of-range input never fails.
    pub fn control_change(cc: i64, value: i64, channel: i64) -> Self {
        MidiMessage::ControlChange {
            channel: clamp::channel_index(channel),
            cc: clamp::data_byte(cc),
            value: clamp::data_byte(value),
        }
    }

    /// Build a Note On from user-facing numbers (1-based channel, clamped).
    pub fn note_on(note: i64, velocity: i64, channel: i64) -> Self {
        MidiMessage::NoteOn {
            channel: clamp::channel_index(channel),
            note: clamp::data_byte(note),
            velocity: clamp::data_byte(velocity),
        }
    }

    /// Build a Note Off from user-facing numbers (1-based channel, clamped).
    pub fn note_off(note: i64, channel: i64) -> Self {
        MidiMessage::NoteOff {
            channel: clamp::channel_index(channel),
            note: clamp::data_byte(note),
            velocity: 0,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> [u8; 3] {
        match *self {
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => [0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::ControlChange { channel, cc, value } => {
                [0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
        }
    }

    /// Channel (0-15)
    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::ControlChange { channel, .. } => channel,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity),
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity),
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
        }
    }
}

/// Clamping of user-facing numbers into MIDI protocol ranges
pub mod clamp {
    /// Clamp to a 7-bit data byte (0-127)
    pub fn data_byte(value: i64) -> u8 {
        value.clamp(0, 127) as u8
    }

    /// Clamp a 1-based channel (1-16) and convert it to the 0-based index
    pub fn channel_index(channel: i64) -> u8 {
        (channel.clamp(1, 16) - 1) as u8
    }

    /// Round a computed output value the way the mapper sends it.
    ///
    /// Non-finite values collapse to 0.
    pub fn round_value(value: f64) -> i64 {
        if value.is_finite() {
            value.round() as i64
        } else {
            0
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
