//! Fragment classification for the NEX notification stream.
//!
//! Every logical message starts with one header fragment:
//! ```text
//! ┌──────────────┬─────────────┬──────────────────┐
//! │ AA AA AA AA  │ length code │ payload (start)  │
//! │   4 bytes    │   1 byte    │  0..MTU-5 bytes  │
//! └──────────────┴─────────────┴──────────────────┘
//! ```
//! followed by zero or more continuation fragments without any prefix. The
//! length code counts itself plus the payload, so a message is complete once
//! `code - 1` payload bytes have arrived.

use crate::error::FrameError;

/// Magic prefix opening every message, in both directions.
pub const MESSAGE_MAGIC: [u8; 4] = [0xAA; 4];

/// Magic prefix plus the length code byte.
pub const HEADER_LEN: usize = 5;

/// Kind of a logical message sent by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MessageKind {
    /// Short acknowledgement of a command.
    Acknowledge,
    /// Live status block (temperatures, limits, operating time).
    Status,
    /// Heating schedule block (not interpreted).
    Schedule,
    /// No message in progress.
    #[default]
    None,
}

/// Length codes per message kind for one firmware revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthTable {
    /// Code announcing an acknowledgement.
    pub acknowledge: u8,
    /// Code announcing a status block.
    pub status: u8,
    /// Code announcing a schedule block.
    pub schedule: u8,
    /// Code used for the idle kind.
    pub none: u8,
}

impl LengthTable {
    /// Creates a table from explicit length codes.
    #[must_use]
    pub const fn new(acknowledge: u8, status: u8, schedule: u8, none: u8) -> Self {
        Self {
            acknowledge,
            status,
            schedule,
            none,
        }
    }

    /// Looks up the message kind announced by a length code.
    #[must_use]
    pub const fn kind_for_code(&self, code: u8) -> Option<MessageKind> {
        if code == self.acknowledge {
            Some(MessageKind::Acknowledge)
        } else if code == self.status {
            Some(MessageKind::Status)
        } else if code == self.schedule {
            Some(MessageKind::Schedule)
        } else if code == self.none {
            Some(MessageKind::None)
        } else {
            None
        }
    }

    /// Returns the length code of a message kind.
    #[must_use]
    pub const fn code(&self, kind: MessageKind) -> u8 {
        match kind {
            MessageKind::Acknowledge => self.acknowledge,
            MessageKind::Status => self.status,
            MessageKind::Schedule => self.schedule,
            MessageKind::None => self.none,
        }
    }

    /// Number of payload bytes (after the header) that seal a message.
    #[must_use]
    pub const fn payload_len(&self, kind: MessageKind) -> usize {
        self.code(kind).saturating_sub(1) as usize
    }
}

impl Default for LengthTable {
    fn default() -> Self {
        Self::new(2, 49, 149, 1)
    }
}

/// Classification of one inbound fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment {
    /// First fragment of a new message.
    Header {
        /// Kind announced by the length code.
        kind: MessageKind,
        /// Raw length code from byte 4.
        declared_length: u8,
    },
    /// Any fragment without the magic prefix.
    Continuation,
}

/// Classifies a fragment as a message header or a continuation.
///
/// # Errors
///
/// Returns `FrameError::MalformedHeader` when the fragment starts with the
/// magic prefix but carries no length code, or one missing from `table`.
pub fn classify_fragment(fragment: &[u8], table: &LengthTable) -> Result<Fragment, FrameError> {
    if !fragment.starts_with(&MESSAGE_MAGIC) {
        return Ok(Fragment::Continuation);
    }

    let code = fragment.get(MESSAGE_MAGIC.len()).copied();
    match code.and_then(|c| table.kind_for_code(c).map(|kind| (kind, c))) {
        Some((kind, declared_length)) => Ok(Fragment::Header {
            kind,
            declared_length,
        }),
        None => Err(FrameError::MalformedHeader { code }),
    }
}
