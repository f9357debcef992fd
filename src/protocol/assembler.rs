//! Reassembly of notification fragments into logical messages.
//!
//! The device sends one header fragment per message followed by continuation
//! fragments sized by the radio MTU. There is no sequence number, so
//! completion is purely length driven and ordering is trusted to the
//! transport.

use bytes::Bytes;

use crate::protocol::frame::{Fragment, HEADER_LEN, LengthTable, MessageKind, classify_fragment};

/// A message sealed by the last fragment fed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Complete status payload, exactly the status payload length.
    Status(Bytes),
    /// Any other message kind; its payload is not kept.
    Other(MessageKind),
}

/// Stateful accumulator turning fragments into sealed messages.
#[derive(Debug)]
pub struct MessageReassembler {
    table: LengthTable,
    active_kind: MessageKind,
    buffer: Vec<u8>,
    bytes_received: usize,
    drop_repeats: bool,
    last_fragment: Option<Bytes>,
    malformed_headers: u64,
}

impl MessageReassembler {
    /// Creates a reassembler for the given length table.
    #[must_use]
    pub fn new(table: LengthTable) -> Self {
        Self {
            table,
            active_kind: MessageKind::None,
            buffer: vec![0; table.payload_len(MessageKind::Status)],
            bytes_received: 0,
            drop_repeats: false,
            last_fragment: None,
            malformed_headers: 0,
        }
    }

    /// Discards a status continuation identical to the fragment before it.
    #[must_use]
    pub const fn drop_repeated_fragments(mut self, enabled: bool) -> Self {
        self.drop_repeats = enabled;
        self
    }

    /// Kind of the message currently being assembled.
    #[must_use]
    pub const fn active_kind(&self) -> MessageKind {
        self.active_kind
    }

    /// Payload bytes counted for the message in progress.
    #[must_use]
    pub const fn bytes_received(&self) -> usize {
        self.bytes_received
    }

    /// Number of fragments seen with the magic prefix but an unknown code.
    #[must_use]
    pub const fn malformed_headers(&self) -> u64 {
        self.malformed_headers
    }

    /// Forgets any message in progress.
    pub fn reset(&mut self) {
        self.active_kind = MessageKind::None;
        self.bytes_received = 0;
        self.last_fragment = None;
    }

    /// Feeds one fragment, returning the message it completes, if any.
    pub fn feed(&mut self, fragment: &[u8]) -> Option<Completion> {
        match classify_fragment(fragment, &self.table) {
            Ok(Fragment::Header { kind, .. }) => self.start(kind, &fragment[HEADER_LEN..]),
            Ok(Fragment::Continuation) => {
                if self.active_kind == MessageKind::None {
                    tracing::trace!("ignoring {} bytes outside any message", fragment.len());
                    return None;
                }
                self.extend(fragment);
            }
            Err(e) => {
                // Treated as a continuation of whatever is active
                self.malformed_headers += 1;
                tracing::warn!("{}, treating as continuation of {:?}", e, self.active_kind);
                if self.active_kind == MessageKind::None {
                    return None;
                }
                self.extend(fragment);
            }
        }

        self.seal()
    }

    fn start(&mut self, kind: MessageKind, payload: &[u8]) {
        if self.active_kind != MessageKind::None {
            tracing::debug!(
                "header for {:?} replaces unfinished {:?} at {} bytes",
                kind,
                self.active_kind,
                self.bytes_received
            );
        }
        self.active_kind = kind;
        self.bytes_received = 0;
        self.last_fragment = None;
        self.extend(payload);
    }

    fn extend(&mut self, data: &[u8]) {
        if self.active_kind == MessageKind::Status {
            if self.drop_repeats && self.last_fragment.as_deref() == Some(data) {
                tracing::trace!("dropping repeated fragment of {} bytes", data.len());
                return;
            }
            let start = self.bytes_received.min(self.buffer.len());
            let end = (self.bytes_received + data.len()).min(self.buffer.len());
            self.buffer[start..end].copy_from_slice(&data[..end - start]);
            self.last_fragment = Some(Bytes::copy_from_slice(data));
        }
        self.bytes_received += data.len();
    }

    fn seal(&mut self) -> Option<Completion> {
        if self.bytes_received < self.table.payload_len(self.active_kind) {
            return None;
        }

        let kind = self.active_kind;
        self.reset();

        match kind {
            MessageKind::Status => Some(Completion::Status(Bytes::copy_from_slice(&self.buffer))),
            other => Some(Completion::Other(other)),
        }
    }
}

impl Default for MessageReassembler {
    fn default() -> Self {
        Self::new(LengthTable::default())
    }
}
