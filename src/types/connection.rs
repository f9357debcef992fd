//! Session connection state.

/// Lifecycle of the radio link for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport handle.
    #[default]
    Disconnected,
    /// A connect attempt is running.
    Connecting,
    /// Link is up but notifications are not flowing yet.
    Connected,
    /// Link is up and notifications are delivered to the reassembler.
    NotifySubscribed,
}

impl ConnectionState {
    /// Returns true once the link is usable for commands.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::NotifySubscribed)
    }
}
