//! Transport layer for NEX communication.
//!
//! The radio stack itself lives outside this crate. Hosts implement
//! [`TransportProvider`] to resolve a device address into a [`Transport`]
//! handle; the session owns that handle exclusively.

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::Result;

/// Characteristic receiving command frames.
pub const WRITE_CHARACTERISTIC: &str = "d973f2e2-b19e-11e2-9e96-0800200c9a66";

/// Characteristic delivering notification fragments.
pub const NOTIFY_CHARACTERISTIC: &str = "d973f2e1-b19e-11e2-9e96-0800200c9a66";

/// Trait for a connected-or-connectable radio link to one device.
pub trait Transport: Send + Sync {
    /// Connects to the device, giving up after `timeout`.
    fn connect(&mut self, timeout: Duration) -> BoxFuture<'_, Result<()>>;

    /// Disconnects from the device.
    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Writes data to a characteristic without response.
    fn write(&mut self, characteristic: &'static str, data: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Starts notifications on a characteristic.
    ///
    /// Every notification payload must be sent to `fragments` in delivery
    /// order. Dropping the sender signals that the stream has ended.
    fn subscribe_notify(
        &mut self,
        characteristic: &'static str,
        fragments: mpsc::Sender<Bytes>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Returns true if connected.
    fn is_connected(&self) -> bool;
}

/// Resolves device addresses into transport handles.
pub trait TransportProvider: Send + Sync + 'static {
    /// Transport type produced by this provider.
    type Transport: Transport + 'static;

    /// Finds a connectable device by address.
    fn find_transport_by_address(&self, address: &str) -> Option<Self::Transport>;
}
