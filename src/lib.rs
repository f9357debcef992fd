//! # nexbt
//!
//! An async protocol engine for NEX Bluetooth heating elements.
//!
//! The radio stack is supplied by the host through the [`TransportProvider`]
//! and [`Transport`] traits. This library handles everything above it:
//! command encoding, notification reassembly, status decoding and a session
//! that connects with bounded retries and pairs requests with responses.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Event stream of readings and connection changes
//! - Typed readings with temperatures, limits and energy use
//! - Retry budgets and protocol variants configurable per device
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use nexbt::{DeviceConfig, NexDevice, StatusResponse, TransportProvider};
//!
//! async fn poll<P: TransportProvider>(provider: Arc<P>) -> Result<(), nexbt::Error> {
//!     let device = NexDevice::new(provider, DeviceConfig::new("AA:BB:CC:DD:EE:FF"));
//!
//!     if let StatusResponse::Fresh(reading) = device.update_status().await? {
//!         println!("Water at {} degrees", reading.current_temp);
//!         println!("Energy used: {} kWh", reading.energy_used_kwh);
//!     }
//!
//!     device.turn_on(60.0).await?;
//!     device.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Wire format (fragments, commands, reassembly, status)
//! - [`types`] - Readings and connection state
//! - [`transport`] - Traits implemented by the host radio stack
//! - [`event`] - Async event system for readings and link changes
//! - [`session`] - Connection management and request/response pairing
//! - [`device`] - High-level [`NexDevice`] client
//! - [`registry`] - Devices keyed by address

pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use config::{DeviceConfig, ProtocolProfile, RetryBudget};
pub use device::NexDevice;
pub use error::{Error, FrameError, Result};
pub use event::{Event, EventDispatcher, Subscription};
pub use protocol::{CommandOpcode, LengthTable, MessageKind, StatusLayout};
pub use registry::SessionRegistry;
pub use session::Session;
pub use transport::{Transport, TransportProvider};
pub use types::{ConnectionState, DeviceReading, OperationMode, StatusResponse};
