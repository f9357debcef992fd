//! Data types for NEX devices.
//!
//! This module contains the value types shared across the library:
//! - Readings decoded from status messages
//! - Connection state of a session

pub mod connection;
pub mod reading;

pub use connection::ConnectionState;
pub use reading::{DeviceReading, OperationMode, StatusResponse};
