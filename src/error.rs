//! Error types for the nexbt library.

use thiserror::Error;

/// The main error type for NEX device operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A single connect attempt did not finish in time.
    #[error("connect attempt timed out after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },

    /// Every connect attempt in the budget failed.
    #[error("could not connect after {attempts} attempts")]
    ConnectFailed {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Every notification subscribe attempt in the budget failed.
    #[error("could not subscribe to notifications after {attempts} attempts")]
    NotifySubscribeFailed {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// No complete status message arrived before the deadline.
    #[error("no status response within {timeout_ms}ms")]
    ResponseTimeout { timeout_ms: u64 },

    /// The transport dropped the connection mid-session.
    #[error("transport connection lost")]
    TransportLost,

    /// Address resolution found no device.
    #[error("no device found at address {address}")]
    DeviceNotFound { address: String },

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// Error reported by the underlying radio transport.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Frame encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

impl Error {
    /// Builds a transport error from anything printable.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Frame-specific errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    /// Fragment carries the magic prefix but an unknown length code.
    ///
    /// `code` is `None` when the fragment ends right after the prefix.
    #[error("malformed header: unknown length code {code:?}")]
    MalformedHeader { code: Option<u8> },

    /// Payload too short for the configured field layout.
    #[error("payload too short: expected {expected} bytes, got {got}")]
    TooShort { expected: usize, got: usize },

    /// Target temperature cannot be encoded in the one-byte field.
    #[error("temperature {value} does not fit the command field")]
    TemperatureOutOfRange { value: f64 },
}

/// Result type alias for nexbt operations.
pub type Result<T> = std::result::Result<T, Error>;
