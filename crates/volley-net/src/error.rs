//! Error types for the HTTP engine.

use std::fmt;

use volley_core::TransferError;

/// Failure to set up an [`HttpEngine`](crate::HttpEngine).
#[derive(Debug, Clone)]
pub enum NetworkError {
    /// The transfer runtime could not be started.
    Runtime(String),
    /// The HTTP client could not be built.
    Client(String),
    /// Proxy configuration error.
    Proxy(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runtime(msg) => write!(f, "Failed to start transfer runtime: {msg}"),
            Self::Client(msg) => write!(f, "Failed to build HTTP client: {msg}"),
            Self::Proxy(msg) => write!(f, "Proxy error: {msg}"),
        }
    }
}

impl std::error::Error for NetworkError {}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        Self::Client(err.to_string())
    }
}

/// A specialized Result type for engine setup.
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Classify a per-transfer reqwest failure.
pub(crate) fn transfer_error(err: reqwest::Error) -> TransferError {
    if err.is_timeout() {
        TransferError::Timeout
    } else if err.is_connect() {
        TransferError::Connection(err.to_string())
    } else if err.is_builder() {
        TransferError::InvalidLocator(err.to_string())
    } else {
        TransferError::Request(err.to_string())
    }
}
