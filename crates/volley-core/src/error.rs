//! Error types for volley.
//!
//! Errors fall into three groups:
//!
//! - [`TransferError`]: a single task failed. Recorded on the task and handed to
//!   the caller through [`Action::done`](crate::Action::done); never retried.
//! - [`EngineError`]: the transfer engine could not report descriptors, a wait
//!   bound, or run a step. The executor logs these and keeps going.
//! - [`VolleyError`]: returned synchronously by the [`Router`](crate::Router)
//!   when a task cannot be accepted at all.

use crate::buffer::BufferError;

/// Why a single transfer failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// The locator could not be turned into a request URL.
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),
    /// The transfer timed out.
    #[error("Transfer timed out")]
    Timeout,
    /// Connection refused or failed.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Any other failure reported by the transfer layer.
    #[error("Transfer error: {0}")]
    Request(String),
    /// A file upload field could not be read.
    #[error("Failed to read upload file '{path}': {message}")]
    UploadFile {
        /// Path named by the upload field.
        path: String,
        /// Underlying I/O message.
        message: String,
    },
    /// The progress callback asked for the transfer to stop.
    #[error("Transfer aborted by progress callback")]
    Aborted,
    /// The task was cancelled by the caller or by router shutdown.
    #[error("Transfer was cancelled")]
    Cancelled,
    /// Growing the receive buffer failed.
    #[error("Failed to allocate {requested} bytes for the response body")]
    Allocation {
        /// Capacity that could not be reserved.
        requested: usize,
    },
}

impl From<BufferError> for TransferError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::Allocation { requested } => Self::Allocation { requested },
        }
    }
}

/// Engine-level failure that affects polling, not any single transfer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Running a non-blocking step failed.
    #[error("Failed to perform transfers: {0}")]
    Perform(String),
    /// Querying the suggested wait bound failed.
    #[error("Failed to query wait bound: {0}")]
    Timeout(String),
    /// Waiting for transfer activity failed.
    #[error("Failed to wait for transfer activity: {0}")]
    Wait(String),
}

/// Errors returned by [`Router`](crate::Router) operations.
#[derive(Debug, thiserror::Error)]
pub enum VolleyError {
    /// The router has been shut down and no longer accepts tasks.
    #[error("Router has been shut down")]
    ShutDown,
    /// The executor thread could not be started.
    #[error("Failed to spawn executor thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A specialized Result type for router operations.
pub type Result<T> = std::result::Result<T, VolleyError>;
