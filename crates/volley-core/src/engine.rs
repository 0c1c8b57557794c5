//! The boundary between the executor and a transfer engine.
//!
//! A transfer engine runs the actual network transfers. The executor owns the
//! engine and is the only thread that calls into it: it registers admitted
//! tasks, repeatedly asks the engine to make progress, waits for activity with
//! a bounded timeout, and drains completions.
//!
//! While performing a step the engine reports received bytes and progress to a
//! [`TransferSink`] supplied by the executor.

use std::time::Duration;

use crate::action::{ProgressControl, TransferProgress};
use crate::error::{EngineError, TransferError};
use crate::task::{Mark, Request};

/// A finished transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    /// The task the transfer belonged to.
    pub mark: Mark,
    /// HTTP status on success, or the reason the transfer failed.
    pub result: Result<u16, TransferError>,
}

/// Receives data and progress from the engine during [`TransferEngine::perform`].
pub trait TransferSink {
    /// Deliver a chunk of response body for `mark`.
    ///
    /// An error aborts the transfer; the engine completes it with that error.
    fn write(&mut self, mark: Mark, chunk: &[u8]) -> Result<(), TransferError>;

    /// Report progress for `mark`.
    ///
    /// [`ProgressControl::Abort`] aborts the transfer; the engine completes it
    /// with [`TransferError::Aborted`].
    fn progress(&mut self, mark: Mark, progress: &TransferProgress) -> ProgressControl;
}

/// A non-blocking, multiplexing transfer engine.
pub trait TransferEngine: Send {
    /// Start a transfer for `mark`.
    ///
    /// An error means the transfer never started; no completion will follow.
    fn register(&mut self, mark: Mark, request: &Request) -> Result<(), TransferError>;

    /// Make as much progress as possible without blocking.
    ///
    /// Returns the number of transfers still running.
    fn perform(&mut self, sink: &mut dyn TransferSink) -> Result<usize, EngineError>;

    /// How long the engine would like the executor to wait before the next
    /// step, or `None` if it has no preference.
    fn timeout(&mut self) -> Result<Option<Duration>, EngineError>;

    /// Block until there is transfer activity or `bound` elapses.
    fn wait(&mut self, bound: Duration) -> Result<(), EngineError>;

    /// Take the next completed transfer, if any.
    fn next_completion(&mut self) -> Option<Completion>;

    /// Stop a running transfer. It completes with `reason`.
    fn abort(&mut self, mark: Mark, reason: TransferError);

    /// Release everything held for `mark`.
    fn unregister(&mut self, mark: Mark);

    /// Number of transfers that have started and not yet completed.
    fn in_flight(&self) -> usize;
}
