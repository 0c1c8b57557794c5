//! Caller-supplied completion and progress callbacks.
//!
//! An [`Action`] is attached to every task. The executor calls
//! [`Action::done`] exactly once when the task finishes, and
//! [`Action::progress`] zero or more times while it is in flight, no more often
//! than [`Action::progress_interval`] per task. Both run on the executor thread.
//!
//! One action may be shared by many tasks.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use volley_core::{Action, ProgressControl, Task, TransferProgress};
//!
//! struct Print;
//!
//! impl Action for Print {
//!     fn done(&self, task: &Task) {
//!         println!("{} finished: {:?}", task.mark(), task.response().status());
//!     }
//!
//!     fn progress(&self, progress: &TransferProgress, _task: &Task) -> ProgressControl {
//!         println!("{:?}% done", progress.percent());
//!         ProgressControl::Continue
//!     }
//! }
//!
//! let action: Arc<dyn Action> = Arc::new(Print);
//! ```

use std::fmt;
use std::time::Duration;

use crate::task::Task;

/// Default minimum time between two progress reports for one task.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// What the transfer should do after a progress report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ProgressControl {
    /// Keep transferring.
    #[default]
    Continue,
    /// Abort this transfer. The task completes with
    /// [`TransferError::Aborted`](crate::TransferError::Aborted).
    Abort,
}

/// A progress snapshot for one in-flight transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferProgress {
    /// Time since the transfer started.
    pub elapsed: Duration,
    /// Total bytes to download, or 0 if unknown.
    pub download_total: u64,
    /// Bytes downloaded so far.
    pub downloaded: u64,
    /// Total bytes to upload, or 0 if nothing is uploaded.
    pub upload_total: u64,
    /// Bytes uploaded so far.
    pub uploaded: u64,
}

impl TransferProgress {
    /// Download progress as a fraction (0.0 to 1.0), if the total is known.
    pub fn fraction(&self) -> Option<f64> {
        if self.download_total == 0 {
            None
        } else {
            Some((self.downloaded as f64 / self.download_total as f64).min(1.0))
        }
    }

    /// Download progress as a percentage (0 to 100), if the total is known.
    pub fn percent(&self) -> Option<u8> {
        self.fraction().map(|f| (f * 100.0) as u8)
    }
}

/// Completion and progress callbacks for a task.
pub trait Action: Send + Sync {
    /// Called exactly once when the task has finished, successfully or not.
    fn done(&self, task: &Task);

    /// Called periodically while the task is in flight.
    ///
    /// Returning [`ProgressControl::Abort`] stops this transfer only.
    fn progress(&self, progress: &TransferProgress, task: &Task) -> ProgressControl {
        let _ = (progress, task);
        ProgressControl::Continue
    }

    /// Minimum time between two progress reports for the same task.
    fn progress_interval(&self) -> Duration {
        DEFAULT_PROGRESS_INTERVAL
    }
}

/// An [`Action`] built from a completion closure.
pub struct FnAction<F> {
    on_done: F,
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction").finish_non_exhaustive()
    }
}

impl<F> Action for FnAction<F>
where
    F: Fn(&Task) + Send + Sync,
{
    fn done(&self, task: &Task) {
        (self.on_done)(task)
    }
}

/// Wrap a closure as an [`Action`] that ignores progress.
pub fn from_fn<F>(on_done: F) -> FnAction<F>
where
    F: Fn(&Task) + Send + Sync,
{
    FnAction { on_done }
}

/// Tracks when a task last reported progress.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ProgressThrottle {
    last: Duration,
}

impl ProgressThrottle {
    /// Returns `true` and records `elapsed` if a report is due.
    pub(crate) fn ready(&mut self, elapsed: Duration, interval: Duration) -> bool {
        if elapsed.saturating_sub(self.last) >= interval {
            self.last = elapsed;
            true
        } else {
            false
        }
    }
}
