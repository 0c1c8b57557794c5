//! The executor: a single background thread driving every transfer.
//!
//! Each cycle first settles cancellations requested since the last one, then
//! runs four phases until the queue is closed:
//!
//! 1. **Fill**: admit unadmitted tasks in queue order while fewer than
//!    `max_in_flight` transfers are running. Fill runs every cycle, so the
//!    window is replenished as soon as transfers complete.
//! 2. **Idle-wait**: with nothing in flight, block on the queue's condition
//!    variable, bounded by `idle_wait`.
//! 3. **Drive**: let the engine perform a non-blocking step, then wait for
//!    activity bounded by the engine's hint or `wait_bound`, whichever is
//!    shorter.
//! 4. **Harvest**: for each completed transfer, record its status, release the
//!    engine handle, call [`Action::done`](crate::Action::done), and remove the
//!    task from the queue.
//!
//! Engine errors are logged and the loop continues. Callbacks run on this
//! thread; a panicking callback is contained to its own task.
//!
//! On shutdown every task still in flight or queued is completed with
//! [`TransferError::Cancelled`], so `done` still runs exactly once per task.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::action::{ProgressControl, TransferProgress};
use crate::engine::{Completion, TransferEngine, TransferSink};
use crate::error::TransferError;
use crate::logging::{span_names, targets};
use crate::queue::SharedTaskQueue;
use crate::task::{Mark, Task};

/// Default size of the in-flight window.
pub const MAX_IN_FLIGHT: usize = 9;

/// Default bound for the idle wait and for engine waits without a hint.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(100);

/// Configuration for the executor thread.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Name for the executor thread.
    pub name: String,
    /// Stack size for the executor thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
    /// Maximum number of concurrently running transfers.
    pub max_in_flight: usize,
    /// How long to block when there is nothing to do.
    pub idle_wait: Duration,
    /// Upper bound for a single engine wait.
    pub wait_bound: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: "volley-executor".to_string(),
            stack_size: None,
            max_in_flight: MAX_IN_FLIGHT,
            idle_wait: DEFAULT_WAIT,
            wait_bound: DEFAULT_WAIT,
        }
    }
}

/// A snapshot of executor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Transfers currently running.
    pub in_flight: usize,
    /// Highest number of transfers ever running at once.
    pub peak_in_flight: usize,
    /// Tasks admitted to the engine.
    pub admitted: u64,
    /// Tasks whose `done` callback has been called.
    pub completed: u64,
}

/// Counters shared between the executor and its owner.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    admitted: AtomicU64,
    completed: AtomicU64,
}

impl Counters {
    fn set_in_flight(&self, in_flight: usize) {
        self.in_flight.store(in_flight, Ordering::Release);
        self.peak_in_flight.fetch_max(in_flight, Ordering::AcqRel);
    }

    pub(crate) fn snapshot(&self) -> ExecutorStats {
        ExecutorStats {
            in_flight: self.in_flight.load(Ordering::Acquire),
            peak_in_flight: self.peak_in_flight.load(Ordering::Acquire),
            admitted: self.admitted.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Acquire),
        }
    }
}

/// Routes engine callbacks to in-flight tasks.
struct Dispatch<'a> {
    in_flight: &'a mut HashMap<Mark, Task>,
}

impl TransferSink for Dispatch<'_> {
    fn write(&mut self, mark: Mark, chunk: &[u8]) -> Result<(), TransferError> {
        match self.in_flight.get_mut(&mark) {
            Some(task) => task.response_mut().receive(chunk),
            None => Ok(()),
        }
    }

    fn progress(&mut self, mark: Mark, progress: &TransferProgress) -> ProgressControl {
        let Some(task) = self.in_flight.get_mut(&mark) else {
            return ProgressControl::Continue;
        };
        task.response_mut()
            .note_download_total(progress.download_total);

        let action = task.action().clone();
        if !task
            .throttle_mut()
            .ready(progress.elapsed, action.progress_interval())
        {
            return ProgressControl::Continue;
        }

        let task = &*task;
        match catch_unwind(AssertUnwindSafe(|| action.progress(progress, task))) {
            Ok(control) => control,
            Err(_) => {
                tracing::error!(target: targets::EXECUTOR, %mark, "progress callback panicked; aborting transfer");
                ProgressControl::Abort
            }
        }
    }
}

/// The reactor loop. Owns the engine and every in-flight task.
pub(crate) struct Executor {
    config: ExecutorConfig,
    queue: Arc<SharedTaskQueue>,
    engine: Box<dyn TransferEngine>,
    in_flight: HashMap<Mark, Task>,
    counters: Arc<Counters>,
}

impl Executor {
    pub(crate) fn new(
        config: ExecutorConfig,
        queue: Arc<SharedTaskQueue>,
        engine: Box<dyn TransferEngine>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            config,
            queue,
            engine,
            in_flight: HashMap::new(),
            counters,
        }
    }

    /// Start the reactor on a dedicated thread.
    pub(crate) fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        let mut builder = thread::Builder::new().name(self.config.name.clone());
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        builder.spawn(move || self.run())
    }

    /// Run until the queue is closed, then settle every remaining task.
    pub(crate) fn run(mut self) {
        let span = tracing::info_span!(target: targets::EXECUTOR, span_names::EXECUTOR);
        let _entered = span.enter();
        tracing::debug!(
            target: targets::EXECUTOR,
            max_in_flight = self.config.max_in_flight,
            "executor started"
        );

        while !self.queue.is_closed() {
            self.settle_cancellations();
            self.fill();
            if self.in_flight.is_empty() {
                self.queue.wait_for_work(self.config.idle_wait);
                continue;
            }
            self.drive();
            self.harvest();
        }

        self.shut_down();
        tracing::debug!(target: targets::EXECUTOR, "executor stopped");
    }

    fn fill(&mut self) {
        while self.in_flight.len() < self.config.max_in_flight {
            let Some(task) = self.queue.admit_next() else {
                break;
            };
            self.admit(task);
        }
        self.counters.set_in_flight(self.in_flight.len());
    }

    fn admit(&mut self, mut task: Task) {
        let mark = task.mark();
        self.counters.admitted.fetch_add(1, Ordering::AcqRel);
        match self.engine.register(mark, task.request()) {
            Ok(()) => {
                tracing::debug!(
                    target: targets::EXECUTOR,
                    %mark,
                    method = %task.request().method(),
                    locator = %task.request().locator(),
                    "task admitted"
                );
                self.in_flight.insert(mark, task);
            }
            Err(err) => {
                tracing::warn!(target: targets::EXECUTOR, %mark, error = %err, "failed to start transfer");
                task.response_mut().finish(Err(err));
                self.complete(task);
            }
        }
    }

    fn drive(&mut self) {
        let mut sink = Dispatch {
            in_flight: &mut self.in_flight,
        };
        let running = match self.engine.perform(&mut sink) {
            Ok(running) => running,
            Err(err) => {
                tracing::warn!(target: targets::EXECUTOR, error = %err, "engine step failed");
                self.engine.in_flight()
            }
        };
        if running == 0 {
            return;
        }

        let bound = match self.engine.timeout() {
            Ok(Some(hint)) => hint.min(self.config.wait_bound),
            Ok(None) => self.config.wait_bound,
            Err(err) => {
                tracing::warn!(target: targets::EXECUTOR, error = %err, "engine wait hint unavailable");
                self.config.wait_bound
            }
        };
        if let Err(err) = self.engine.wait(bound) {
            tracing::warn!(target: targets::EXECUTOR, error = %err, "engine wait failed");
        }
    }

    fn harvest(&mut self) {
        while let Some(Completion { mark, result }) = self.engine.next_completion() {
            let Some(mut task) = self.in_flight.remove(&mark) else {
                tracing::trace!(target: targets::EXECUTOR, %mark, "completion for unknown task");
                continue;
            };
            self.engine.unregister(mark);
            task.response_mut().finish(result);
            self.counters.set_in_flight(self.in_flight.len());
            self.complete(task);
        }
    }

    fn settle_cancellations(&mut self) {
        let cancellations = self.queue.take_cancellations();
        for mut task in cancellations.withdrawn {
            task.response_mut().finish(Err(TransferError::Cancelled));
            self.complete(task);
        }
        for mark in cancellations.aborts {
            if self.in_flight.contains_key(&mark) {
                self.engine.abort(mark, TransferError::Cancelled);
            }
        }
    }

    /// Deliver `done` and drop the task's queue entry.
    fn complete(&self, task: Task) {
        let mark = task.mark();
        tracing::debug!(
            target: targets::EXECUTOR,
            %mark,
            status = ?task.response().status(),
            bytes = task.response().body().len(),
            "task finished"
        );
        let action = task.action().clone();
        if catch_unwind(AssertUnwindSafe(|| action.done(&task))).is_err() {
            tracing::error!(target: targets::EXECUTOR, %mark, "completion callback panicked");
        }
        self.counters.completed.fetch_add(1, Ordering::AcqRel);
        self.queue.remove(mark);
    }

    fn shut_down(&mut self) {
        let in_flight = std::mem::take(&mut self.in_flight);
        let queued = self.queue.drain();
        tracing::debug!(
            target: targets::EXECUTOR,
            in_flight = in_flight.len(),
            queued = queued.len(),
            "cancelling remaining tasks"
        );

        for (mark, mut task) in in_flight {
            self.engine.unregister(mark);
            task.response_mut().finish(Err(TransferError::Cancelled));
            self.complete(task);
        }
        self.counters.set_in_flight(0);
        for mut task in queued {
            task.response_mut().finish(Err(TransferError::Cancelled));
            self.complete(task);
        }
    }
}
