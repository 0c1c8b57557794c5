//! The router: the public entry point for submitting transfers.
//!
//! A [`Router`] owns a task queue and the engine that will run its transfers.
//! The executor thread is started lazily by the first submission and runs until
//! the router is shut down or dropped.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use volley_core::{Router, from_fn};
//!
//! let router = Router::builder().max_in_flight(4).build(engine);
//! let mark = router.get(
//!     "http://example.com/",
//!     Arc::new(from_fn(|task| println!("{}", task.response().text()))),
//!     None,
//! )?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;

use crate::action::Action;
use crate::engine::TransferEngine;
use crate::error::{Result, VolleyError};
use crate::executor::{Counters, Executor, ExecutorConfig, ExecutorStats};
use crate::locator::Locator;
use crate::logging::targets;
use crate::queue::SharedTaskQueue;
use crate::task::{Mark, Request, Task, UploadField, UserData};

/// Builder for creating routers with custom configuration.
#[derive(Debug, Default)]
pub struct RouterBuilder {
    config: ExecutorConfig,
}

impl RouterBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the executor thread name.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the stack size for the executor thread.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Set the maximum number of concurrent transfers. Values below 1 are
    /// raised to 1.
    pub fn max_in_flight(mut self, max: usize) -> Self {
        self.config.max_in_flight = max.max(1);
        self
    }

    /// Set how long the executor sleeps when it has nothing to do.
    pub fn idle_wait(mut self, wait: Duration) -> Self {
        self.config.idle_wait = wait;
        self
    }

    /// Set the upper bound for a single wait on transfer activity.
    pub fn wait_bound(mut self, bound: Duration) -> Self {
        self.config.wait_bound = bound;
        self
    }

    /// Build a router that runs its transfers on `engine`.
    pub fn build<E: TransferEngine + 'static>(self, engine: E) -> Router {
        Router::with_config(self.config, Box::new(engine))
    }
}

/// Fire-and-forget HTTP request router.
///
/// Every submission returns as soon as the task is queued. The outcome is
/// delivered to the task's [`Action`] on the executor thread.
pub struct Router {
    config: ExecutorConfig,
    queue: Arc<SharedTaskQueue>,
    counters: Arc<Counters>,
    /// Held until the executor thread takes ownership on first submission.
    engine: Mutex<Option<Box<dyn TransferEngine>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    executor_id: Mutex<Option<ThreadId>>,
    started: AtomicBool,
}

impl Router {
    /// Create a router with default settings.
    pub fn new<E: TransferEngine + 'static>(engine: E) -> Self {
        RouterBuilder::new().build(engine)
    }

    /// Create a builder for custom configuration.
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    fn with_config(config: ExecutorConfig, engine: Box<dyn TransferEngine>) -> Self {
        Self {
            config,
            queue: Arc::new(SharedTaskQueue::new()),
            counters: Arc::new(Counters::default()),
            engine: Mutex::new(Some(engine)),
            thread: Mutex::new(None),
            executor_id: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Queue a GET request.
    pub fn get(
        &self,
        locator: impl Into<Locator>,
        action: Arc<dyn Action>,
        user_data: Option<UserData>,
    ) -> Result<Mark> {
        self.submit(Task::new(Request::get(locator), action).with_user_data(user_data))
    }

    /// Queue a multipart POST request.
    pub fn post(
        &self,
        locator: impl Into<Locator>,
        fields: Vec<UploadField>,
        action: Arc<dyn Action>,
        user_data: Option<UserData>,
    ) -> Result<Mark> {
        self.submit(Task::new(Request::post(locator, fields), action).with_user_data(user_data))
    }

    /// Queue a prepared task.
    ///
    /// Starts the executor thread if it is not running yet. Fails with
    /// [`VolleyError::ShutDown`] once the router has been shut down; the task
    /// is dropped without its `done` callback being called.
    pub fn submit(&self, task: Task) -> Result<Mark> {
        if self.queue.is_closed() {
            return Err(VolleyError::ShutDown);
        }
        self.ensure_started()?;
        self.queue.push(task).ok_or(VolleyError::ShutDown)
    }

    /// Cancel a queued or running task.
    ///
    /// A queued task is withdrawn and its `done` callback runs with
    /// [`TransferError::Cancelled`](crate::TransferError::Cancelled). A running
    /// transfer is aborted the same way, unless the engine has already
    /// finished it by the time the executor picks up the request; `done` then
    /// reports the real outcome. Returns `false` if the task is unknown,
    /// already finished, or already cancelled.
    pub fn cancel(&self, mark: Mark) -> bool {
        let cancelled = self.queue.cancel(mark);
        if cancelled {
            tracing::debug!(target: targets::ROUTER, %mark, "cancellation requested");
        }
        cancelled
    }

    /// Stop accepting tasks, cancel everything outstanding and stop the
    /// executor thread.
    ///
    /// Blocks until the executor thread has exited, unless called from the
    /// executor thread itself (for example from a callback). Calling this more
    /// than once has no further effect.
    pub fn shutdown(&self) {
        if !self.queue.is_closed() {
            tracing::debug!(target: targets::ROUTER, pending = self.queue.len(), "shutting down");
        }
        self.queue.close();
        self.engine.lock().take();

        if *self.executor_id.lock() == Some(thread::current().id()) {
            return;
        }
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!(target: targets::ROUTER, "executor thread panicked");
            }
        }
    }

    /// Check if the router has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.queue.is_closed()
    }

    /// Check if the executor thread has been started.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Number of tasks queued or in flight.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Executor counters.
    pub fn stats(&self) -> ExecutorStats {
        self.counters.snapshot()
    }

    fn ensure_started(&self) -> Result<()> {
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut thread = self.thread.lock();
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }
        let Some(engine) = self.engine.lock().take() else {
            return Err(VolleyError::ShutDown);
        };

        let executor = Executor::new(
            self.config.clone(),
            self.queue.clone(),
            engine,
            self.counters.clone(),
        );
        let handle = executor.spawn().map_err(|err| {
            tracing::error!(target: targets::ROUTER, error = %err, "failed to start executor");
            self.queue.close();
            VolleyError::Spawn(err)
        })?;

        *self.executor_id.lock() = Some(handle.thread().id());
        *thread = Some(handle);
        self.started.store(true, Ordering::Release);
        tracing::debug!(target: targets::ROUTER, thread = %self.config.name, "executor started");
        Ok(())
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.config)
            .field("pending", &self.queue.len())
            .field("started", &self.is_started())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::from_fn;
    use crate::engine::{Completion, TransferSink};
    use crate::error::{EngineError, TransferError};
    use crate::task::TaskStatus;
    use std::sync::mpsc;

    /// Never completes anything on its own.
    #[derive(Default)]
    struct StallEngine {
        running: Vec<Mark>,
        completions: Vec<Completion>,
    }

    impl TransferEngine for StallEngine {
        fn register(&mut self, mark: Mark, _request: &Request) -> std::result::Result<(), TransferError> {
            self.running.push(mark);
            Ok(())
        }

        fn perform(&mut self, _sink: &mut dyn TransferSink) -> std::result::Result<usize, EngineError> {
            Ok(self.running.len())
        }

        fn timeout(&mut self) -> std::result::Result<Option<Duration>, EngineError> {
            Ok(Some(Duration::from_millis(5)))
        }

        fn wait(&mut self, bound: Duration) -> std::result::Result<(), EngineError> {
            thread::sleep(bound);
            Ok(())
        }

        fn next_completion(&mut self) -> Option<Completion> {
            self.completions.pop()
        }

        fn abort(&mut self, mark: Mark, reason: TransferError) {
            self.running.retain(|m| *m != mark);
            self.completions.push(Completion {
                mark,
                result: Err(reason),
            });
        }

        fn unregister(&mut self, mark: Mark) {
            self.running.retain(|m| *m != mark);
        }

        fn in_flight(&self) -> usize {
            self.running.len()
        }
    }

    fn reporting(tx: mpsc::Sender<TaskStatus>) -> Arc<dyn Action> {
        let tx = Mutex::new(tx);
        Arc::new(from_fn(move |task: &Task| {
            let _ = tx.lock().send(task.response().status().clone());
        }))
    }

    #[test]
    fn test_builder_settings() {
        let router = Router::builder()
            .thread_name("custom")
            .max_in_flight(0)
            .idle_wait(Duration::from_millis(5))
            .wait_bound(Duration::from_millis(7))
            .stack_size(256 * 1024)
            .build(StallEngine::default());

        assert_eq!(router.config.name, "custom");
        assert_eq!(router.config.max_in_flight, 1);
        assert_eq!(router.config.idle_wait, Duration::from_millis(5));
        assert_eq!(router.config.wait_bound, Duration::from_millis(7));
        assert_eq!(router.config.stack_size, Some(256 * 1024));
    }

    #[test]
    fn test_lazy_start() {
        let router = Router::new(StallEngine::default());
        assert!(!router.is_started());

        let (tx, _rx) = mpsc::channel();
        router.get("http://a", reporting(tx), None).unwrap();
        assert!(router.is_started());
    }

    #[test]
    fn test_cancel_in_flight() {
        let router = Router::new(StallEngine::default());
        let (tx, rx) = mpsc::channel();
        let mark = router.get("http://a", reporting(tx), None).unwrap();

        while router.stats().in_flight == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(router.cancel(mark));

        let status = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(status, TaskStatus::Failed(TransferError::Cancelled));
        assert!(!router.cancel(mark));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let router = Router::new(StallEngine::default());
        let (tx, rx) = mpsc::channel();
        router.get("http://a", reporting(tx.clone()), None).unwrap();

        router.shutdown();
        router.shutdown();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            TaskStatus::Failed(TransferError::Cancelled)
        );
        assert!(router.is_shut_down());
        assert!(matches!(
            router.get("http://b", reporting(tx), None),
            Err(VolleyError::ShutDown)
        ));
    }

    #[test]
    fn test_shutdown_before_start() {
        let router = Router::new(StallEngine::default());
        router.shutdown();
        let (tx, _rx) = mpsc::channel();
        assert!(matches!(
            router.get("http://a", reporting(tx), None),
            Err(VolleyError::ShutDown)
        ));
        assert!(!router.is_started());
    }
}
