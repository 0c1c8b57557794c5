//! Core of the volley HTTP runtime.
//!
//! volley runs HTTP transfers on one dedicated background thread and reports
//! their outcome through caller-supplied callbacks:
//!
//! - **Router**: fire-and-forget `get`/`post` entry points that queue a task and
//!   return its [`Mark`] immediately
//! - **Executor**: a reactor that admits queued tasks in order, keeps at most
//!   [`MAX_IN_FLIGHT`] transfers running, and harvests completions
//! - **Action**: the caller's completion and progress callbacks
//! - **TransferEngine**: the boundary to whatever actually moves bytes
//!
//! This crate is engine-agnostic. The `volley-net` crate provides an engine
//! backed by `reqwest`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use volley_core::{Router, UploadField, from_fn};
//!
//! let router = Router::new(engine);
//!
//! let done = Arc::new(from_fn(|task| {
//!     match task.response().status().http_status() {
//!         Some(code) => println!("{code}: {} bytes", task.response().body().len()),
//!         None => eprintln!("failed: {:?}", task.response().status()),
//!     }
//! }));
//!
//! router.get("http://example.com/", done.clone(), None)?;
//! router.post(
//!     "http://example.com/upload",
//!     vec![
//!         UploadField::text("title", "report"),
//!         UploadField::file("attachment", "/tmp/report.pdf"),
//!     ],
//!     done,
//!     Some(Box::new(42u32)),
//! )?;
//! ```
//!
//! # Threading
//!
//! Any number of threads may submit tasks concurrently. Every callback runs on
//! the executor thread, and `done` runs exactly once per accepted task, even
//! when the task is cancelled or the router is shut down.

pub mod action;
pub mod buffer;
pub mod engine;
pub mod error;
mod executor;
pub mod locator;
pub mod logging;
pub mod queue;
mod router;
pub mod task;

pub use action::{
    Action, DEFAULT_PROGRESS_INTERVAL, FnAction, ProgressControl, TransferProgress, from_fn,
};
pub use buffer::{BufferError, ReceiveBuffer};
pub use engine::{Completion, TransferEngine, TransferSink};
pub use error::{EngineError, Result, TransferError, VolleyError};
pub use executor::{DEFAULT_WAIT, ExecutorConfig, ExecutorStats, MAX_IN_FLIGHT};
pub use locator::{Locator, LocatorBuilder};
pub use queue::{Cancellations, SharedTaskQueue, TaskQueue};
pub use router::{Router, RouterBuilder};
pub use task::{
    FieldKind, Mark, Method, Request, Response, Task, TaskStatus, UploadField, UserData,
};
