//! Logging facilities for volley.
//!
//! volley uses the `tracing` crate for instrumentation. To see logs, install a
//! tracing subscriber in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt::init();
//!
//!     // Your application code...
//! }
//! ```
//!
//! Use the [`targets`] constants with `tracing` directives to filter logs by
//! subsystem, e.g. `RUST_LOG=volley_core::executor=debug`.

/// Span names used for tracing.
pub mod span_names {
    /// The executor thread's reactor loop.
    pub const EXECUTOR: &str = "volley::executor";
}

/// Target names for log filtering.
pub mod targets {
    /// Task queue target.
    pub const QUEUE: &str = "volley_core::queue";
    /// Executor reactor target.
    pub const EXECUTOR: &str = "volley_core::executor";
    /// Router facade target.
    pub const ROUTER: &str = "volley_core::router";
}
