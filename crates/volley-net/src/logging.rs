//! Logging targets for the HTTP engine.
//!
//! Filter with `tracing` directives such as `RUST_LOG=volley_net=debug`.

/// Target names for log filtering.
pub mod targets {
    /// Engine polling and bookkeeping.
    pub const ENGINE: &str = "volley_net::engine";
    /// Individual transfers.
    pub const TRANSFER: &str = "volley_net::transfer";
}
