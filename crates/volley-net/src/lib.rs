//! HTTP transfer engine for volley.
//!
//! This crate provides [`HttpEngine`], a [`TransferEngine`](volley_core::TransferEngine)
//! that runs transfers with `reqwest` on a small private tokio runtime, and
//! helpers for building a [`Router`] on top of it.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use volley_core::{UploadField, from_fn};
//! use volley_net::{HttpEngineConfig, http_router};
//!
//! let router = http_router(HttpEngineConfig::default())?;
//!
//! router.get(
//!     "https://example.com/",
//!     Arc::new(from_fn(|task| println!("{}", task.response().text()))),
//!     None,
//! )?;
//! ```
//!
//! ## Uploads
//!
//! POST requests are sent as `multipart/form-data`. Text fields become text
//! parts; file fields are read from disk when the transfer starts and carry
//! either their explicit filename or the last component of their path:
//!
//! ```ignore
//! router.post(
//!     "https://example.com/upload",
//!     vec![
//!         UploadField::text("title", "Quarterly report"),
//!         UploadField::file("attachment", "/tmp/q3.pdf").with_file_name("report.pdf"),
//!     ],
//!     action,
//!     None,
//! )?;
//! ```
//!
//! ## Configuration
//!
//! ```ignore
//! let engine = HttpEngine::builder()
//!     .transfer_timeout(Duration::from_secs(60))
//!     .user_agent("MyApp/1.0")
//!     .isolated_cookies()
//!     .build()?;
//! let router = Router::builder().max_in_flight(4).build(engine);
//! ```

mod config;
mod engine;
mod error;
mod form;
pub mod logging;
mod transfer;

use std::sync::OnceLock;

pub use config::{DEFAULT_WORKER_THREADS, HttpEngineBuilder, HttpEngineConfig};
pub use engine::HttpEngine;
pub use error::{NetworkError, Result};

pub use volley_core::{Router, RouterBuilder};

/// Create a router backed by an [`HttpEngine`] with default router settings.
pub fn http_router(config: HttpEngineConfig) -> Result<Router> {
    Ok(Router::new(HttpEngine::with_config(config)?))
}

/// Create a router backed by an [`HttpEngine`] with custom router settings.
pub fn http_router_with(builder: RouterBuilder, config: HttpEngineConfig) -> Result<Router> {
    Ok(builder.build(HttpEngine::with_config(config)?))
}

static GLOBAL: OnceLock<Router> = OnceLock::new();

/// The process-wide router, created with default settings on first use.
///
/// It is never shut down; its executor thread lives until the process exits.
pub fn global() -> Result<&'static Router> {
    if let Some(router) = GLOBAL.get() {
        return Ok(router);
    }
    let router = http_router(HttpEngineConfig::default())?;
    Ok(GLOBAL.get_or_init(|| router))
}
