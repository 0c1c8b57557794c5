//! Engine configuration.

use std::time::Duration;

use crate::engine::HttpEngine;
use crate::error::Result;

/// Default number of threads driving transfers.
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Configuration for an [`HttpEngine`].
///
/// All settings apply to the engine's single shared client, so every transfer
/// the engine runs sees the same limits, cookie jar and proxy.
#[derive(Clone, Debug)]
pub struct HttpEngineConfig {
    /// Upper bound on a transfer from connecting until the last body chunk
    /// has been streamed. A transfer that runs past it fails with
    /// [`TransferError::Timeout`](volley_core::TransferError::Timeout), even
    /// if chunks were still arriving.
    pub transfer_timeout: Option<Duration>,
    /// Upper bound on establishing the connection alone.
    pub connect_timeout: Option<Duration>,
    /// Redirect hops followed before the transfer fails. Zero hands 3xx
    /// responses to `done` as completed transfers.
    pub redirect_limit: usize,
    /// Keep one cookie jar for all transfers of this engine.
    pub shared_cookies: bool,
    /// `User-Agent` header for every request.
    pub user_agent: Option<String>,
    /// Proxy URL all transfers are routed through.
    pub proxy: Option<String>,
    /// Threads of the private runtime that streams transfers.
    pub worker_threads: usize,
}

impl Default for HttpEngineConfig {
    fn default() -> Self {
        Self {
            transfer_timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(10)),
            redirect_limit: 10,
            shared_cookies: true,
            user_agent: Some(format!("volley/{}", env!("CARGO_PKG_VERSION"))),
            proxy: None,
            worker_threads: DEFAULT_WORKER_THREADS,
        }
    }
}

/// Fluent construction of an [`HttpEngine`].
#[derive(Clone, Debug, Default)]
pub struct HttpEngineBuilder {
    config: HttpEngineConfig,
}

impl HttpEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each transfer, body streaming included.
    ///
    /// Large downloads on slow links need a bound that covers the whole body,
    /// not just the time to the first byte.
    pub fn transfer_timeout(mut self, limit: Duration) -> Self {
        self.config.transfer_timeout = Some(limit);
        self
    }

    /// Let transfers stream for as long as the server keeps sending.
    pub fn unbounded_transfers(mut self) -> Self {
        self.config.transfer_timeout = None;
        self
    }

    /// Bound connection setup. Once connected, only the transfer timeout
    /// applies.
    pub fn connect_timeout(mut self, limit: Duration) -> Self {
        self.config.connect_timeout = Some(limit);
        self
    }

    /// Follow at most `hops` redirects; `0` delivers the 3xx response itself.
    pub fn redirect_limit(mut self, hops: usize) -> Self {
        self.config.redirect_limit = hops;
        self
    }

    /// Give each transfer a clean slate instead of the engine-wide cookie jar.
    pub fn isolated_cookies(mut self) -> Self {
        self.config.shared_cookies = false;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Route every transfer through `proxy_url`. A malformed URL surfaces
    /// from [`build`](Self::build) as [`NetworkError::Proxy`](crate::NetworkError::Proxy).
    pub fn proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy_url.into());
        self
    }

    /// Size the transfer runtime. Values below 1 are raised to 1.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads.max(1);
        self
    }

    pub fn config(&self) -> &HttpEngineConfig {
        &self.config
    }

    /// Start the runtime and client.
    pub fn build(self) -> Result<HttpEngine> {
        HttpEngine::with_config(self.config)
    }
}
