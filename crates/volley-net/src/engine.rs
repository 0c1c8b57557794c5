//! The reqwest-backed transfer engine.
//!
//! Every registered request runs as a task on a private tokio runtime. Running
//! transfers never touch volley's tasks directly: they post [`Event`]s to a
//! channel, and the executor thread drains that channel in
//! [`TransferEngine::perform`]. Events for a mark that has been aborted or
//! unregistered are dropped.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use reqwest::redirect::Policy;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use url::Url;
use volley_core::{
    Completion, EngineError, Mark, ProgressControl, Request, TransferEngine, TransferError,
    TransferSink,
};

use crate::config::{HttpEngineBuilder, HttpEngineConfig};
use crate::error::{NetworkError, Result};
use crate::logging::targets;
use crate::transfer::{self, Event};

/// Most events handled by a single `perform` call.
const MAX_EVENTS_PER_STEP: usize = 256;

/// A [`TransferEngine`] running HTTP transfers with `reqwest`.
pub struct HttpEngine {
    config: HttpEngineConfig,
    runtime: Option<Runtime>,
    client: reqwest::Client,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
    /// Events received while waiting, not yet handed to the sink.
    backlog: VecDeque<Event>,
    active: HashMap<Mark, JoinHandle<()>>,
    completions: VecDeque<Completion>,
}

impl HttpEngine {
    /// Create an engine with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(HttpEngineConfig::default())
    }

    /// Create a builder for custom configuration.
    pub fn builder() -> HttpEngineBuilder {
        HttpEngineBuilder::new()
    }

    /// Create an engine with the given configuration.
    pub fn with_config(config: HttpEngineConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("volley-transfer")
            .enable_all()
            .build()
            .map_err(|e| NetworkError::Runtime(e.to_string()))?;

        let client = {
            let _guard = runtime.enter();
            build_client(&config)?
        };
        let (events_tx, events_rx) = unbounded();

        tracing::debug!(
            target: targets::ENGINE,
            worker_threads = config.worker_threads,
            "http engine created"
        );

        Ok(Self {
            config,
            runtime: Some(runtime),
            client,
            events_tx,
            events_rx,
            backlog: VecDeque::new(),
            active: HashMap::new(),
            completions: VecDeque::new(),
        })
    }

    /// Get the engine's configuration.
    pub fn config(&self) -> &HttpEngineConfig {
        &self.config
    }

    fn next_event(&mut self) -> Option<Event> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        self.events_rx.try_recv().ok()
    }

    /// Stop a transfer and complete it with `reason`.
    fn fail(&mut self, mark: Mark, reason: TransferError) {
        if let Some(handle) = self.active.remove(&mark) {
            handle.abort();
            tracing::debug!(target: targets::ENGINE, %mark, reason = %reason, "transfer stopped");
            self.completions.push_back(Completion {
                mark,
                result: Err(reason),
            });
        }
    }
}

fn build_client(config: &HttpEngineConfig) -> Result<reqwest::Client> {
    let redirect = match config.redirect_limit {
        0 => Policy::none(),
        hops => Policy::limited(hops),
    };
    let mut builder = reqwest::Client::builder()
        .redirect(redirect)
        .cookie_store(config.shared_cookies);

    if let Some(limit) = config.transfer_timeout {
        builder = builder.timeout(limit);
    }
    if let Some(limit) = config.connect_timeout {
        builder = builder.connect_timeout(limit);
    }
    if let Some(agent) = &config.user_agent {
        builder = builder.user_agent(agent.as_str());
    }
    if let Some(url) = &config.proxy {
        let proxy =
            reqwest::Proxy::all(url.as_str()).map_err(|e| NetworkError::Proxy(e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(NetworkError::from)
}

impl TransferEngine for HttpEngine {
    fn register(&mut self, mark: Mark, request: &Request) -> std::result::Result<(), TransferError> {
        let Some(runtime) = &self.runtime else {
            return Err(TransferError::Request("engine has shut down".into()));
        };
        let url = Url::parse(request.locator().as_str())
            .map_err(|e| TransferError::InvalidLocator(format!("{}: {e}", request.locator())))?;

        let handle = runtime.spawn(transfer::run(
            self.client.clone(),
            mark,
            request.clone(),
            url,
            self.events_tx.clone(),
        ));
        self.active.insert(mark, handle);
        tracing::trace!(target: targets::ENGINE, %mark, active = self.active.len(), "transfer spawned");
        Ok(())
    }

    fn perform(&mut self, sink: &mut dyn TransferSink) -> std::result::Result<usize, EngineError> {
        for _ in 0..MAX_EVENTS_PER_STEP {
            let Some(event) = self.next_event() else {
                break;
            };
            match event {
                Event::Data { mark, chunk } => {
                    if !self.active.contains_key(&mark) {
                        continue;
                    }
                    if let Err(err) = sink.write(mark, &chunk) {
                        self.fail(mark, err);
                    }
                }
                Event::Progress { mark, progress } => {
                    if !self.active.contains_key(&mark) {
                        continue;
                    }
                    if sink.progress(mark, &progress) == ProgressControl::Abort {
                        self.fail(mark, TransferError::Aborted);
                    }
                }
                Event::Finished { mark, result } => {
                    if self.active.remove(&mark).is_some() {
                        self.completions.push_back(Completion { mark, result });
                    }
                }
            }
        }
        Ok(self.active.len())
    }

    fn timeout(&mut self) -> std::result::Result<Option<Duration>, EngineError> {
        if !self.backlog.is_empty() || !self.completions.is_empty() || !self.events_rx.is_empty()
        {
            return Ok(Some(Duration::ZERO));
        }
        Ok(None)
    }

    fn wait(&mut self, bound: Duration) -> std::result::Result<(), EngineError> {
        if !self.backlog.is_empty() || !self.completions.is_empty() || bound.is_zero() {
            return Ok(());
        }
        match self.events_rx.recv_timeout(bound) {
            Ok(event) => {
                self.backlog.push_back(event);
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                Err(EngineError::Wait("event channel disconnected".into()))
            }
        }
    }

    fn next_completion(&mut self) -> Option<Completion> {
        self.completions.pop_front()
    }

    fn abort(&mut self, mark: Mark, reason: TransferError) {
        self.fail(mark, reason);
    }

    fn unregister(&mut self, mark: Mark) {
        if let Some(handle) = self.active.remove(&mark) {
            handle.abort();
        }
    }

    fn in_flight(&self) -> usize {
        self.active.len()
    }
}

impl Drop for HttpEngine {
    fn drop(&mut self) {
        for (_, handle) in self.active.drain() {
            handle.abort();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for HttpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEngine")
            .field("config", &self.config)
            .field("active", &self.active.len())
            .field("completions", &self.completions.len())
            .finish_non_exhaustive()
    }
}
