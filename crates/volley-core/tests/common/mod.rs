//! Shared helpers for router integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use volley_core::{
    Action, Completion, EngineError, Mark, ProgressControl, Request, Task, TaskStatus,
    TransferEngine, TransferError, TransferProgress, TransferSink,
};

/// One scripted event of a transfer.
#[derive(Clone, Debug)]
pub enum Step {
    /// Deliver body bytes.
    Chunk(&'static [u8]),
    /// Report progress with the given download total.
    Progress { download_total: u64 },
    /// Complete with an HTTP status.
    Finish(u16),
    /// Fail with a transfer error.
    Fail(TransferError),
}

/// What the engine observed, shared with the test.
#[derive(Debug, Default)]
pub struct Observed {
    /// Locators in registration order.
    pub registered: Vec<String>,
    /// Transfers currently running.
    pub running: usize,
    /// Highest number of transfers running at once.
    pub peak: usize,
}

struct Transfer {
    steps: VecDeque<Step>,
    elapsed: Duration,
    downloaded: u64,
    download_total: u64,
}

/// An in-memory engine replaying scripted steps, one step per transfer per
/// `perform` call.
pub struct ScriptedEngine {
    scripts: HashMap<String, Vec<Step>>,
    tick: Duration,
    transfers: HashMap<Mark, Transfer>,
    order: Vec<Mark>,
    completions: VecDeque<Completion>,
    observed: Arc<Mutex<Observed>>,
    fail_timeout: bool,
    calls: u64,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            tick: Duration::from_millis(40),
            transfers: HashMap::new(),
            order: Vec::new(),
            completions: VecDeque::new(),
            observed: Arc::new(Mutex::new(Observed::default())),
            fail_timeout: false,
            calls: 0,
        }
    }

    /// Replay `steps` for requests sent to `locator`. Unscripted locators
    /// receive `ok` and status 200.
    pub fn script(mut self, locator: &str, steps: Vec<Step>) -> Self {
        self.scripts.insert(locator.to_string(), steps);
        self
    }

    /// Simulated transfer time per step.
    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Make every other wait-hint query fail.
    pub fn failing_timeout(mut self) -> Self {
        self.fail_timeout = true;
        self
    }

    pub fn observed(&self) -> Arc<Mutex<Observed>> {
        self.observed.clone()
    }

    fn finish(&mut self, mark: Mark, result: Result<u16, TransferError>) {
        self.transfers.remove(&mark);
        self.order.retain(|m| *m != mark);
        self.observed.lock().running = self.transfers.len();
        self.completions.push_back(Completion { mark, result });
    }
}

impl TransferEngine for ScriptedEngine {
    fn register(&mut self, mark: Mark, request: &Request) -> Result<(), TransferError> {
        let locator = request.locator().as_str().to_string();
        let steps = self
            .scripts
            .get(&locator)
            .cloned()
            .unwrap_or_else(|| vec![Step::Chunk(b"ok"), Step::Finish(200)]);
        self.transfers.insert(
            mark,
            Transfer {
                steps: steps.into(),
                elapsed: Duration::ZERO,
                downloaded: 0,
                download_total: 0,
            },
        );
        self.order.push(mark);

        let mut observed = self.observed.lock();
        observed.registered.push(locator);
        observed.running = self.transfers.len();
        observed.peak = observed.peak.max(observed.running);
        Ok(())
    }

    fn perform(&mut self, sink: &mut dyn TransferSink) -> Result<usize, EngineError> {
        for mark in self.order.clone() {
            let Some(transfer) = self.transfers.get_mut(&mark) else {
                continue;
            };
            transfer.elapsed += self.tick;
            let Some(step) = transfer.steps.pop_front() else {
                self.finish(mark, Ok(200));
                continue;
            };
            match step {
                Step::Chunk(bytes) => {
                    transfer.downloaded += bytes.len() as u64;
                    if let Err(err) = sink.write(mark, bytes) {
                        self.finish(mark, Err(err));
                    }
                }
                Step::Progress { download_total } => {
                    transfer.download_total = download_total;
                    let progress = TransferProgress {
                        elapsed: transfer.elapsed,
                        download_total,
                        downloaded: transfer.downloaded,
                        ..Default::default()
                    };
                    if sink.progress(mark, &progress) == ProgressControl::Abort {
                        self.finish(mark, Err(TransferError::Aborted));
                    }
                }
                Step::Finish(status) => self.finish(mark, Ok(status)),
                Step::Fail(err) => self.finish(mark, Err(err)),
            }
        }
        Ok(self.transfers.len())
    }

    fn timeout(&mut self) -> Result<Option<Duration>, EngineError> {
        self.calls += 1;
        if self.fail_timeout && self.calls % 2 == 0 {
            return Err(EngineError::Timeout("scripted failure".into()));
        }
        Ok(Some(Duration::from_millis(1)))
    }

    fn wait(&mut self, bound: Duration) -> Result<(), EngineError> {
        std::thread::sleep(bound.min(Duration::from_millis(1)));
        Ok(())
    }

    fn next_completion(&mut self) -> Option<Completion> {
        self.completions.pop_front()
    }

    fn abort(&mut self, mark: Mark, reason: TransferError) {
        if self.transfers.contains_key(&mark) {
            self.finish(mark, Err(reason));
        }
    }

    fn unregister(&mut self, mark: Mark) {
        self.transfers.remove(&mark);
        self.order.retain(|m| *m != mark);
        self.observed.lock().running = self.transfers.len();
    }

    fn in_flight(&self) -> usize {
        self.transfers.len()
    }
}

/// What a finished task looked like when `done` ran.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub mark: Mark,
    pub status: TaskStatus,
    pub body: Vec<u8>,
    pub handled: bool,
    pub tag: Option<String>,
}

/// Sends every finished task's outcome over a channel.
pub struct Collect {
    tx: Sender<Outcome>,
}

impl Collect {
    pub fn new() -> (Arc<dyn Action>, Receiver<Outcome>) {
        let (tx, rx) = unbounded();
        (Arc::new(Self { tx }), rx)
    }
}

impl Action for Collect {
    fn done(&self, task: &Task) {
        let _ = self.tx.send(Outcome {
            mark: task.mark(),
            status: task.response().status().clone(),
            body: task.response().body().to_vec(),
            handled: task.is_handled(),
            tag: task.user_data::<String>().cloned(),
        });
    }
}

/// Receive `count` outcomes or panic after a generous timeout.
pub fn collect(rx: &Receiver<Outcome>, count: usize) -> Vec<Outcome> {
    (0..count)
        .map(|_| {
            rx.recv_timeout(Duration::from_secs(10))
                .expect("timed out waiting for done")
        })
        .collect()
}
