//! Router behaviour against a scripted engine.

mod common;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;

use common::{Collect, Outcome, ScriptedEngine, Step, collect};
use volley_core::{
    Action, MAX_IN_FLIGHT, Mark, ProgressControl, Router, TaskStatus, TransferError,
    TransferProgress, VolleyError,
};

fn wait_until_empty(router: &Router) {
    for _ in 0..1000 {
        if router.pending() == 0 {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("queue never drained: {} pending", router.pending());
}

fn long_script() -> Vec<Step> {
    let mut steps = vec![Step::Chunk(b"x"); 5];
    steps.push(Step::Finish(200));
    steps
}

#[test]
fn test_concurrent_gets_complete_once_within_window() {
    let mut engine = ScriptedEngine::new();
    for i in 0..20 {
        engine = engine.script(&format!("http://host/{i}"), long_script());
    }
    let observed = engine.observed();
    let router = Arc::new(Router::new(engine));
    let (action, rx) = Collect::new();

    let producers: Vec<_> = (0..4)
        .map(|t| {
            let router = router.clone();
            let action = action.clone();
            thread::spawn(move || {
                (0..5)
                    .map(|i| {
                        router
                            .get(format!("http://host/{}", t * 5 + i), action.clone(), None)
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let submitted: HashSet<Mark> = producers
        .into_iter()
        .flat_map(|p| p.join().unwrap())
        .collect();

    let outcomes = collect(&rx, 20);
    let finished: HashSet<Mark> = outcomes.iter().map(|o| o.mark).collect();
    assert_eq!(finished, submitted);
    assert!(outcomes.iter().all(|o| o.status.http_status() == Some(200)));
    assert!(outcomes.iter().all(|o| o.body == b"xxxxx" && o.handled));

    wait_until_empty(&router);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    assert!(observed.lock().peak <= MAX_IN_FLIGHT);

    let stats = router.stats();
    assert!(stats.peak_in_flight <= MAX_IN_FLIGHT);
    assert_eq!(stats.admitted, 20);
    assert_eq!(stats.completed, 20);
}

#[test]
fn test_admission_is_fifo() {
    let engine = ScriptedEngine::new();
    let observed = engine.observed();
    let router = Router::builder().max_in_flight(1).build(engine);
    let (action, rx) = Collect::new();

    for name in ["a", "b", "c", "d"] {
        router
            .get(format!("http://host/{name}"), action.clone(), None)
            .unwrap();
    }
    collect(&rx, 4);

    assert_eq!(
        observed.lock().registered,
        ["http://host/a", "http://host/b", "http://host/c", "http://host/d"]
    );
    assert_eq!(router.stats().peak_in_flight, 1);
}

#[test]
fn test_body_survives_size_transition() {
    let engine = ScriptedEngine::new().script(
        "http://host/body",
        vec![
            Step::Chunk(b"hello "),
            Step::Chunk(b"wor"),
            Step::Progress { download_total: 18 },
            Step::Chunk(b"ld, "),
            Step::Chunk(b"again"),
            Step::Finish(200),
        ],
    );
    let router = Router::new(engine);
    let (action, rx) = Collect::new();

    router.get("http://host/body", action, None).unwrap();
    let outcome = collect(&rx, 1).remove(0);

    assert_eq!(outcome.status, TaskStatus::Completed { http_status: 200 });
    assert_eq!(outcome.body, b"hello world, again");
}

/// Records when progress was delivered and aborts on a chosen call.
struct Recorder {
    interval: Duration,
    abort_on: Option<usize>,
    calls: Mutex<HashMap<Mark, Vec<Duration>>>,
    tx: Sender<Outcome>,
}

impl Recorder {
    fn new(interval: Duration, abort_on: Option<usize>, tx: Sender<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            interval,
            abort_on,
            calls: Mutex::new(HashMap::new()),
            tx,
        })
    }

    fn calls(&self, mark: Mark) -> Vec<Duration> {
        self.calls.lock().get(&mark).cloned().unwrap_or_default()
    }
}

impl Action for Recorder {
    fn done(&self, task: &volley_core::Task) {
        let _ = self.tx.send(Outcome {
            mark: task.mark(),
            status: task.response().status().clone(),
            body: task.response().body().to_vec(),
            handled: task.is_handled(),
            tag: None,
        });
    }

    fn progress(&self, progress: &TransferProgress, task: &volley_core::Task) -> ProgressControl {
        let mut calls = self.calls.lock();
        let seen = calls.entry(task.mark()).or_default();
        seen.push(progress.elapsed);
        if Some(seen.len()) == self.abort_on {
            ProgressControl::Abort
        } else {
            ProgressControl::Continue
        }
    }

    fn progress_interval(&self) -> Duration {
        self.interval
    }
}

#[test]
fn test_progress_is_throttled() {
    let engine = ScriptedEngine::new()
        .tick(Duration::from_millis(30))
        .script(
            "http://host/progress",
            vec![Step::Progress { download_total: 100 }; 20],
        );
    let router = Router::new(engine);
    let (tx, rx) = unbounded();
    let recorder = Recorder::new(Duration::from_millis(100), None, tx);

    let mark = router
        .get("http://host/progress", recorder.clone(), None)
        .unwrap();
    collect(&rx, 1);

    let calls = recorder.calls(mark);
    assert!(calls.len() >= 2, "expected several reports, got {calls:?}");
    assert!(calls.len() < 20);
    for pair in calls.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(100), "{calls:?}");
    }
}

#[test]
fn test_progress_abort_only_stops_that_task() {
    let engine = ScriptedEngine::new()
        .script(
            "http://host/slow",
            vec![Step::Progress { download_total: 100 }; 10]
                .into_iter()
                .chain([Step::Finish(200)])
                .collect(),
        )
        .script(
            "http://host/fast",
            vec![Step::Chunk(b"a"), Step::Chunk(b"b"), Step::Chunk(b"c"), Step::Finish(200)],
        );
    let router = Router::new(engine);
    let (tx, rx) = unbounded();
    let aborting = Recorder::new(Duration::ZERO, Some(3), tx.clone());
    let plain = Recorder::new(Duration::ZERO, None, tx);

    let slow = router.get("http://host/slow", aborting.clone(), None).unwrap();
    let fast = router.get("http://host/fast", plain, None).unwrap();

    let outcomes: HashMap<Mark, Outcome> =
        collect(&rx, 2).into_iter().map(|o| (o.mark, o)).collect();
    assert_eq!(
        outcomes[&slow].status,
        TaskStatus::Failed(TransferError::Aborted)
    );
    assert_eq!(aborting.calls(slow).len(), 3);
    assert_eq!(
        outcomes[&fast].status,
        TaskStatus::Completed { http_status: 200 }
    );
    assert_eq!(outcomes[&fast].body, b"abc");
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn test_cancel_before_admission() {
    let engine = ScriptedEngine::new().script("http://host/slow", {
        let mut steps = vec![Step::Chunk(b"."); 50];
        steps.push(Step::Finish(200));
        steps
    });
    let router = Router::builder().max_in_flight(1).build(engine);
    let (action, rx) = Collect::new();

    let slow = router.get("http://host/slow", action.clone(), None).unwrap();
    let queued = router.get("http://host/queued", action, None).unwrap();
    assert!(router.cancel(queued));

    let outcomes: HashMap<Mark, Outcome> =
        collect(&rx, 2).into_iter().map(|o| (o.mark, o)).collect();
    assert_eq!(
        outcomes[&queued].status,
        TaskStatus::Failed(TransferError::Cancelled)
    );
    assert!(!outcomes[&queued].handled);
    assert_eq!(outcomes[&slow].status.http_status(), Some(200));
    wait_until_empty(&router);
}

#[test]
fn test_shutdown_cancels_outstanding_tasks() {
    let mut slow = vec![Step::Chunk(b"."); 1000];
    slow.push(Step::Finish(200));
    let mut engine = ScriptedEngine::new();
    for i in 0..12 {
        engine = engine.script(&format!("http://host/{i}"), slow.clone());
    }
    let router = Router::new(engine);
    let (action, rx) = Collect::new();

    for i in 0..12 {
        router
            .get(format!("http://host/{i}"), action.clone(), None)
            .unwrap();
    }
    router.shutdown();

    let outcomes = collect(&rx, 12);
    assert!(
        outcomes
            .iter()
            .all(|o| o.status == TaskStatus::Failed(TransferError::Cancelled))
    );
    assert!(rx.try_recv().is_err());
    assert_eq!(router.pending(), 0);
    assert!(matches!(
        router.get("http://host/late", action, None),
        Err(VolleyError::ShutDown)
    ));
}

#[test]
fn test_engine_errors_are_survived() {
    let router = Router::new(ScriptedEngine::new().failing_timeout());
    let (action, rx) = Collect::new();

    for i in 0..5 {
        router
            .get(format!("http://host/{i}"), action.clone(), None)
            .unwrap();
    }

    let outcomes = collect(&rx, 5);
    assert!(outcomes.iter().all(|o| o.status.is_success()));
}

#[test]
fn test_failures_and_error_statuses() {
    let engine = ScriptedEngine::new()
        .script(
            "http://host/missing",
            vec![Step::Chunk(b"not found"), Step::Finish(404)],
        )
        .script(
            "http://host/refused",
            vec![Step::Fail(TransferError::Connection("refused".into()))],
        );
    let router = Router::new(engine);
    let (action, rx) = Collect::new();

    let missing = router.get("http://host/missing", action.clone(), None).unwrap();
    let refused = router.get("http://host/refused", action, None).unwrap();

    let outcomes: HashMap<Mark, Outcome> =
        collect(&rx, 2).into_iter().map(|o| (o.mark, o)).collect();
    assert_eq!(
        outcomes[&missing].status,
        TaskStatus::Completed { http_status: 404 }
    );
    assert_eq!(outcomes[&missing].body, b"not found");
    assert_eq!(
        outcomes[&refused].status,
        TaskStatus::Failed(TransferError::Connection("refused".into()))
    );
}

#[test]
fn test_allocation_failure_fails_only_that_task() {
    let engine = ScriptedEngine::new().script(
        "http://host/huge",
        vec![
            Step::Progress {
                download_total: u64::MAX / 2,
            },
            Step::Chunk(b"x"),
            Step::Finish(200),
        ],
    );
    let router = Router::new(engine);
    let (action, rx) = Collect::new();

    let huge = router.get("http://host/huge", action.clone(), None).unwrap();
    let small = router.get("http://host/small", action, None).unwrap();

    let outcomes: HashMap<Mark, Outcome> =
        collect(&rx, 2).into_iter().map(|o| (o.mark, o)).collect();
    assert!(matches!(
        outcomes[&huge].status,
        TaskStatus::Failed(TransferError::Allocation { .. })
    ));
    assert_eq!(outcomes[&small].body, b"ok");
}

#[test]
fn test_user_data_reaches_callback() {
    let router = Router::new(ScriptedEngine::new());
    let (action, rx) = Collect::new();

    router
        .get("http://host/a", action.clone(), Some(Box::new("first".to_string())))
        .unwrap();
    router.get("http://host/b", action, Some(Box::new(7u8))).unwrap();

    let mut tags: Vec<_> = collect(&rx, 2).into_iter().map(|o| o.tag).collect();
    tags.sort();
    assert_eq!(tags, [None, Some("first".to_string())]);
}

/// Submits one follow-up request from inside `done`.
struct FollowUp {
    router: Mutex<Option<Arc<Router>>>,
    tx: Sender<Outcome>,
}

impl Action for FollowUp {
    fn done(&self, task: &volley_core::Task) {
        let _ = self.tx.send(Outcome {
            mark: task.mark(),
            status: task.response().status().clone(),
            body: task.response().body().to_vec(),
            handled: task.is_handled(),
            tag: None,
        });
        let router = self.router.lock().take();
        if let Some(router) = router {
            let (action, _) = Collect::new();
            let _ = router.get("http://host/next", action, None);
            let _ = router.get("http://host/again", Arc::new(Self {
                router: Mutex::new(None),
                tx: self.tx.clone(),
            }), None);
        }
    }
}

#[test]
fn test_done_can_submit_more_work() {
    let router = Arc::new(Router::new(ScriptedEngine::new()));
    let (tx, rx) = unbounded();
    let follow_up = Arc::new(FollowUp {
        router: Mutex::new(Some(router.clone())),
        tx,
    });

    router.get("http://host/first", follow_up, None).unwrap();

    let outcomes = collect(&rx, 2);
    assert!(outcomes.iter().all(|o| o.status.is_success()));
    wait_until_empty(&router);
}
