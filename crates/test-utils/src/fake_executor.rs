use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use monodag::exec::{BoxFuture, ExecOutcome, ExecRequest, Executor};
use tokio::sync::Notify;

/// A fake executor that:
/// - records every `workspace:target` invocation in dispatch order
/// - tracks the high-water mark of concurrently running invocations
/// - succeeds by default; fails for workspaces registered via `fail_on`
/// - honours the hard-stop hook: `cancel` interrupts a delayed invocation
///   and is recorded so tests can assert the hook fired.
///
/// An optional per-invocation delay keeps invocations overlapping long enough
/// for the concurrency high-water mark to be meaningful.
pub struct FakeExecutor {
    invocations: Mutex<Vec<String>>,
    cancellations: Mutex<Vec<String>>,
    failures: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    kill_switches: Mutex<HashMap<String, Arc<Notify>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            invocations: Mutex::new(vec![]),
            cancellations: Mutex::new(vec![]),
            failures: Mutex::new(HashSet::new()),
            delay: None,
            kill_switches: Mutex::new(HashMap::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every invocation for this workspace fail.
    pub fn fail_on(self, workspace: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(workspace.to_string());
        self
    }

    /// Invocations in dispatch order, as `workspace:target`.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn invoked(&self, workspace: &str, target: &str) -> bool {
        let key = format!("{workspace}:{target}");
        self.invocations.lock().unwrap().iter().any(|i| *i == key)
    }

    /// `workspace:target` keys the scheduler asked to hard-stop.
    pub fn cancellations(&self) -> Vec<String> {
        self.cancellations.lock().unwrap().clone()
    }

    /// Highest number of invocations that were running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for FakeExecutor {
    fn execute(&self, req: ExecRequest) -> BoxFuture<ExecOutcome> {
        let key = format!("{}:{}", req.workspace.name, req.target);
        self.invocations.lock().unwrap().push(key.clone());

        let kill = Arc::new(Notify::new());
        self.kill_switches
            .lock()
            .unwrap()
            .insert(key, Arc::clone(&kill));

        let fail = self.failures.lock().unwrap().contains(&req.workspace.name);
        let delay = self.delay;
        let in_flight = Arc::clone(&self.in_flight);
        let max_in_flight = Arc::clone(&self.max_in_flight);

        Box::pin(async move {
            let running = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_in_flight.fetch_max(running, Ordering::SeqCst);

            let mut killed = false;
            if let Some(delay) = delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = kill.notified() => killed = true,
                }
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);

            if killed {
                ExecOutcome::failure(format!("{} was killed", req.workspace.name))
            } else if fail {
                ExecOutcome::failure(format!("{} was told to fail", req.workspace.name))
            } else {
                ExecOutcome::success(format!("ran {}", req.workspace.name).into_bytes())
            }
        })
    }

    fn cancel(&self, workspace: &str, target: &str) {
        let key = format!("{workspace}:{target}");
        self.cancellations.lock().unwrap().push(key.clone());
        if let Some(kill) = self.kill_switches.lock().unwrap().get(&key) {
            kill.notify_one();
        }
    }
}
