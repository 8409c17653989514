#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use repl_session::{
    CancelSignal, ContextFactory, ContextInitError, ExecRequest, ExecResponse, ExecutionContext,
};
use serde_json::json;

pub const WAIT: Duration = Duration::from_secs(5);

/// How a [`ScriptedContext`] answers every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Blocks, ignoring cancellation, until the gate opens; then reports
    /// success with `late = 1` bound.
    Gated,
    /// Returns a context error instead of a response.
    Broken,
    /// Panics inside `execute`.
    Panics,
}

pub struct ScriptedFactory {
    behavior: Behavior,
    gate: Arc<AtomicBool>,
    created: AtomicUsize,
    destroyed: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<ExecRequest>>>,
}

impl ScriptedFactory {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            gate: Arc::new(AtomicBool::new(false)),
            created: AtomicUsize::new(0),
            destroyed: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn open_gate(&self) {
        self.gate.store(true, Ordering::SeqCst);
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ExecRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    pub fn as_factory(self: &Arc<Self>) -> Arc<dyn ContextFactory> {
        Arc::clone(self) as Arc<dyn ContextFactory>
    }
}

impl ContextFactory for ScriptedFactory {
    fn create(&self) -> Result<Arc<dyn ExecutionContext>, ContextInitError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedContext {
            behavior: self.behavior,
            gate: Arc::clone(&self.gate),
            destroyed: Arc::clone(&self.destroyed),
            requests: Arc::clone(&self.requests),
            finished: AtomicBool::new(false),
        }))
    }
}

struct ScriptedContext {
    behavior: Behavior,
    gate: Arc<AtomicBool>,
    destroyed: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<ExecRequest>>>,
    finished: AtomicBool,
}

impl ExecutionContext for ScriptedContext {
    fn execute(&self, req: ExecRequest, _cancel: CancelSignal) -> Result<ExecResponse, String> {
        lock_unpoisoned(&self.requests).push(req.clone());

        match self.behavior {
            Behavior::Gated => {
                while !self.gate.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(2));
                }

                let mut environment = req.environment_in;
                environment.insert("late", json!(1));
                self.finished.store(true, Ordering::SeqCst);
                Ok(ExecResponse::success(
                    "late output",
                    0.0,
                    environment,
                    Some("1".to_string()),
                ))
            }
            Behavior::Broken => Err("interpreter crashed".to_string()),
            Behavior::Panics => panic!("scripted context panic"),
        }
    }

    fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }

        if Instant::now() >= deadline {
            return false;
        }

        thread::sleep(Duration::from_millis(2));
    }
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
