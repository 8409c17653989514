//! Threaded host for a [`Session`].
//!
//! Every dispatched run executes on its own worker thread. Workers never touch
//! session state: they push their result onto an event queue, and results are
//! applied only by [`SessionController::flush_pending_events`], under the same
//! lock as every other mutation. A waker callback tells an event loop when the
//! queue needs draining; headless callers can poll instead.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use exec_context::{
    CancelSignal, ContextFactory, ExecRequest, ExecResponse, ExecutionContext, Generation,
};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::session::{Completion, ContextHost, RunRequest, Session, SessionSnapshot};
use crate::source::SourceBuffer;

type Waker = Box<dyn Fn() + Send + Sync>;

/// Controller-internal run identity. Generations only change on abort and
/// clear, so consecutive runs can share one; the sequence number cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RunTicket {
    generation: Generation,
    seq: u64,
}

#[derive(Debug)]
enum RunEvent {
    Completed {
        ticket: RunTicket,
        response: ExecResponse,
    },
    Failed {
        ticket: RunTicket,
        error: String,
    },
    TimedOut {
        ticket: RunTicket,
    },
}

impl RunEvent {
    fn ticket(&self) -> RunTicket {
        match self {
            Self::Completed { ticket, .. }
            | Self::Failed { ticket, .. }
            | Self::TimedOut { ticket } => *ticket,
        }
    }
}

struct EventQueue {
    pending: Mutex<VecDeque<RunEvent>>,
    waker: Option<Waker>,
}

impl EventQueue {
    fn push(&self, event: RunEvent) {
        let should_wake = {
            let mut pending = lock_unpoisoned(&self.pending);
            let should_wake = pending.is_empty();
            pending.push_back(event);
            should_wake
        };

        if should_wake {
            if let Some(waker) = &self.waker {
                waker();
            }
        }
    }

    fn pop(&self) -> Option<RunEvent> {
        lock_unpoisoned(&self.pending).pop_front()
    }
}

struct ActiveRun {
    ticket: RunTicket,
    context: Arc<dyn ExecutionContext>,
    cancel: CancelSignal,
    join_handle: Option<JoinHandle<()>>,
}

/// Context bookkeeping; implements [`ContextHost`] for the session.
struct RunSlots {
    session_id: Uuid,
    factory: Arc<dyn ContextFactory>,
    events: Arc<EventQueue>,
    run_timeout: Option<Duration>,
    next_seq: u64,
    idle: Option<Arc<dyn ExecutionContext>>,
    active: Option<ActiveRun>,
    retired: Vec<JoinHandle<()>>,
}

impl RunSlots {
    fn is_active(&self, ticket: RunTicket) -> bool {
        self.active.as_ref().map(|active| active.ticket) == Some(ticket)
    }

    fn take_active(&mut self, ticket: RunTicket) -> Option<ActiveRun> {
        if !self.is_active(ticket) {
            return None;
        }

        self.active.take()
    }

    /// Releases the slot of a run whose result was applied. Healthy contexts
    /// are kept for the next dispatch.
    fn finish_run(&mut self, ticket: RunTicket, reusable: bool) {
        let Some(mut finished) = self.take_active(ticket) else {
            return;
        };

        // Also stops the run's watchdog.
        finished.cancel.store(true, Ordering::SeqCst);

        if let Some(join_handle) = finished.join_handle.take() {
            self.retired.push(join_handle);
        }

        if reusable && self.idle.is_none() {
            self.idle = Some(finished.context);
        } else {
            finished.context.destroy();
        }
    }

    fn reap_retired(&mut self) {
        let mut still_running = Vec::with_capacity(self.retired.len());
        for join_handle in self.retired.drain(..) {
            if join_handle.is_finished() {
                if join_handle.join().is_err() {
                    tracing::warn!(session_id = %self.session_id, "run worker panicked");
                }
            } else {
                still_running.push(join_handle);
            }
        }

        self.retired = still_running;
    }

    fn shutdown(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.cancel.store(true, Ordering::SeqCst);
            active.context.destroy();
            if let Some(join_handle) = active.join_handle.take() {
                self.retired.push(join_handle);
            }
        }

        if let Some(idle) = self.idle.take() {
            idle.destroy();
        }

        self.reap_retired();
        // Workers stuck inside an uninterruptible context are detached; they
        // only hold the event queue and their own, already destroyed, context.
        self.retired.clear();
    }

    fn spawn_watchdog(&self, ticket: RunTicket, timeout: Duration, cancel: CancelSignal) {
        let events = Arc::clone(&self.events);
        let spawned = thread::Builder::new()
            .name(format!("repl-session-watchdog-{}", ticket.seq))
            .spawn(move || {
                let deadline = Instant::now() + timeout;
                while Instant::now() < deadline {
                    if cancel.load(Ordering::SeqCst) {
                        return;
                    }

                    let remaining = deadline.saturating_duration_since(Instant::now());
                    thread::sleep(WATCHDOG_POLL.min(remaining));
                }

                if !cancel.load(Ordering::SeqCst) {
                    events.push(RunEvent::TimedOut { ticket });
                }
            });

        if let Err(error) = spawned {
            tracing::warn!(
                session_id = %self.session_id,
                generation = ticket.generation,
                %error,
                "failed to spawn run watchdog; run has no timeout"
            );
        }
    }
}

const WATCHDOG_POLL: Duration = Duration::from_millis(10);

impl ContextHost for RunSlots {
    fn start_run(&mut self, request: ExecRequest) -> Result<(), SessionError> {
        let context = match self.idle.take() {
            Some(context) => context,
            None => self
                .factory
                .create()
                .map_err(SessionError::ContextUnavailable)?,
        };

        let ticket = RunTicket {
            generation: request.generation,
            seq: self.next_seq,
        };
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));

        let join_handle = match spawn_worker(
            ticket,
            Arc::clone(&context),
            request,
            Arc::clone(&cancel),
            Arc::clone(&self.events),
        ) {
            Ok(join_handle) => join_handle,
            Err(error) => {
                self.idle = Some(context);
                return Err(SessionError::WorkerSpawn(error));
            }
        };

        self.next_seq += 1;
        if let Some(timeout) = self.run_timeout {
            self.spawn_watchdog(ticket, timeout, Arc::clone(&cancel));
        }

        self.active = Some(ActiveRun {
            ticket,
            context,
            cancel,
            join_handle: Some(join_handle),
        });

        Ok(())
    }

    fn abort_run(&mut self, generation: Generation) {
        let matches = self
            .active
            .as_ref()
            .is_some_and(|active| active.ticket.generation == generation);
        if !matches {
            return;
        }

        let Some(mut aborted) = self.active.take() else {
            return;
        };

        aborted.cancel.store(true, Ordering::SeqCst);
        aborted.context.destroy();
        if let Some(join_handle) = aborted.join_handle.take() {
            self.retired.push(join_handle);
        }
    }
}

fn spawn_worker(
    ticket: RunTicket,
    context: Arc<dyn ExecutionContext>,
    request: ExecRequest,
    cancel: CancelSignal,
    events: Arc<EventQueue>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("repl-session-run-{}", ticket.generation))
        .spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| context.execute(request, cancel)));
            let event = match outcome {
                Ok(Ok(response)) => RunEvent::Completed { ticket, response },
                Ok(Err(error)) => RunEvent::Failed { ticket, error },
                Err(_) => RunEvent::Failed {
                    ticket,
                    error: "Execution context panicked".to_string(),
                },
            };

            events.push(event);
        })
}

/// Owns one session and the execution contexts serving it.
pub struct SessionController {
    session: Mutex<Session>,
    runs: Mutex<RunSlots>,
    events: Arc<EventQueue>,
}

impl SessionController {
    /// Creates a controller without a waker. Call
    /// [`SessionController::flush_pending_events`] (or
    /// [`SessionController::wait_until_idle`]) to apply run results.
    pub fn new(factory: Arc<dyn ContextFactory>, config: SessionConfig) -> Self {
        Self::build(factory, config, None)
    }

    /// Creates a controller that calls `waker` whenever run results are
    /// waiting to be applied. The waker runs on worker threads and must not
    /// call back into the controller; it should only schedule a flush.
    pub fn with_waker(
        factory: Arc<dyn ContextFactory>,
        config: SessionConfig,
        waker: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self::build(factory, config, Some(Box::new(waker)))
    }

    fn build(factory: Arc<dyn ContextFactory>, config: SessionConfig, waker: Option<Waker>) -> Self {
        let session = Session::new(config.environment_commit);
        let events = Arc::new(EventQueue {
            pending: Mutex::new(VecDeque::new()),
            waker,
        });

        let runs = RunSlots {
            session_id: session.id(),
            factory,
            events: Arc::clone(&events),
            run_timeout: config.run_timeout,
            next_seq: 1,
            idle: None,
            active: None,
            retired: Vec::new(),
        };

        Self {
            session: Mutex::new(session),
            runs: Mutex::new(runs),
            events,
        }
    }

    /// Runs `f` with the session and its context host locked, in that order.
    fn with_session<T>(&self, f: impl FnOnce(&mut Session, &mut RunSlots) -> T) -> T {
        let mut session = lock_unpoisoned(&self.session);
        let mut runs = lock_unpoisoned(&self.runs);
        f(&mut session, &mut runs)
    }

    pub fn dispatch(&self, request: RunRequest) -> Result<Generation, SessionError> {
        self.with_session(|session, runs| session.dispatch(request, runs))
    }

    pub fn run_program(&self) -> Result<Generation, SessionError> {
        self.with_session(|session, runs| session.run_program(runs))
    }

    pub fn run_terminal_line(&self, line: impl Into<String>) -> Result<Generation, SessionError> {
        self.with_session(|session, runs| session.run_terminal_line(line, runs))
    }

    pub fn abort(&self) -> bool {
        self.with_session(|session, runs| session.abort(runs))
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        lock_unpoisoned(&self.session).clear()
    }

    pub fn submit_history_line(&self, line: impl Into<String>) -> Result<String, SessionError> {
        lock_unpoisoned(&self.session).submit_history_line(line)
    }

    pub fn recall_previous(&self) -> Option<String> {
        lock_unpoisoned(&self.session).recall_previous()
    }

    pub fn recall_next(&self) -> Option<String> {
        lock_unpoisoned(&self.session).recall_next()
    }

    pub fn set_source_text(&self, text: impl Into<String>) -> bool {
        lock_unpoisoned(&self.session).set_source_text(text)
    }

    pub fn clear_source(&self) {
        lock_unpoisoned(&self.session).clear_source();
    }

    pub fn mark_saved(&self) {
        lock_unpoisoned(&self.session).mark_saved();
    }

    pub fn open_source(&self, source: SourceBuffer) {
        self.with_session(|session, runs| session.open_source(source, runs));
    }

    #[must_use]
    pub fn source(&self) -> SourceBuffer {
        lock_unpoisoned(&self.session).source().clone()
    }

    #[must_use]
    pub fn history(&self) -> Vec<String> {
        lock_unpoisoned(&self.session).history().entries().to_vec()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        lock_unpoisoned(&self.session).snapshot()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        lock_unpoisoned(&self.session).is_running()
    }

    /// Applies queued run results in arrival order. Returns how many events
    /// were drained, including stale ones that were dropped.
    pub fn flush_pending_events(&self) -> usize {
        let mut drained = 0usize;
        while let Some(event) = self.events.pop() {
            self.apply_event(event);
            drained += 1;
        }

        lock_unpoisoned(&self.runs).reap_retired();
        drained
    }

    /// Flushes until no run is in flight or `timeout` elapses.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.flush_pending_events();
            if !self.is_running() {
                return true;
            }

            if Instant::now() >= deadline {
                return false;
            }

            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Cancels and destroys every live context. Later dispatches create fresh ones.
    pub fn shutdown(&self) {
        self.with_session(|session, runs| {
            if let Some(generation) = session.running_generation() {
                tracing::debug!(session_id = %session.id(), generation, "shutting down with run in flight");
            }
            session.abort(runs);
            runs.shutdown();
        });
    }

    fn apply_event(&self, event: RunEvent) {
        let ticket = event.ticket();
        self.with_session(|session, runs| {
            if !runs.is_active(ticket) {
                tracing::debug!(
                    session_id = %session.id(),
                    generation = ticket.generation,
                    "dropping event from retired run"
                );
                return;
            }

            match event {
                RunEvent::Completed { response, .. } => {
                    if session.complete(ticket.generation, response) == Completion::Applied {
                        runs.finish_run(ticket, true);
                    }
                }
                RunEvent::Failed { error, .. } => {
                    if session.fail(ticket.generation, &error) == Completion::Applied {
                        runs.finish_run(ticket, false);
                    }
                }
                RunEvent::TimedOut { .. } => {
                    tracing::warn!(
                        session_id = %session.id(),
                        generation = ticket.generation,
                        "run timed out"
                    );
                    session.abort(runs);
                }
            }
        });
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        let runs = match self.runs.get_mut() {
            Ok(runs) => runs,
            Err(poisoned) => poisoned.into_inner(),
        };
        runs.shutdown();
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
