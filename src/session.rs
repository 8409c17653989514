//! Single-threaded session state machine.
//!
//! [`Session`] owns the transcript, the variable environment, input history
//! and the program source, and decides how each run result is merged into
//! them. It never spawns anything itself: contexts are started and torn down
//! through a [`ContextHost`], which keeps the state machine testable without
//! threads. [`crate::controller::SessionController`] is the threaded host.

use exec_context::{Environment, ExecRequest, ExecResponse, Generation};
use uuid::Uuid;

use crate::environment::{environment_for, EnvironmentCommit};
use crate::error::SessionError;
use crate::history::HistoryNavigator;
use crate::output::{
    LogEntry, OutputLog, BANNER_ABORTED, BANNER_ERROR, BANNER_RUNNING, BANNER_SUCCESS,
};
use crate::source::SourceBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Whole-file run; starts from an empty environment.
    Program,
    /// One terminal line; reads and replaces the session environment.
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub mode: RunMode,
    pub source_text: String,
}

impl RunRequest {
    #[must_use]
    pub fn program(source_text: impl Into<String>) -> Self {
        Self {
            mode: RunMode::Program,
            source_text: source_text.into(),
        }
    }

    #[must_use]
    pub fn terminal(line: impl Into<String>) -> Self {
        Self {
            mode: RunMode::Terminal,
            source_text: line.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running {
        generation: Generation,
        mode: RunMode,
        source_text: String,
    },
}

/// Outcome of offering a result to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// The result belonged to a superseded run and was dropped.
    Stale,
}

/// Starts and tears down execution contexts on behalf of a [`Session`].
pub trait ContextHost {
    /// Hands `request` to an execution context without blocking.
    fn start_run(&mut self, request: ExecRequest) -> Result<(), SessionError>;

    /// Discards the context running `generation`; its result must never be applied.
    fn abort_run(&mut self, generation: Generation);
}

/// Read-only view used for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub log: OutputLog,
    pub environment: Environment,
    pub history_position: usize,
    pub run_in_flight: bool,
    pub generation: Generation,
    pub source_dirty: bool,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    state: RunState,
    generation: Generation,
    environment: Environment,
    log: OutputLog,
    history: HistoryNavigator,
    source: SourceBuffer,
    commit: EnvironmentCommit,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(EnvironmentCommit::default())
    }
}

impl Session {
    #[must_use]
    pub fn new(commit: EnvironmentCommit) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RunState::Idle,
            generation: 0,
            environment: Environment::new(),
            log: OutputLog::new(),
            history: HistoryNavigator::new(),
            source: SourceBuffer::scratch(),
            commit,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> &RunState {
        &self.state
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running { .. })
    }

    /// Generation of the in-flight run, if any.
    #[must_use]
    pub fn running_generation(&self) -> Option<Generation> {
        match self.state {
            RunState::Running { generation, .. } => Some(generation),
            RunState::Idle => None,
        }
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    #[must_use]
    pub fn log(&self) -> &OutputLog {
        &self.log
    }

    #[must_use]
    pub fn history(&self) -> &HistoryNavigator {
        &self.history
    }

    #[must_use]
    pub fn source(&self) -> &SourceBuffer {
        &self.source
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            log: self.log.clone(),
            environment: self.environment.clone(),
            history_position: self.history.position(),
            run_in_flight: self.is_running(),
            generation: self.generation,
            source_dirty: self.source.is_dirty(),
        }
    }

    /// Starts a run. Rejections leave the session untouched.
    pub fn dispatch(
        &mut self,
        request: RunRequest,
        host: &mut dyn ContextHost,
    ) -> Result<Generation, SessionError> {
        if self.is_running() {
            return Err(SessionError::RunInFlight);
        }

        if request.mode == RunMode::Terminal && request.source_text.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }

        let generation = self.generation;
        let exec_request = ExecRequest {
            generation,
            is_main_run: request.mode == RunMode::Program,
            source_text: request.source_text.clone(),
            environment_in: environment_for(request.mode, &self.environment),
        };

        if let Err(error) = host.start_run(exec_request) {
            tracing::warn!(session_id = %self.id, generation, %error, "run failed to start");
            self.log
                .push(LogEntry::banner(format!("Run failed to start: {error}")));
            return Err(error);
        }

        tracing::debug!(session_id = %self.id, generation, mode = ?request.mode, "run dispatched");
        self.log.push(LogEntry::banner(BANNER_RUNNING));
        if request.mode == RunMode::Terminal {
            self.log.push(LogEntry::echo(request.source_text.clone()));
        }

        self.state = RunState::Running {
            generation,
            mode: request.mode,
            source_text: request.source_text,
        };

        Ok(generation)
    }

    /// Merges a structured run result tagged with `generation`.
    pub fn complete(&mut self, generation: Generation, response: ExecResponse) -> Completion {
        let Some(mode) = self.accepting_mode(generation) else {
            return Completion::Stale;
        };

        let ExecResponse {
            ok,
            output_text,
            elapsed_seconds,
            environment_out,
            last_value,
        } = response;

        if !output_text.is_empty() {
            self.log.push(LogEntry::text(ok, output_text));
        }

        match mode {
            RunMode::Terminal => {
                if ok {
                    if let Some(last_value) = last_value {
                        self.log.push(LogEntry::text(true, last_value));
                    }
                }

                if self.commit.should_commit(ok) {
                    self.environment = environment_out;
                }
            }
            RunMode::Program => {
                if ok {
                    self.log.push(LogEntry::banner(BANNER_SUCCESS));
                    self.log.push(LogEntry::timing_now(elapsed_seconds));
                } else {
                    self.log.push(LogEntry::banner(BANNER_ERROR));
                }
            }
        }

        tracing::debug!(session_id = %self.id, generation, ok, "run completed");
        self.state = RunState::Idle;
        Completion::Applied
    }

    /// Records a context that broke without producing a structured result.
    /// The environment is left as it was.
    pub fn fail(&mut self, generation: Generation, error: &str) -> Completion {
        let Some(mode) = self.accepting_mode(generation) else {
            return Completion::Stale;
        };

        tracing::warn!(session_id = %self.id, generation, error, "execution context failed");
        self.log.push(LogEntry::text(false, error));
        if mode == RunMode::Program {
            self.log.push(LogEntry::banner(BANNER_ERROR));
        }

        self.state = RunState::Idle;
        Completion::Applied
    }

    /// Abandons the in-flight run. Returns false (and does nothing) when idle.
    pub fn abort(&mut self, host: &mut dyn ContextHost) -> bool {
        let Some(generation) = self.retire_running(host) else {
            return false;
        };

        tracing::debug!(session_id = %self.id, generation, "run aborted");
        self.log.push(LogEntry::banner(BANNER_ABORTED));
        true
    }

    /// Empties the log and environment and retires the current generation.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        if self.is_running() {
            return Err(SessionError::RunInFlight);
        }

        self.reset();
        Ok(())
    }

    /// Records a terminal line in history and returns it for dispatch.
    pub fn submit_history_line(&mut self, line: impl Into<String>) -> Result<String, SessionError> {
        let line = line.into();
        if self.is_running() {
            return Err(SessionError::RunInFlight);
        }

        if line.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }

        self.history.record(line.clone());
        Ok(line)
    }

    pub fn recall_previous(&mut self) -> Option<String> {
        self.history.recall_previous().map(str::to_string)
    }

    pub fn recall_next(&mut self) -> Option<String> {
        self.history.recall_next().map(str::to_string)
    }

    /// Submits a terminal line to history and dispatches it.
    pub fn run_terminal_line(
        &mut self,
        line: impl Into<String>,
        host: &mut dyn ContextHost,
    ) -> Result<Generation, SessionError> {
        let line = self.submit_history_line(line)?;
        self.dispatch(RunRequest::terminal(line), host)
    }

    /// Dispatches the whole source buffer, empty or not.
    pub fn run_program(&mut self, host: &mut dyn ContextHost) -> Result<Generation, SessionError> {
        let source_text = self.source.text().to_string();
        self.dispatch(RunRequest::program(source_text), host)
    }

    /// Replaces the program text; returns true when the buffer became dirty.
    pub fn set_source_text(&mut self, text: impl Into<String>) -> bool {
        self.source.set_text(text)
    }

    /// Empties the program text and forgets terminal bindings.
    pub fn clear_source(&mut self) {
        self.source.clear();
        self.environment = Environment::new();
    }

    pub fn mark_saved(&mut self) {
        self.source.mark_saved();
    }

    /// Switches to another source file. Any in-flight run is dropped without
    /// a banner since the transcript is discarded with it; history is kept.
    pub fn open_source(&mut self, source: SourceBuffer, host: &mut dyn ContextHost) {
        self.retire_running(host);
        self.source = source;
        self.reset();
    }

    fn accepting_mode(&self, generation: Generation) -> Option<RunMode> {
        match self.state {
            RunState::Running {
                generation: active,
                mode,
                ..
            } if active == generation && generation == self.generation => Some(mode),
            _ => {
                tracing::debug!(
                    session_id = %self.id,
                    generation,
                    current = self.generation,
                    "stale run result dropped"
                );
                None
            }
        }
    }

    fn retire_running(&mut self, host: &mut dyn ContextHost) -> Option<Generation> {
        let generation = self.running_generation()?;
        self.generation += 1;
        self.state = RunState::Idle;
        host.abort_run(generation);
        Some(generation)
    }

    fn reset(&mut self) {
        self.log.clear();
        self.environment = Environment::new();
        self.generation += 1;
    }
}
