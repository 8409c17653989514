//! Interactive execution sessions.
//!
//! A [`Session`] runs one program or terminal line at a time in an external
//! [`ExecutionContext`], threads variable bindings between terminal runs, and
//! keeps a transcript of everything that happened. Aborting a run bumps the
//! session generation so a result that arrives late is recognised and
//! dropped. [`SessionController`] hosts a session on worker threads.

pub mod config;
pub mod controller;
pub mod environment;
pub mod error;
pub mod history;
pub mod logging;
pub mod output;
pub mod session;
pub mod source;

pub use config::{EnvConfig, SessionConfig};
pub use controller::SessionController;
pub use environment::{Environment, EnvironmentCommit};
pub use error::SessionError;
pub use exec_context::{
    CancelSignal, ContextFactory, ContextInitError, ExecRequest, ExecResponse, ExecutionContext,
    Generation,
};
pub use history::HistoryNavigator;
pub use output::{LogEntry, OutputLog};
pub use session::{
    Completion, ContextHost, RunMode, RunRequest, RunState, Session, SessionSnapshot,
};
pub use source::SourceBuffer;
