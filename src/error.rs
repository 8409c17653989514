use exec_context::ContextInitError;
use thiserror::Error;

/// Errors surfaced to the host by session operations.
///
/// Execution failures are never reported here: they become log entries.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a run is already in flight")]
    RunInFlight,

    #[error("terminal input is empty")]
    EmptyInput,

    #[error("failed to create execution context: {0}")]
    ContextUnavailable(#[source] ContextInitError),

    #[error("failed to spawn run worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

impl SessionError {
    /// Returns true for rejections that leave the session untouched.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::RunInFlight | Self::EmptyInput)
    }
}
