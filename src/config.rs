//! Environment configuration.

use std::env;
use std::time::Duration;

use crate::environment::EnvironmentCommit;

pub const RUN_TIMEOUT_ENV_VAR: &str = "REPL_RUN_TIMEOUT_MS";
pub const ENV_COMMIT_ENV_VAR: &str = "REPL_ENV_COMMIT";
pub const LOG_FILTER_ENV_VAR: &str = "REPL_LOG";
pub const CONTEXT_ENV_VAR: &str = "REPL_CONTEXT";
pub const INTERPRETER_ENV_VAR: &str = "REPL_INTERPRETER";

/// Per-session behavior knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Runs still in flight after this long are aborted.
    pub run_timeout: Option<Duration>,
    pub environment_commit: EnvironmentCommit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub run_timeout: Option<Duration>,
    pub environment_commit: EnvironmentCommit,
    pub log_filter: Option<String>,
    pub context: Option<String>,
    pub interpreter: Option<String>,
}

impl EnvConfig {
    /// Reads configuration from the process environment.
    ///
    /// Blank or unparseable timeouts mean no timeout. An unknown commit policy
    /// is an error.
    pub fn from_env() -> Result<Self, String> {
        let environment_commit = match env_string_opt(ENV_COMMIT_ENV_VAR) {
            Some(value) => value.parse()?,
            None => EnvironmentCommit::default(),
        };

        Ok(Self {
            run_timeout: env_millis_opt(RUN_TIMEOUT_ENV_VAR),
            environment_commit,
            log_filter: env_string_opt(LOG_FILTER_ENV_VAR),
            context: env_string_opt(CONTEXT_ENV_VAR),
            interpreter: env_string_opt(INTERPRETER_ENV_VAR),
        })
    }

    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            run_timeout: self.run_timeout,
            environment_commit: self.environment_commit,
        }
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_millis_opt(key: &str) -> Option<Duration> {
    env_string_opt(key)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
}
