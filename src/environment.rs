//! Threading variable bindings between otherwise stateless runs.

use std::str::FromStr;

pub use exec_context::Environment;

use crate::session::RunMode;

/// Whether a failed terminal run still replaces the session environment.
///
/// `Always` matches the shell the sessions were modelled on: bindings made by
/// top-level statements before the failure stay visible to later lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnvironmentCommit {
    #[default]
    Always,
    OnSuccess,
}

impl EnvironmentCommit {
    #[must_use]
    pub fn should_commit(self, ok: bool) -> bool {
        match self {
            Self::Always => true,
            Self::OnSuccess => ok,
        }
    }
}

impl FromStr for EnvironmentCommit {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "on-success" | "on_success" => Ok(Self::OnSuccess),
            other => Err(format!(
                "Unsupported environment commit policy '{other}'. Expected 'always' or 'on-success'"
            )),
        }
    }
}

/// Environment handed to a run: the session bindings for terminal lines,
/// nothing for whole-program runs.
#[must_use]
pub fn environment_for(mode: RunMode, current: &Environment) -> Environment {
    match mode {
        RunMode::Terminal => current.clone(),
        RunMode::Program => Environment::new(),
    }
}
