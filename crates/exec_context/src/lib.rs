//! Minimal contract between a REPL session and the execution context that runs its code.
//!
//! This crate defines only the request/response envelope, the variable environment
//! threaded between runs, and the context lifecycle traits. It excludes language
//! semantics, transport details, and session orchestration.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Monotonic epoch tag carried by every dispatched run.
pub type Generation = u64;

/// Shared cancellation flag for a run.
pub type CancelSignal = Arc<AtomicBool>;

/// Variable bindings produced by one run and fed into the next.
///
/// Values are opaque to the session; only the execution context interprets them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment(BTreeMap<String, Value>);

impl Environment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Binds `name`, returning the previous value when one existed.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Environment {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Input for one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecRequest {
    pub generation: Generation,
    /// `true` for whole-program runs, `false` for single terminal lines.
    pub is_main_run: bool,
    pub source_text: String,
    pub environment_in: Environment,
}

/// Structured result of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecResponse {
    pub ok: bool,
    #[serde(default)]
    pub output_text: String,
    #[serde(default)]
    pub elapsed_seconds: f64,
    #[serde(default)]
    pub environment_out: Environment,
    #[serde(default)]
    pub last_value: Option<String>,
}

impl ExecResponse {
    /// Constructs a successful response.
    #[must_use]
    pub fn success(
        output_text: impl Into<String>,
        elapsed_seconds: f64,
        environment_out: Environment,
        last_value: Option<String>,
    ) -> Self {
        Self {
            ok: true,
            output_text: output_text.into(),
            elapsed_seconds,
            environment_out,
            last_value,
        }
    }

    /// Constructs a failed response. Failed runs never report a last value.
    #[must_use]
    pub fn failure(
        output_text: impl Into<String>,
        elapsed_seconds: f64,
        environment_out: Environment,
    ) -> Self {
        Self {
            ok: false,
            output_text: output_text.into(),
            elapsed_seconds,
            environment_out,
            last_value: None,
        }
    }
}

/// Error returned when a context cannot be created at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInitError {
    message: String,
}

impl ContextInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ContextInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ContextInitError {}

impl From<String> for ContextInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ContextInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// An isolated unit of computation.
///
/// The session treats a context as a black box: it may not stop when asked to,
/// so the session never relies on `cancel` or `destroy` for correctness, only
/// for releasing resources.
pub trait ExecutionContext: Send + Sync + 'static {
    /// Runs `req` to completion on the calling (worker) thread.
    ///
    /// `Ok` carries both successful and failed runs. `Err` means the context
    /// itself broke and could not produce a structured result.
    fn execute(&self, req: ExecRequest, cancel: CancelSignal) -> Result<ExecResponse, String>;

    /// Releases the context. Must be idempotent and callable from any thread,
    /// including while `execute` is still running elsewhere.
    fn destroy(&self) {}
}

/// Creates fresh execution contexts.
pub trait ContextFactory: Send + Sync + 'static {
    fn create(&self) -> Result<Arc<dyn ExecutionContext>, ContextInitError>;
}
