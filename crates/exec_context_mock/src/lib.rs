//! Deterministic in-process implementation of the `exec_context` contract.
//!
//! The mock understands a tiny statement language, enough to exercise
//! environment threading, failures with partial bindings, and cancellation:
//!
//! - `name = expr` binds a value; the bound value becomes the last value.
//! - `print expr` appends the value and a newline to the output.
//! - `fail message` stops with `ok = false`, keeping bindings made so far.
//! - `sleep ms` sleeps, returning early with an error when cancelled.
//! - `spin` loops until cancelled.
//! - `expr` evaluates an expression; its value becomes the last value.
//!
//! Expressions are integer literals, double-quoted strings, names, or `a + b`.
//! Statements are separated by newlines or `;`, and `#` starts a comment line.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use exec_context::{
    CancelSignal, ContextFactory, ContextInitError, Environment, ExecRequest, ExecResponse,
    ExecutionContext,
};
use serde_json::Value;

/// Stable identifier used for explicit context selection.
pub const MOCK_CONTEXT_ID: &str = "mock";

const CANCELLED_ERROR: &str = "execution cancelled";
const DESTROYED_ERROR: &str = "execution context destroyed";

/// Factory producing [`MockContext`] instances and counting their lifecycle.
#[derive(Debug, Default)]
pub struct MockContextFactory {
    created: Arc<AtomicUsize>,
    destroyed: Arc<AtomicUsize>,
    fail_creation: bool,
}

impl MockContextFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory whose `create` always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_creation: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn destroyed_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl ContextFactory for MockContextFactory {
    fn create(&self) -> Result<Arc<dyn ExecutionContext>, ContextInitError> {
        if self.fail_creation {
            return Err(ContextInitError::new("mock context creation disabled"));
        }

        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockContext {
            destroyed: AtomicBool::new(false),
            destroyed_counter: Arc::clone(&self.destroyed),
        }))
    }
}

/// One mock execution context.
#[derive(Debug)]
pub struct MockContext {
    destroyed: AtomicBool,
    destroyed_counter: Arc<AtomicUsize>,
}

impl MockContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            destroyed: AtomicBool::new(false),
            destroyed_counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    const POLL_MS: u64 = 5;

    fn is_stopped(&self, cancel: &CancelSignal) -> bool {
        cancel.load(Ordering::SeqCst) || self.destroyed.load(Ordering::SeqCst)
    }

    fn pause(&self, cancel: &CancelSignal, total: Option<Duration>) -> Result<(), String> {
        let started = Instant::now();
        loop {
            if self.is_stopped(cancel) {
                return Err(CANCELLED_ERROR.to_string());
            }

            if total.is_some_and(|total| started.elapsed() >= total) {
                return Ok(());
            }

            thread::sleep(Duration::from_millis(Self::POLL_MS));
        }
    }
}

impl Default for MockContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext for MockContext {
    fn execute(&self, req: ExecRequest, cancel: CancelSignal) -> Result<ExecResponse, String> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(DESTROYED_ERROR.to_string());
        }

        let started = Instant::now();
        let mut environment = req.environment_in;
        let mut output = String::new();
        let mut last_value = None;

        for statement in statements(&req.source_text) {
            let outcome = match parse_statement(statement) {
                Statement::Print(expr) => eval(expr, &environment).map(|value| {
                    output.push_str(&render(&value));
                    output.push('\n');
                    None
                }),
                Statement::Fail(message) => Err(message.to_string()),
                Statement::Sleep(ms) => {
                    self.pause(&cancel, Some(Duration::from_millis(ms)))?;
                    Ok(None)
                }
                Statement::Spin => {
                    self.pause(&cancel, None)?;
                    Ok(None)
                }
                Statement::Assign(name, expr) => eval(expr, &environment).map(|value| {
                    let rendered = render(&value);
                    environment.insert(name, value);
                    Some(rendered)
                }),
                Statement::Expr(expr) => eval(expr, &environment).map(|value| Some(render(&value))),
            };

            match outcome {
                Ok(Some(value)) => last_value = Some(value),
                Ok(None) => {}
                Err(message) => {
                    output.push_str(&message);
                    return Ok(ExecResponse::failure(
                        output,
                        started.elapsed().as_secs_f64(),
                        environment,
                    ));
                }
            }
        }

        Ok(ExecResponse::success(
            output,
            started.elapsed().as_secs_f64(),
            environment,
            last_value,
        ))
    }

    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.destroyed_counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

enum Statement<'a> {
    Print(&'a str),
    Fail(&'a str),
    Sleep(u64),
    Spin,
    Assign(&'a str, &'a str),
    Expr(&'a str),
}

fn statements(source: &str) -> impl Iterator<Item = &str> {
    source
        .split(['\n', ';'])
        .map(str::trim)
        .filter(|statement| !statement.is_empty() && !statement.starts_with('#'))
}

fn parse_statement(statement: &str) -> Statement<'_> {
    if statement == "spin" {
        return Statement::Spin;
    }

    if let Some(rest) = statement.strip_prefix("print ") {
        return Statement::Print(rest.trim());
    }

    if let Some(rest) = statement.strip_prefix("fail") {
        if rest.is_empty() || rest.starts_with(' ') {
            let message = rest.trim();
            return Statement::Fail(if message.is_empty() { "failed" } else { message });
        }
    }

    if let Some(rest) = statement.strip_prefix("sleep ") {
        if let Ok(ms) = rest.trim().parse() {
            return Statement::Sleep(ms);
        }
    }

    if let Some((name, expr)) = statement.split_once('=') {
        let name = name.trim();
        if is_identifier(name) {
            return Statement::Assign(name, expr.trim());
        }
    }

    Statement::Expr(statement)
}

fn eval(expr: &str, environment: &Environment) -> Result<Value, String> {
    if let Some((lhs, rhs)) = split_plus(expr) {
        let lhs = eval(lhs, environment)?;
        let rhs = eval(rhs, environment)?;
        return match (&lhs, &rhs) {
            (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => a
                    .checked_add(b)
                    .map(Value::from)
                    .ok_or_else(|| "integer overflow".to_string()),
                _ => Err(format!("cannot add {lhs} and {rhs}")),
            },
            (Value::String(a), Value::String(b)) => Ok(Value::from(format!("{a}{b}"))),
            _ => Err(format!("cannot add {lhs} and {rhs}")),
        };
    }

    let expr = expr.trim();
    if let Ok(number) = expr.parse::<i64>() {
        return Ok(Value::from(number));
    }

    if let Some(text) = expr
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        return Ok(Value::from(text));
    }

    if is_identifier(expr) {
        return environment
            .get(expr)
            .cloned()
            .ok_or_else(|| format!("name '{expr}' is not defined"));
    }

    Err(format!("invalid expression: {expr}"))
}

// Splits on the last `+` outside a string literal.
fn split_plus(expr: &str) -> Option<(&str, &str)> {
    let mut in_string = false;
    let mut split_at = None;
    for (index, ch) in expr.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '+' if !in_string => split_at = Some(index),
            _ => {}
        }
    }

    split_at.map(|index| (&expr[..index], &expr[index + 1..]))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn run(source: &str, environment: Environment) -> ExecResponse {
        MockContext::new()
            .execute(
                ExecRequest {
                    generation: 1,
                    is_main_run: false,
                    source_text: source.to_string(),
                    environment_in: environment,
                },
                Arc::new(AtomicBool::new(false)),
            )
            .expect("mock execution should return a response")
    }

    #[test]
    fn assignment_binds_and_reports_last_value() {
        let response = run("x = 2", Environment::new());

        assert!(response.ok);
        assert_eq!(response.output_text, "");
        assert_eq!(response.last_value.as_deref(), Some("2"));
        assert_eq!(response.environment_out.get("x"), Some(&json!(2)));
    }

    #[test]
    fn expressions_read_incoming_environment() {
        let environment = [("x", json!(40))].into_iter().collect();
        let response = run("y = x + 2; print y", environment);

        assert!(response.ok);
        assert_eq!(response.output_text, "42\n");
        assert_eq!(response.environment_out.get("y"), Some(&json!(42)));
        assert_eq!(response.environment_out.get("x"), Some(&json!(40)));
    }

    #[test]
    fn strings_concatenate_and_print_raw() {
        let response = run("greeting = \"hi \" + \"there\"\nprint greeting", Environment::new());

        assert!(response.ok);
        assert_eq!(response.output_text, "hi there\n");
    }

    #[test]
    fn failure_keeps_bindings_made_before_the_error() {
        let response = run("a = 1\nfail boom\nb = 2", Environment::new());

        assert!(!response.ok);
        assert_eq!(response.output_text, "boom");
        assert_eq!(response.environment_out.get("a"), Some(&json!(1)));
        assert!(response.environment_out.get("b").is_none());
        assert_eq!(response.last_value, None);
    }

    #[test]
    fn undefined_names_fail() {
        let response = run("missing", Environment::new());

        assert!(!response.ok);
        assert_eq!(response.output_text, "name 'missing' is not defined");
    }

    #[test]
    fn spin_returns_error_once_cancelled() {
        let context = Arc::new(MockContext::new());
        let cancel = Arc::new(AtomicBool::new(false));

        let worker_context = Arc::clone(&context);
        let worker_cancel = Arc::clone(&cancel);
        let worker = thread::spawn(move || {
            worker_context.execute(
                ExecRequest {
                    generation: 1,
                    is_main_run: true,
                    source_text: "spin".to_string(),
                    environment_in: Environment::new(),
                },
                worker_cancel,
            )
        });

        thread::sleep(Duration::from_millis(20));
        cancel.store(true, Ordering::SeqCst);

        let result = worker.join().expect("worker should not panic");
        assert_eq!(result, Err(CANCELLED_ERROR.to_string()));
    }

    #[test]
    fn factory_counts_creation_and_idempotent_destroy() {
        let factory = MockContextFactory::new();
        let first = factory.create().expect("mock context");
        let _second = factory.create().expect("mock context");

        first.destroy();
        first.destroy();

        assert_eq!(factory.created_count(), 2);
        assert_eq!(factory.destroyed_count(), 1);
    }

    #[test]
    fn destroyed_context_refuses_to_execute() {
        let context = MockContext::new();
        context.destroy();

        let result = context.execute(
            ExecRequest {
                generation: 1,
                is_main_run: true,
                source_text: "x = 1".to_string(),
                environment_in: Environment::new(),
            },
            Arc::new(AtomicBool::new(false)),
        );

        assert_eq!(result, Err(DESTROYED_ERROR.to_string()));
    }

    #[test]
    fn failing_factory_reports_init_error() {
        let error = match MockContextFactory::failing().create() {
            Ok(_) => panic!("failing factory must not create contexts"),
            Err(error) => error,
        };

        assert_eq!(error.message(), "mock context creation disabled");
    }
}
