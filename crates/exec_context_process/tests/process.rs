#![cfg(unix)]

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use exec_context::{ContextFactory, Environment, ExecRequest, ExecutionContext};
use exec_context_process::ProcessContextFactory;
use serde_json::json;
use tempfile::TempDir;

fn context_for_script(dir: &TempDir, script: &str) -> Arc<dyn ExecutionContext> {
    let path = dir.path().join("interpreter.sh");
    fs::write(&path, script).expect("write interpreter script");

    let factory = ProcessContextFactory::new("sh", vec![path.display().to_string()]);
    match factory.create() {
        Ok(context) => context,
        Err(error) => panic!("create failed: {error}"),
    }
}

fn request(source_text: &str) -> ExecRequest {
    ExecRequest {
        generation: 3,
        is_main_run: false,
        source_text: source_text.to_string(),
        environment_in: [("x", json!(1))].into_iter().collect::<Environment>(),
    }
}

#[test]
fn response_json_from_stdout_is_returned() {
    let dir = TempDir::new().expect("tempdir");
    let context = context_for_script(
        &dir,
        r#"cat > /dev/null
printf '%s' '{"ok":true,"output_text":"hi\n","elapsed_seconds":0.25,"environment_out":{"x":2},"last_value":"2"}'
"#,
    );

    let response = context
        .execute(request("x = 2"), Arc::new(AtomicBool::new(false)))
        .expect("response");

    assert!(response.ok);
    assert_eq!(response.output_text, "hi\n");
    assert_eq!(response.elapsed_seconds, 0.25);
    assert_eq!(response.environment_out.get("x"), Some(&json!(2)));
    assert_eq!(response.last_value.as_deref(), Some("2"));
}

#[test]
fn request_is_written_to_stdin_as_json() {
    let dir = TempDir::new().expect("tempdir");
    let captured = dir.path().join("request.json");
    let context = context_for_script(
        &dir,
        &format!(
            "cat > '{}'\nprintf '%s' '{{\"ok\":true}}'\n",
            captured.display()
        ),
    );

    context
        .execute(request("y = x"), Arc::new(AtomicBool::new(false)))
        .expect("response");

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&captured).expect("captured request"))
            .expect("request is json");
    assert_eq!(written["generation"], json!(3));
    assert_eq!(written["is_main_run"], json!(false));
    assert_eq!(written["source_text"], json!("y = x"));
    assert_eq!(written["environment_in"], json!({ "x": 1 }));
}

#[test]
fn nonzero_exit_is_a_context_error_with_stderr() {
    let dir = TempDir::new().expect("tempdir");
    let context = context_for_script(
        &dir,
        "cat > /dev/null\necho 'interpreter exploded' >&2\nexit 3\n",
    );

    let error = context
        .execute(request("x"), Arc::new(AtomicBool::new(false)))
        .expect_err("failed interpreter");

    assert!(error.contains("exit code 3"), "unexpected error {error:?}");
    assert!(error.contains("interpreter exploded"), "unexpected error {error:?}");
}

#[test]
fn malformed_response_is_a_context_error() {
    let dir = TempDir::new().expect("tempdir");
    let context = context_for_script(&dir, "cat > /dev/null\necho 'not json'\n");

    let error = context
        .execute(request("x"), Arc::new(AtomicBool::new(false)))
        .expect_err("bad json");

    assert!(error.starts_with("Interpreter returned an invalid response"));
}

#[test]
fn cancel_kills_a_running_interpreter() {
    let dir = TempDir::new().expect("tempdir");
    let context = context_for_script(&dir, "cat > /dev/null\nsleep 30\n");
    let cancel = Arc::new(AtomicBool::new(false));

    let worker_cancel = Arc::clone(&cancel);
    let worker_context = Arc::clone(&context);
    let started = Instant::now();
    let worker = thread::spawn(move || worker_context.execute(request("spin"), worker_cancel));

    thread::sleep(Duration::from_millis(100));
    cancel.store(true, Ordering::SeqCst);
    let result = worker.join().expect("worker should not panic");

    assert_eq!(result, Err("execution cancelled".to_string()));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn missing_interpreter_is_reported() {
    let factory = ProcessContextFactory::new("/nonexistent/interpreter", Vec::new());
    let context = match factory.create() {
        Ok(context) => context,
        Err(error) => panic!("create failed: {error}"),
    };

    let error = context
        .execute(request("x"), Arc::new(AtomicBool::new(false)))
        .expect_err("spawn fails");

    assert!(error.starts_with("Failed to launch interpreter /nonexistent/interpreter"));
}

#[test]
fn destroy_kills_a_child_that_never_reads_its_input() {
    let factory = ProcessContextFactory::new("sleep", vec!["30".to_string()]);
    let context = match factory.create() {
        Ok(context) => context,
        Err(error) => panic!("create failed: {error}"),
    };
    let mut large = request("");
    large.source_text = "x".repeat(1024 * 1024);

    let worker_context = Arc::clone(&context);
    let started = Instant::now();
    let worker = thread::spawn(move || {
        worker_context.execute(large, Arc::new(AtomicBool::new(false)))
    });

    thread::sleep(Duration::from_millis(200));
    context.destroy();
    let result = worker.join().expect("worker should not panic");

    assert_eq!(result, Err("execution cancelled".to_string()));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "execute took {:?}",
        started.elapsed()
    );
}
