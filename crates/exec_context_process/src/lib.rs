//! Execution contexts backed by an external interpreter process.
//!
//! Each request spawns the configured command, writes the request as one JSON
//! document to its stdin, and reads one JSON [`ExecResponse`] from its stdout.
//! Cancelling or destroying the context kills the child.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use exec_context::{
    CancelSignal, ContextFactory, ContextInitError, ExecRequest, ExecResponse, ExecutionContext,
};
use wait_timeout::ChildExt;

pub const PROCESS_CONTEXT_ID: &str = "process";

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const CANCELLED_ERROR: &str = "execution cancelled";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessContextFactory {
    program: String,
    args: Vec<String>,
}

impl ProcessContextFactory {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a whitespace-separated command line into program and arguments.
    pub fn from_command_line(command_line: &str) -> Result<Self, ContextInitError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            return Err(ContextInitError::new("interpreter command line is empty"));
        };

        Ok(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl ContextFactory for ProcessContextFactory {
    fn create(&self) -> Result<Arc<dyn ExecutionContext>, ContextInitError> {
        if self.program.trim().is_empty() {
            return Err(ContextInitError::new("interpreter program is empty"));
        }

        Ok(Arc::new(ProcessContext {
            program: self.program.clone(),
            args: self.args.clone(),
            destroyed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
pub struct ProcessContext {
    program: String,
    args: Vec<String>,
    destroyed: AtomicBool,
}

impl ProcessContext {
    fn is_stopped(&self, cancel: &CancelSignal) -> bool {
        cancel.load(Ordering::SeqCst) || self.destroyed.load(Ordering::SeqCst)
    }

    fn spawn(&self) -> Result<Child, String> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| format!("Failed to launch interpreter {}: {error}", self.program))
    }

    fn wait(&self, child: &mut Child, cancel: &CancelSignal) -> Result<ExitStatus, String> {
        loop {
            if self.is_stopped(cancel) {
                kill_and_reap(child);
                return Err(CANCELLED_ERROR.to_string());
            }

            match child.wait_timeout(POLL_INTERVAL) {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(error) => {
                    kill_and_reap(child);
                    return Err(format!("Failed waiting for interpreter: {error}"));
                }
            }
        }
    }
}

impl ExecutionContext for ProcessContext {
    fn execute(&self, req: ExecRequest, cancel: CancelSignal) -> Result<ExecResponse, String> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err("execution context destroyed".to_string());
        }

        let payload = serde_json::to_vec(&req)
            .map_err(|error| format!("Failed to encode request: {error}"))?;

        let mut child = self.spawn()?;
        tracing::debug!(
            program = %self.program,
            generation = req.generation,
            pid = child.id(),
            "interpreter spawned"
        );

        let stdout = spawn_pipe_reader(child.stdout.take());
        let stderr = spawn_pipe_reader(child.stderr.take());

        // Never joined: a child that ignores stdin can hold the pipe open
        // until it is killed.
        spawn_stdin_writer(child.stdin.take(), payload);

        let status = self.wait(&mut child, &cancel)?;
        let stdout = join_pipe_reader(stdout);
        let stderr = join_pipe_reader(stderr);

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(format!(
                "Interpreter exited with {}: {}",
                format_exit_status(status),
                stderr.trim()
            ));
        }

        serde_json::from_slice::<ExecResponse>(&stdout)
            .map_err(|error| format!("Interpreter returned an invalid response: {error}"))
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_stdin_writer<W>(pipe: Option<W>, mut payload: Vec<u8>)
where
    W: Write + Send + 'static,
{
    let Some(mut pipe) = pipe else {
        return;
    };

    payload.push(b'\n');
    let spawned = thread::Builder::new()
        .name("repl-interpreter-stdin".to_string())
        .spawn(move || {
            // A child that exits without reading its input is reported by its status.
            if let Err(error) = pipe.write_all(&payload) {
                tracing::debug!(%error, "interpreter closed stdin early");
            }
        });

    if let Err(error) = spawned {
        tracing::warn!(%error, "failed to spawn interpreter stdin writer");
    }
}

fn spawn_pipe_reader<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    let mut pipe = pipe?;
    thread::Builder::new()
        .name("repl-interpreter-pipe".to_string())
        .spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            bytes
        })
        .ok()
}

fn join_pipe_reader(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default()
}

fn format_exit_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_is_split_on_whitespace() {
        let factory =
            ProcessContextFactory::from_command_line("  python3  -m scope.repl ").expect("parse");

        assert_eq!(factory.program(), "python3");
        assert_eq!(factory.args(), ["-m", "scope.repl"]);
    }

    #[test]
    fn empty_command_line_is_rejected() {
        let error = ProcessContextFactory::from_command_line("   ").expect_err("empty");
        assert_eq!(error.message(), "interpreter command line is empty");
    }

    #[cfg(unix)]
    #[test]
    fn killed_child_is_reaped() {
        let mut child = Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");

        kill_and_reap(&mut child);

        let status = child.try_wait().expect("try_wait");
        assert!(status.is_some_and(|status| !status.success()));
    }

    #[test]
    fn destroyed_context_refuses_requests() {
        let context = match ProcessContextFactory::new("sh", Vec::new()).create() {
            Ok(context) => context,
            Err(error) => panic!("create failed: {error}"),
        };
        context.destroy();

        let result = context.execute(
            ExecRequest {
                generation: 0,
                is_main_run: true,
                source_text: String::new(),
                environment_in: Default::default(),
            },
            Arc::new(AtomicBool::new(false)),
        );

        assert_eq!(result, Err("execution context destroyed".to_string()));
    }
}
