//! Line-oriented driver for one [`SessionController`].
//!
//! Every input (a stdin line, a worker wake-up, Ctrl-C, end of input) arrives
//! as a [`HostInput`] on one channel, so the thread running [`run`] is the
//! only one printing or mutating the session.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use repl_session::{SessionController, SessionError, SourceBuffer};

use crate::commands::{parse_host_command, HostCommand, HELP_TEXT};
use crate::render::{render_entry, render_environment, render_history, Stream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostInput {
    Line(String),
    /// Run results are queued on the controller.
    Wake,
    Interrupt,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct ReplHost<O: Write, E: Write> {
    controller: SessionController,
    out: O,
    err: E,
    printed: usize,
    source_path: Option<PathBuf>,
    export_dir: PathBuf,
}

impl<O: Write, E: Write> ReplHost<O, E> {
    pub fn new(controller: SessionController, out: O, err: E, export_dir: PathBuf) -> Self {
        Self {
            controller,
            out,
            err,
            printed: 0,
            source_path: None,
            export_dir,
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn into_writers(self) -> (O, E) {
        (self.out, self.err)
    }

    pub fn handle(&mut self, input: HostInput) -> io::Result<Flow> {
        match input {
            HostInput::Line(line) => self.handle_line(&line),
            HostInput::Wake => {
                self.print_new_entries()?;
                Ok(Flow::Continue)
            }
            HostInput::Interrupt => {
                if !self.controller.abort() {
                    writeln!(self.err, "No run in flight. Use :quit to exit.")?;
                }
                self.print_new_entries()?;
                Ok(Flow::Continue)
            }
            HostInput::Eof => Ok(Flow::Quit),
        }
    }

    /// Applies queued run results and prints entries not shown yet.
    pub fn print_new_entries(&mut self) -> io::Result<()> {
        self.controller.flush_pending_events();
        let log = self.controller.snapshot().log;
        if log.len() < self.printed {
            self.printed = 0;
        }

        for entry in log.entries_since(self.printed) {
            match render_entry(entry) {
                (Stream::Stdout, line) => self.out.write_all(line.as_bytes())?,
                (Stream::Stderr, line) => self.err.write_all(line.as_bytes())?,
            }
        }

        self.printed = log.len();
        self.out.flush()?;
        self.err.flush()
    }

    fn handle_line(&mut self, line: &str) -> io::Result<Flow> {
        if let Some(command) = parse_host_command(line) {
            return self.handle_command(command);
        }

        if line.trim().is_empty() {
            return Ok(Flow::Continue);
        }

        let result = self.controller.run_terminal_line(line);
        self.report_dispatch(result)?;
        Ok(Flow::Continue)
    }

    fn handle_command(&mut self, command: HostCommand) -> io::Result<Flow> {
        match command {
            HostCommand::Open(path) => self.open(Path::new(&path))?,
            HostCommand::Append(code) => {
                let mut text = self.controller.source().text().to_string();
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&code);
                self.controller.set_source_text(text);
            }
            HostCommand::Source => {
                let source = self.controller.source();
                let marker = if source.is_dirty() { " (modified)" } else { "" };
                let title = if source.title().is_empty() {
                    "untitled"
                } else {
                    source.title()
                };
                writeln!(self.out, "-- {title}{marker} --")?;
                writeln!(self.out, "{}", source.text())?;
            }
            HostCommand::New => {
                self.controller.clear_source();
            }
            HostCommand::Run => {
                let result = self.controller.run_program();
                self.report_dispatch(result)?;
            }
            HostCommand::Save => self.save()?,
            HostCommand::Export => self.export()?,
            HostCommand::Abort => {
                if !self.controller.abort() {
                    writeln!(self.err, "No run in flight.")?;
                }
                self.print_new_entries()?;
            }
            HostCommand::Clear => match self.controller.clear() {
                Ok(()) => self.printed = 0,
                Err(error) => writeln!(self.err, "{error}")?,
            },
            HostCommand::History => {
                let history = self.controller.history();
                self.out.write_all(render_history(&history).as_bytes())?;
            }
            HostCommand::Prev => self.show_recalled(self.controller.recall_previous())?,
            HostCommand::Next => self.show_recalled(self.controller.recall_next())?,
            HostCommand::Env => {
                let environment = self.controller.snapshot().environment;
                self.out
                    .write_all(render_environment(&environment).as_bytes())?;
            }
            HostCommand::Help => writeln!(self.out, "{HELP_TEXT}")?,
            HostCommand::Quit => return Ok(Flow::Quit),
            HostCommand::MissingArgument(command) => {
                writeln!(self.err, "{command} needs an argument. See :help.")?;
            }
            HostCommand::Unknown(command) => {
                writeln!(self.err, "Unknown command {command}. See :help.")?;
            }
        }

        self.out.flush()?;
        Ok(Flow::Continue)
    }

    fn report_dispatch<T>(&mut self, result: Result<T, SessionError>) -> io::Result<()> {
        if let Err(error) = result {
            // Start failures are already in the transcript.
            if error.is_rejection() {
                writeln!(self.err, "{error}")?;
            }
        }

        self.print_new_entries()
    }

    fn show_recalled(&mut self, recalled: Option<String>) -> io::Result<()> {
        match recalled {
            Some(line) if line.is_empty() => writeln!(self.out, "(draft)"),
            Some(line) => writeln!(self.out, "{line}"),
            None => writeln!(self.err, "(no further history)"),
        }
    }

    fn open(&mut self, path: &Path) -> io::Result<()> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) => {
                writeln!(self.err, "Failed to open {}: {error}", path.display())?;
                return Ok(());
            }
        };

        let title = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.controller.open_source(SourceBuffer::loaded(
            path.display().to_string(),
            title.as_str(),
            text,
        ));
        tracing::debug!(path = %path.display(), "source opened");
        self.source_path = Some(path.to_path_buf());
        self.printed = 0;
        writeln!(self.out, "Opened {title}.")
    }

    fn save(&mut self) -> io::Result<()> {
        let source = self.controller.source();
        let Some(path) = self.source_path.clone() else {
            return writeln!(self.err, "Nothing to save: the source was not opened from a file.");
        };

        if !source.can_save() {
            return writeln!(self.out, "No unsaved changes.");
        }

        match fs::write(&path, source.text()) {
            Ok(()) => {
                self.controller.mark_saved();
                writeln!(self.out, "Saved {}.", path.display())
            }
            Err(error) => writeln!(self.err, "Failed to save {}: {error}", path.display()),
        }
    }

    fn export(&mut self) -> io::Result<()> {
        let source = self.controller.source();
        let path = self.export_dir.join(source.export_file_name());
        match fs::write(&path, source.text()) {
            Ok(()) => writeln!(self.out, "Exported to {}.", path.display()),
            Err(error) => writeln!(self.err, "Failed to export {}: {error}", path.display()),
        }
    }
}

/// Drives `host` until `:quit`, or until input ends and no run is in flight.
pub fn run<O: Write, E: Write>(
    host: &mut ReplHost<O, E>,
    inputs: Receiver<HostInput>,
) -> io::Result<()> {
    let mut input_closed = false;
    for input in inputs {
        if input == HostInput::Eof {
            input_closed = true;
        } else if host.handle(input)? == Flow::Quit {
            break;
        }

        if input_closed && !host.controller().is_running() {
            host.print_new_entries()?;
            break;
        }
    }

    host.controller().shutdown();
    Ok(())
}
