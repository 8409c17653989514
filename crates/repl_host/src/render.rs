use repl_session::{Environment, LogEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// One printable transcript line, newline-terminated.
pub fn render_entry(entry: &LogEntry) -> (Stream, String) {
    let stream = if entry.is_error() {
        Stream::Stderr
    } else {
        Stream::Stdout
    };

    let mut line = entry.to_string();
    if !line.ends_with('\n') {
        line.push('\n');
    }

    (stream, line)
}

pub fn render_environment(environment: &Environment) -> String {
    if environment.is_empty() {
        return "(no bindings)\n".to_string();
    }

    environment
        .iter()
        .map(|(name, value)| format!("{name} = {value}\n"))
        .collect()
}

pub fn render_history(entries: &[String]) -> String {
    if entries.is_empty() {
        return "(history is empty)\n".to_string();
    }

    entries
        .iter()
        .enumerate()
        .map(|(index, line)| format!("{:>4}  {line}\n", index + 1))
        .collect()
}
