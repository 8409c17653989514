#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Open(String),
    Append(String),
    Source,
    New,
    Run,
    Save,
    Export,
    Abort,
    Clear,
    History,
    Prev,
    Next,
    Env,
    Help,
    Quit,
    MissingArgument(&'static str),
    Unknown(String),
}

pub const COMMAND_PREFIX: char = ':';

/// Parses a `:command`. Returns `None` for ordinary terminal input.
pub fn parse_host_command(input: &str) -> Option<HostCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with(COMMAND_PREFIX) {
        return None;
    }

    let (command, argument) = match trimmed.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (trimmed, ""),
    };

    let parsed = match command {
        ":open" if argument.is_empty() => HostCommand::MissingArgument(":open"),
        ":open" => HostCommand::Open(argument.to_string()),
        ":append" if argument.is_empty() => HostCommand::MissingArgument(":append"),
        ":append" => HostCommand::Append(argument.to_string()),
        ":source" => HostCommand::Source,
        ":new" => HostCommand::New,
        ":run" => HostCommand::Run,
        ":save" => HostCommand::Save,
        ":export" => HostCommand::Export,
        ":abort" => HostCommand::Abort,
        ":clear" => HostCommand::Clear,
        ":history" => HostCommand::History,
        ":prev" => HostCommand::Prev,
        ":next" => HostCommand::Next,
        ":env" => HostCommand::Env,
        ":help" => HostCommand::Help,
        ":quit" | ":q" => HostCommand::Quit,
        _ => HostCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}

pub const HELP_TEXT: &str = "\
Commands:
  :open <path>     load a program file (drops the transcript and bindings)
  :append <code>   append a line to the program source
  :source          show the program source
  :new             empty the program source
  :run             run the whole program
  :save            write the program back to its file
  :export          write the program to <title>.txt in the export directory
  :abort           abort the running program (Ctrl-C does the same)
  :clear           clear the transcript and bindings
  :history         list submitted terminal lines
  :prev, :next     recall terminal history
  :env             show terminal bindings
  :help            show this help
  :quit            exit
Any other line runs in the terminal.";
