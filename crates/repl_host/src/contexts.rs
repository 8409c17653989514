use std::sync::Arc;

use exec_context::ContextFactory;
use exec_context_mock::{MockContextFactory, MOCK_CONTEXT_ID};
use exec_context_process::{ProcessContextFactory, PROCESS_CONTEXT_ID};
use repl_session::config::{EnvConfig, INTERPRETER_ENV_VAR};

pub const DEFAULT_CONTEXT_ID: &str = MOCK_CONTEXT_ID;

pub fn context_factory_from_config(
    config: &EnvConfig,
) -> Result<Arc<dyn ContextFactory>, String> {
    context_factory_for_id(
        config.context.as_deref().unwrap_or(DEFAULT_CONTEXT_ID),
        config.interpreter.as_deref(),
    )
}

pub fn context_factory_for_id(
    context_id: &str,
    interpreter: Option<&str>,
) -> Result<Arc<dyn ContextFactory>, String> {
    match context_id {
        MOCK_CONTEXT_ID => Ok(Arc::new(MockContextFactory::new())),
        PROCESS_CONTEXT_ID => {
            let Some(interpreter) = interpreter else {
                return Err(format!(
                    "The '{PROCESS_CONTEXT_ID}' context needs {INTERPRETER_ENV_VAR} to name an interpreter command"
                ));
            };

            let factory = ProcessContextFactory::from_command_line(interpreter)
                .map_err(|error| error.to_string())?;
            Ok(Arc::new(factory))
        }
        unknown => Err(format!(
            "Unsupported execution context '{unknown}'. Available contexts: {MOCK_CONTEXT_ID}, {PROCESS_CONTEXT_ID}"
        )),
    }
}
