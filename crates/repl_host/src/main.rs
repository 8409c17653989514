use std::io::{self, BufRead};
use std::sync::mpsc::{self, Sender};
use std::thread;

use repl_host::contexts::context_factory_from_config;
use repl_host::host::{self, HostInput, ReplHost};
use repl_session::{logging, EnvConfig, SessionController};

fn main() -> io::Result<()> {
    let config = EnvConfig::from_env().map_err(io::Error::other)?;
    logging::init(config.log_filter.as_deref());

    let factory = context_factory_from_config(&config).map_err(io::Error::other)?;
    tracing::debug!(
        context = config.context.as_deref().unwrap_or(repl_host::contexts::DEFAULT_CONTEXT_ID),
        run_timeout = ?config.run_timeout,
        "repl host starting"
    );
    let (sender, inputs) = mpsc::channel();

    let wake_sender = sender.clone();
    let controller = SessionController::with_waker(factory, config.session_config(), move || {
        let _ = wake_sender.send(HostInput::Wake);
    });

    spawn_stdin_reader(sender.clone())?;
    #[cfg(unix)]
    let _signals = install_interrupt_handler(sender)?;

    let export_dir = std::env::current_dir()?;
    let mut repl = ReplHost::new(controller, io::stdout(), io::stderr(), export_dir);
    host::run(&mut repl, inputs)
}

fn spawn_stdin_reader(sender: Sender<HostInput>) -> io::Result<()> {
    thread::Builder::new()
        .name("repl-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };

                if sender.send(HostInput::Line(line)).is_err() {
                    return;
                }
            }

            let _ = sender.send(HostInput::Eof);
        })?;

    Ok(())
}

#[cfg(unix)]
struct InterruptGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(unix)]
fn install_interrupt_handler(sender: Sender<HostInput>) -> io::Result<InterruptGuard> {
    use signal_hook::consts::SIGINT;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT])?;
    let handle = signals.handle();
    let thread = thread::Builder::new()
        .name("repl-sigint".to_string())
        .spawn(move || {
            for _ in signals.forever() {
                if sender.send(HostInput::Interrupt).is_err() {
                    break;
                }
            }
        })?;

    Ok(InterruptGuard {
        handle,
        thread: Some(thread),
    })
}
