mod support;

use pretty_assertions::assert_eq;
use repl_session::output::{BANNER_ABORTED, BANNER_RUNNING};
use repl_session::{LogEntry, SessionConfig, SessionController};
use support::{wait_for, Behavior, ScriptedFactory, WAIT};

#[test]
fn late_result_after_abort_is_dropped() {
    let factory = ScriptedFactory::new(Behavior::Gated);
    let controller = SessionController::new(factory.as_factory(), SessionConfig::default());

    let generation = controller.run_terminal_line("spin").expect("dispatch");
    assert!(wait_for(WAIT, || factory.requests().len() == 1));

    assert!(controller.abort());
    let after_abort = controller.snapshot();
    assert_eq!(after_abort.generation, generation + 1);
    assert!(!after_abort.run_in_flight);
    assert_eq!(
        after_abort.log.entries(),
        &[
            LogEntry::banner(BANNER_RUNNING),
            LogEntry::echo("spin"),
            LogEntry::banner(BANNER_ABORTED),
        ]
    );

    factory.open_gate();
    assert!(wait_for(WAIT, || controller.flush_pending_events() > 0));

    assert_eq!(controller.snapshot(), after_abort);
    assert!(controller.snapshot().environment.get("late").is_none());
}

#[test]
fn abort_is_idempotent() {
    let factory = ScriptedFactory::new(Behavior::Gated);
    let controller = SessionController::new(factory.as_factory(), SessionConfig::default());
    controller.run_terminal_line("spin").expect("dispatch");

    assert!(controller.abort());
    let first = controller.snapshot();
    assert!(!controller.abort());

    assert_eq!(controller.snapshot(), first);
    assert_eq!(factory.destroyed_count(), 1);
    factory.open_gate();
}

#[test]
fn generation_never_decreases_across_aborts() {
    let factory = ScriptedFactory::new(Behavior::Gated);
    let controller = SessionController::new(factory.as_factory(), SessionConfig::default());

    let mut last = controller.snapshot().generation;
    for _ in 0..3 {
        controller.run_terminal_line("spin").expect("dispatch");
        controller.abort();
        let current = controller.snapshot().generation;
        assert!(current > last);
        last = current;
    }

    assert_eq!(factory.created_count(), 3);
    assert_eq!(factory.destroyed_count(), 3);
    factory.open_gate();
}

#[test]
fn next_run_after_abort_gets_a_fresh_context() {
    let factory = ScriptedFactory::new(Behavior::Gated);
    let controller = SessionController::new(factory.as_factory(), SessionConfig::default());

    let aborted = controller.run_terminal_line("first").expect("dispatch");
    controller.abort();
    factory.open_gate();
    let current = controller.run_terminal_line("second").expect("dispatch after abort");
    assert!(controller.wait_until_idle(WAIT));

    assert_eq!(factory.created_count(), 2);
    assert!(wait_for(WAIT, || factory.requests().len() == 2));
    let requests = factory.requests();
    assert!(requests.iter().any(|request| request.generation == aborted));
    assert!(requests.iter().any(|request| request.generation == current));

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.log.last(), Some(&LogEntry::text(true, "1")));
    assert_eq!(
        snapshot
            .log
            .entries()
            .iter()
            .filter(|entry| **entry == LogEntry::text(true, "late output"))
            .count(),
        1
    );
}
