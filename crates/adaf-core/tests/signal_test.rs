#![allow(clippy::expect_used, clippy::unwrap_used)]

use adaf_core::loop_run::{LoopRun, LoopRunStatus};
use adaf_core::project::Project;
use adaf_core::signal::InterruptKind;
use adaf_core::store::Store;
use adaf_core::turn::Turn;
use chrono::Utc;

fn init_store(dir: &std::path::Path) -> Store {
    let project = Project::new("demo", dir.to_string_lossy(), Utc::now());
    Store::init(dir, &project).expect("init store")
}

fn seed_run(store: &Store, session_id: u64) -> LoopRun {
    let mut run = LoopRun {
        id: 0,
        hex_id: String::new(),
        loop_name: "dev-cycle".to_string(),
        status: LoopRunStatus::Running,
        cycle: 0,
        step_index: 0,
        steps: vec![],
        turn_ids: vec![],
        step_hex_ids: Default::default(),
        session_id,
        stop_reason: None,
        started_at: Utc::now(),
        ended_at: None,
    };
    store.create_loop_run(&mut run).expect("create run");
    run
}

fn seed_turn(store: &Store, session_id: u64) -> Turn {
    let mut turn = Turn {
        id: 0,
        hex_id: String::new(),
        date: Utc::now(),
        agent: "claude".to_string(),
        model: "opus".to_string(),
        profile: "eng".to_string(),
        plan_id: String::new(),
        objective: String::new(),
        outcome: String::new(),
        build_state: Default::default(),
        commit_hash: String::new(),
        known_issues: vec![],
        duration_seconds: 0,
        session_id,
        loop_run_id: None,
        loop_run_hex_id: String::new(),
        step_index: None,
        step_hex_id: String::new(),
        failed: false,
        interrupted: false,
    };
    store.create_turn(&mut turn).expect("create turn");
    turn
}

#[test]
fn stop_marker_is_idempotent_and_observable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    let run = seed_run(&store, 9);

    assert!(!store.is_loop_stopped(run.id).expect("check"));
    store.signal_loop_stop(run.id).expect("signal");
    store.signal_loop_stop(run.id).expect("signal again");
    assert!(store.is_loop_stopped(run.id).expect("check"));
}

#[test]
fn call_supervisor_marker_carries_payload_and_posts_message() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    let run = seed_run(&store, 9);

    store
        .signal_loop_call_supervisor(run.id, 1, 2, "scope unclear")
        .expect("signal");

    let signal = store
        .pending_call_supervisor(9)
        .expect("pending")
        .expect("some");
    assert_eq!(signal.from_step, 1);
    assert_eq!(signal.to_step, 2);
    assert_eq!(signal.content, "scope unclear");

    let messages = store.list_loop_messages(run.id).expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].step_index, 1);
    assert_eq!(messages[0].content, "scope unclear");

    store.clear_call_supervisor(9).expect("clear");
    assert!(store.pending_call_supervisor(9).expect("pending").is_none());
}

#[test]
fn interrupt_markers_are_per_turn_and_user_abort_wins() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    let turn = seed_turn(&store, 5);
    let other = seed_turn(&store, 5);

    store
        .signal_interrupt(turn.id, InterruptKind::CallSupervisor)
        .expect("signal");
    assert_eq!(
        store.pending_interrupt(5, turn.id).expect("pending"),
        Some(InterruptKind::CallSupervisor)
    );
    assert_eq!(store.pending_interrupt(5, other.id).expect("pending"), None);

    store
        .signal_interrupt(turn.id, InterruptKind::UserAbort)
        .expect("signal abort");
    assert_eq!(
        store.pending_interrupt(5, turn.id).expect("pending"),
        Some(InterruptKind::UserAbort)
    );

    store
        .clear_interrupts_for_turn(5, turn.id)
        .expect("clear");
    assert_eq!(store.pending_interrupt(5, turn.id).expect("pending"), None);
}

#[test]
fn clearing_session_signals_removes_the_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    let run = seed_run(&store, 9);
    store.signal_loop_stop(run.id).expect("signal");

    store.clear_session_signals(9).expect("clear");
    assert!(!store.session_signal_dir(9).exists());
    // Clearing again is fine.
    store.clear_session_signals(9).expect("clear again");
}
