#![allow(clippy::expect_used, clippy::unwrap_used)]

use adaf_core::error::StoreError;
use adaf_core::loop_run::{LoopRun, LoopRunStatus, LoopStep};
use adaf_core::project::Project;
use adaf_core::spawn::{Spawn, SpawnStatus};
use adaf_core::store::Store;
use adaf_core::turn::{BuildState, Turn};
use chrono::Utc;

fn init_store(dir: &std::path::Path) -> Store {
    let project = Project::new("demo", dir.to_string_lossy(), Utc::now());
    Store::init(dir, &project).expect("init store")
}

fn blank_turn(session_id: u64) -> Turn {
    Turn {
        id: 0,
        hex_id: String::new(),
        date: Utc::now(),
        agent: "claude".to_string(),
        model: "opus".to_string(),
        profile: "eng".to_string(),
        plan_id: String::new(),
        objective: "fix the build".to_string(),
        outcome: String::new(),
        build_state: BuildState::Unknown,
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
    }
}

#[test]
fn init_twice_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let _store = init_store(dir.path());
    let project = Project::new("demo", dir.path().to_string_lossy(), Utc::now());
    let err = Store::init(dir.path(), &project);
    assert!(matches!(err, Err(StoreError::AlreadyInitialized(_))));
}

#[test]
fn open_requires_init() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(matches!(
        Store::open(dir.path()),
        Err(StoreError::NotInitialized(_))
    ));
    let _store = init_store(dir.path());
    Store::open(dir.path()).expect("open after init");
}

#[test]
fn turn_create_get_update_delete_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());

    let mut turn = blank_turn(1);
    store.create_turn(&mut turn).expect("create");
    assert_eq!(turn.id, 1);
    assert_eq!(turn.hex_id.len(), 8);

    let read = store.get_turn(turn.id).expect("get");
    assert_eq!(read, turn);

    turn.outcome = "done".to_string();
    turn.build_state = BuildState::Passing;
    store.update_turn(&turn).expect("update");
    let read = store.get_turn(turn.id).expect("get updated");
    assert_eq!(read.outcome, "done");
    assert_eq!(read.build_state, BuildState::Passing);
}

#[test]
fn numeric_ids_are_monotonic_and_unique() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());

    let mut ids = Vec::new();
    let mut hexes = Vec::new();
    for _ in 0..5 {
        let mut turn = blank_turn(1);
        store.create_turn(&mut turn).expect("create");
        ids.push(turn.id);
        hexes.push(turn.hex_id.clone());
    }
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    let mut unique = hexes.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), hexes.len(), "short hexes must be unique");
}

#[test]
fn listing_skips_corrupt_records_with_accumulator() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());

    let mut turn = blank_turn(1);
    store.create_turn(&mut turn).expect("create");
    std::fs::write(dir.path().join(".adaf/turns/2.json"), "{broken").expect("write corrupt");

    let listing = store.list_turns().expect("list");
    assert_eq!(listing.records.len(), 1);
    assert_eq!(listing.corrupt.len(), 1);
    assert!(listing.corrupt[0]
        .path
        .to_string_lossy()
        .ends_with("2.json"));
}

#[test]
fn get_unknown_turn_is_not_found_not_io() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    let err = store.get_turn(42).expect_err("missing turn");
    assert!(err.is_not_found(), "want NotFound, got {err}");
}

#[test]
fn loop_run_snapshot_round_trips_with_step_hexes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());

    let mut run = LoopRun {
        id: 0,
        hex_id: String::new(),
        loop_name: "dev-cycle".to_string(),
        status: LoopRunStatus::Running,
        cycle: 0,
        step_index: 0,
        steps: vec![LoopStep {
            profile: "eng".to_string(),
            position: adaf_core::loop_run::Position::Worker,
            role: String::new(),
            turns: 2,
            can_stop: false,
            can_message: false,
            can_pushover: false,
            instructions: String::new(),
            team: String::new(),
            on_fail: adaf_core::loop_run::StepFailurePolicy::Continue,
        }],
        turn_ids: vec![],
        step_hex_ids: Default::default(),
        session_id: 1,
        stop_reason: None,
        started_at: Utc::now(),
        ended_at: None,
    };
    store.create_loop_run(&mut run).expect("create");

    run.turn_ids.push(7);
    run.step_hex_ids
        .insert(LoopRun::step_key(0, 0), "b77a0c11".to_string());
    store.update_loop_run(&run).expect("update");

    let read = store.get_loop_run(run.id).expect("get");
    assert_eq!(read.turn_ids, vec![7]);
    assert_eq!(
        read.step_hex_ids.get("0:0").map(String::as_str),
        Some("b77a0c11")
    );
}

#[test]
fn spawn_round_trip_preserves_legacy_cancel_spelling_on_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());

    let mut spawn = Spawn {
        id: 0,
        parent_turn_id: 3,
        parent_profile: "lead".to_string(),
        child_profile: "reviewer".to_string(),
        child_agent: "claude".to_string(),
        task: "review diff".to_string(),
        role: String::new(),
        team: String::new(),
        parent_worktree: String::new(),
        worktree_path: String::new(),
        branch: String::new(),
        child_session_id: None,
        status: SpawnStatus::Pending,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
        commit_hash: String::new(),
        result: String::new(),
        error: String::new(),
    };
    store.create_spawn(&mut spawn).expect("create");

    // Simulate a record written by an older build using "canceled".
    let path = dir.path().join(format!(".adaf/spawns/{}.json", spawn.id));
    let raw = std::fs::read_to_string(&path).expect("read raw");
    let patched = raw.replace("\"pending\"", "\"canceled\"");
    std::fs::write(&path, patched).expect("write patched");

    let read = store.get_spawn(spawn.id).expect("get");
    assert_eq!(read.status, SpawnStatus::Cancelled);
}
