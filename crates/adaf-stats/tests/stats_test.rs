#![allow(clippy::expect_used, clippy::unwrap_used)]

use adaf_core::loop_run::{LoopRun, LoopRunStatus};
use adaf_core::project::Project;
use adaf_core::spawn::{Spawn, SpawnStatus};
use adaf_core::store::Store;
use adaf_core::turn::{BuildState, Turn};
use adaf_stats::aggregate::StatsAggregator;
use chrono::Utc;

fn init_store(dir: &std::path::Path) -> Store {
    let project = Project::new("demo", dir.to_string_lossy(), Utc::now());
    Store::init(dir, &project).expect("init store")
}

fn seed_run(store: &Store, loop_name: &str) -> LoopRun {
    let mut run = LoopRun {
        id: 0,
        hex_id: String::new(),
        loop_name: loop_name.to_string(),
        status: LoopRunStatus::Completed,
        cycle: 0,
        step_index: 0,
        steps: vec![],
        turn_ids: vec![],
        step_hex_ids: Default::default(),
        session_id: 1,
        stop_reason: None,
        started_at: Utc::now(),
        ended_at: None,
    };
    store.create_loop_run(&mut run).expect("create run");
    run
}

fn seed_turn(
    store: &Store,
    profile: &str,
    build_state: BuildState,
    run: Option<&LoopRun>,
    recording: &[&str],
) -> Turn {
    let mut turn = Turn {
        id: 0,
        hex_id: String::new(),
        date: Utc::now(),
        agent: "claude".to_string(),
        model: "opus".to_string(),
        profile: profile.to_string(),
        plan_id: String::new(),
        objective: String::new(),
        outcome: String::new(),
        build_state,
        commit_hash: String::new(),
        known_issues: vec![],
        duration_seconds: 10,
        session_id: 1,
        loop_run_id: run.map(|r| r.id),
        loop_run_hex_id: run.map(|r| r.hex_id.clone()).unwrap_or_default(),
        step_index: None,
        step_hex_id: String::new(),
        failed: false,
        interrupted: false,
    };
    store.create_turn(&mut turn).expect("create turn");
    if !recording.is_empty() {
        std::fs::write(store.recording_path(turn.id), recording.join("\n"))
            .expect("write recording");
    }
    turn
}

fn seed_spawn(store: &Store, parent_profile: &str, child_profile: &str) -> Spawn {
    let mut spawn = Spawn {
        id: 0,
        parent_turn_id: 1,
        parent_profile: parent_profile.to_string(),
        child_profile: child_profile.to_string(),
        child_agent: "claude".to_string(),
        task: "t".to_string(),
        role: String::new(),
        team: String::new(),
        parent_worktree: String::new(),
        worktree_path: String::new(),
        branch: String::new(),
        child_session_id: None,
        status: SpawnStatus::Completed,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
        commit_hash: String::new(),
        result: String::new(),
        error: String::new(),
    };
    store.create_spawn(&mut spawn).expect("create spawn");
    spawn
}

const RECORDING: &[&str] = &[
    r#"{"type":"content_block_start","content_block":{"type":"tool_use","name":"bash"}}"#,
    r#"{"type":"result","usage":{"input_tokens":100,"output_tokens":40},"total_cost_usd":0.25}"#,
];

#[test]
fn record_turn_updates_profile_and_loop_counters() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    let aggregator = StatsAggregator::new(store.clone());

    let run = seed_run(&store, "dev-cycle");
    let turn = seed_turn(&store, "eng", BuildState::Passing, Some(&run), RECORDING);
    aggregator.record_turn(&turn).expect("record");

    let profile = store
        .read_profile_stats("eng")
        .expect("read")
        .expect("some");
    assert_eq!(profile.counters.runs, 1);
    assert_eq!(profile.counters.successes, 1);
    assert_eq!(profile.counters.failures, 0);
    assert_eq!(profile.counters.duration_seconds, 10);
    assert_eq!(profile.counters.input_tokens, 100);
    assert_eq!(profile.counters.output_tokens, 40);
    assert!((profile.counters.cost_usd - 0.25).abs() < 1e-9);
    assert_eq!(profile.counters.tool_calls.get("bash"), Some(&1));
    assert_eq!(profile.counters.recent_turn_ids, vec![turn.id]);
    assert!(profile.counters.last_run_at.is_some());

    let loop_stats = store
        .read_loop_stats("dev-cycle")
        .expect("read")
        .expect("some");
    assert_eq!(loop_stats.counters.runs, 1);
    assert_eq!(loop_stats.counters.input_tokens, 100);
}

#[test]
fn failed_and_failing_turns_count_as_failures() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    let aggregator = StatsAggregator::new(store.clone());

    let failing = seed_turn(&store, "eng", BuildState::Failing, None, &[]);
    aggregator.record_turn(&failing).expect("record");

    let mut errored = seed_turn(&store, "eng", BuildState::Unknown, None, &[]);
    errored.failed = true;
    store.update_turn(&errored).expect("update");
    aggregator.record_turn(&errored).expect("record");

    let profile = store
        .read_profile_stats("eng")
        .expect("read")
        .expect("some");
    assert_eq!(profile.counters.runs, 2);
    assert_eq!(profile.counters.failures, 2);
    assert_eq!(profile.counters.successes, 0);
}

#[test]
fn record_spawn_tracks_both_sides_of_the_delegation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    let aggregator = StatsAggregator::new(store.clone());

    let spawn = seed_spawn(&store, "lead", "reviewer");
    aggregator.record_spawn(&spawn).expect("record");

    let parent = store
        .read_profile_stats("lead")
        .expect("read")
        .expect("some");
    assert_eq!(parent.counters.spawns_created, 1);

    let child = store
        .read_profile_stats("reviewer")
        .expect("read")
        .expect("some");
    assert_eq!(child.counters.spawned_by.get("lead"), Some(&1));
}

#[test]
fn migrate_from_empty_equals_incremental_accumulation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    let aggregator = StatsAggregator::new(store.clone());

    let run = seed_run(&store, "dev-cycle");
    let turns = vec![
        seed_turn(&store, "eng", BuildState::Passing, Some(&run), RECORDING),
        seed_turn(&store, "eng", BuildState::Failing, Some(&run), &[]),
        seed_turn(&store, "sup", BuildState::Passing, None, &[]),
    ];
    let spawn = seed_spawn(&store, "sup", "eng");

    // Incremental pass.
    for turn in &turns {
        aggregator.record_turn(turn).expect("record");
    }
    aggregator.record_spawn(&spawn).expect("record spawn");
    let incremental_eng = store.read_profile_stats("eng").expect("read").expect("some");
    let incremental_sup = store.read_profile_stats("sup").expect("read").expect("some");
    let incremental_loop = store.read_loop_stats("dev-cycle").expect("read").expect("some");

    // Rebuild from scratch.
    let report = aggregator.migrate().expect("migrate");
    assert_eq!(report.turns_scanned, 3);
    assert_eq!(report.spawns_scanned, 1);

    let migrated_eng = store.read_profile_stats("eng").expect("read").expect("some");
    let migrated_sup = store.read_profile_stats("sup").expect("read").expect("some");
    let migrated_loop = store.read_loop_stats("dev-cycle").expect("read").expect("some");

    assert_eq!(migrated_eng, incremental_eng);
    assert_eq!(migrated_sup, incremental_sup);
    assert_eq!(migrated_loop, incremental_loop);
}

#[test]
fn partial_recording_with_truncation_marker_is_scannable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    let aggregator = StatsAggregator::new(store.clone());

    let recording = [
        r#"{"type":"content_block_start","content_block":{"type":"tool_use","name":"bash"}}"#,
        r#"{"type":"adaf_truncated"}"#,
    ];
    let turn = seed_turn(&store, "eng", BuildState::Unknown, None, &recording);
    aggregator.record_turn(&turn).expect("record");

    let profile = store
        .read_profile_stats("eng")
        .expect("read")
        .expect("some");
    assert_eq!(profile.counters.tool_calls.get("bash"), Some(&1));
}
