#![allow(clippy::expect_used, clippy::unwrap_used)]

//! In-process daemon scenarios: attach, cancel, recovery.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use adaf_core::config::{LoopDef, LoopStepDef, Profile};
use adaf_core::loop_run::Position;
use adaf_core::project::Project;
use adaf_core::session::{Session, SessionStatus};
use adaf_core::store::Store;
use adaf_daemon::bootstrap::DaemonOptions;
use adaf_daemon::daemon::SessionDaemon;
use adaf_daemon::protocol::ClientCommand;
use adaf_daemon::recover::recover;
use adaf_daemon::attach::{resolve_target, AttachClient, AttachTarget};
use adaf_runner::event::RunnerEvent;
use adaf_runner::runner::MockLauncher;
use adaf_spawn::worktree::WorktreeManager;
use chrono::Utc;

fn init_store(dir: &std::path::Path) -> Store {
    let project = Project::new("demo", dir.to_string_lossy(), Utc::now());
    Store::init(dir, &project).expect("init store")
}

fn make_session(store: &Store, dir: &std::path::Path, turns: u32, one_shot: bool) -> Session {
    let mut profiles = BTreeMap::new();
    profiles.insert(
        "eng".to_string(),
        Profile {
            agent: "claude".to_string(),
            model: "opus".to_string(),
            ..Profile::default()
        },
    );
    let mut session = Session {
        id: 0,
        pid: None,
        project_dir: dir.to_string_lossy().to_string(),
        work_dir: dir.to_string_lossy().to_string(),
        plan_id: String::new(),
        profile: "eng".to_string(),
        agent: "claude".to_string(),
        loop_def: LoopDef {
            steps: vec![LoopStepDef {
                profile: "eng".to_string(),
                position: Position::Worker,
                turns,
                ..LoopStepDef::default()
            }],
        },
        loop_name: "dev-cycle".to_string(),
        one_shot,
        profiles,
        teams: BTreeMap::new(),
        pushover: None,
        socket_path: String::new(),
        status: SessionStatus::Starting,
        last_error: String::new(),
        loop_run_id: None,
        spawn_id: None,
        parent_turn_id: None,
        heartbeat_at: None,
        created_at: Utc::now(),
    };
    store.create_session(&mut session).expect("create session");
    session
}

fn slow_launcher(per_turn: Duration) -> MockLauncher {
    let slices = 6u32;
    let lines = (0..slices)
        .map(|i| {
            (
                per_turn / slices,
                format!(r#"{{"type":"content_block_delta","delta":{{"text":"{i}"}}}}"#),
            )
        })
        .collect();
    MockLauncher::with_delays(lines, 0)
}

async fn wait_for_socket(store: &Store, session_id: u64) {
    let path = store.session_socket_path(session_id);
    for _ in 0..300 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("socket never appeared at {path:?}");
}

async fn collect_until_done(client: &mut AttachClient) -> Vec<RunnerEvent> {
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(10), client.next_event()).await {
            Ok(Ok(Some(event))) => {
                let done = matches!(event, RunnerEvent::LoopDone { .. });
                events.push(event);
                if done {
                    return events;
                }
            }
            Ok(Ok(None)) => return events,
            Ok(Err(err)) => panic!("stream error: {err}"),
            Err(_) => panic!("timed out waiting for loop_done"),
        }
    }
}

/// Events with snapshot frames removed (snapshots are per-subscriber).
fn tail(events: &[RunnerEvent]) -> Vec<RunnerEvent> {
    events
        .iter()
        .filter(|e| !matches!(e, RunnerEvent::SessionSnapshot { .. }))
        .cloned()
        .collect()
}

#[tokio::test]
async fn attach_gets_snapshot_first_then_an_ordered_tail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    let session = make_session(&store, dir.path(), 1, true);
    let session_id = session.id;

    let daemon = SessionDaemon::new(store.clone(), DaemonOptions::default())
        .with_launcher(Arc::new(slow_launcher(Duration::from_millis(600))));
    let daemon_task = tokio::spawn(async move { daemon.run(session_id).await });

    wait_for_socket(&store, session_id).await;
    let mut first = AttachClient::connect(&store.session_socket_path(session_id))
        .await
        .expect("connect first");
    let mut second = AttachClient::connect(&store.session_socket_path(session_id))
        .await
        .expect("connect second");

    let first_events = collect_until_done(&mut first).await;
    let second_events = collect_until_done(&mut second).await;
    daemon_task.await.expect("join").expect("daemon run");

    assert!(
        matches!(first_events[0], RunnerEvent::SessionSnapshot { .. }),
        "first frame must be the snapshot, got {:?}",
        first_events[0]
    );
    assert!(matches!(second_events[0], RunnerEvent::SessionSnapshot { .. }));

    // No reordering: one subscriber's tail is a suffix of the other's.
    let a = tail(&first_events);
    let b = tail(&second_events);
    let (longer, shorter) = if a.len() >= b.len() { (&a, &b) } else { (&b, &a) };
    assert!(
        longer.ends_with(shorter),
        "subscriber tails must be suffixes of each other"
    );
    assert!(matches!(a.last(), Some(RunnerEvent::LoopDone { .. })));

    // The socket is gone once the daemon exits.
    assert!(!store.session_socket_path(session_id).exists());
    assert_eq!(
        store.get_session(session_id).expect("session").status,
        SessionStatus::Done
    );
}

#[tokio::test]
async fn cancel_command_shuts_the_run_down() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    // Endless loop: cycles until cancelled.
    let session = make_session(&store, dir.path(), 1, false);
    let session_id = session.id;

    let daemon = SessionDaemon::new(store.clone(), DaemonOptions::default())
        .with_launcher(Arc::new(slow_launcher(Duration::from_millis(300))));
    let daemon_task = tokio::spawn(async move { daemon.run(session_id).await });

    wait_for_socket(&store, session_id).await;
    let mut client = AttachClient::connect(&store.session_socket_path(session_id))
        .await
        .expect("connect");
    client.send(&ClientCommand::Cancel).await.expect("send cancel");

    let events = collect_until_done(&mut client).await;
    daemon_task.await.expect("join").expect("daemon run");

    match events.last().expect("last") {
        RunnerEvent::LoopDone { reason } => {
            assert_eq!(*reason, adaf_core::loop_run::StopReason::Cancelled);
        }
        other => panic!("expected loop_done, got {other:?}"),
    }
    let runs = store.list_loop_runs().expect("runs").records;
    assert_eq!(
        runs[0].status,
        adaf_core::loop_run::LoopRunStatus::Cancelled
    );
}

#[tokio::test]
async fn status_command_yields_a_fresh_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    let session = make_session(&store, dir.path(), 1, true);
    let session_id = session.id;

    let daemon = SessionDaemon::new(store.clone(), DaemonOptions::default())
        .with_launcher(Arc::new(slow_launcher(Duration::from_millis(500))));
    let daemon_task = tokio::spawn(async move { daemon.run(session_id).await });

    wait_for_socket(&store, session_id).await;
    let mut client = AttachClient::connect(&store.session_socket_path(session_id))
        .await
        .expect("connect");
    client.send(&ClientCommand::Status).await.expect("send status");

    let events = collect_until_done(&mut client).await;
    daemon_task.await.expect("join").expect("daemon run");
    let snapshots = events
        .iter()
        .filter(|e| matches!(e, RunnerEvent::SessionSnapshot { .. }))
        .count();
    assert!(snapshots >= 2, "initial snapshot plus the requested one");
}

#[tokio::test]
async fn resolve_target_requires_exactly_one_running_session_for_zero_arg() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());

    // No running sessions.
    assert!(resolve_target(&store, &AttachTarget::SingleRunning).is_err());

    // One running session (alive pid: our own).
    let mut a = make_session(&store, dir.path(), 1, false);
    a.status = SessionStatus::Running;
    a.pid = Some(std::process::id() as i32);
    store.update_session(&a).expect("update");
    let resolved = resolve_target(&store, &AttachTarget::SingleRunning).expect("resolve");
    assert_eq!(resolved.id, a.id);

    // By loop name.
    let by_name =
        resolve_target(&store, &AttachTarget::LoopName("dev-cycle".to_string())).expect("by name");
    assert_eq!(by_name.id, a.id);

    // Two running sessions: ambiguous.
    let mut b = make_session(&store, dir.path(), 1, false);
    b.status = SessionStatus::Running;
    b.pid = Some(std::process::id() as i32);
    store.update_session(&b).expect("update");
    assert!(resolve_target(&store, &AttachTarget::SingleRunning).is_err());

    // Explicit id still resolves.
    let explicit = resolve_target(&store, &AttachTarget::SessionId(b.id)).expect("by id");
    assert_eq!(explicit.id, b.id);
}

#[tokio::test]
async fn recovery_marks_dead_sessions_aborted_and_sweeps_their_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());

    let mut dead = make_session(&store, dir.path(), 1, false);
    dead.status = SessionStatus::Running;
    dead.pid = Some(i32::MAX); // nothing alive has this pid
    store.update_session(&dead).expect("update");
    std::fs::write(store.session_pid_path(dead.id), i32::MAX.to_string()).expect("pid file");
    std::fs::write(store.session_socket_path(dead.id), b"").expect("stale socket");

    let worktrees = WorktreeManager::new(dir.path());
    let report = recover(&store, &worktrees, None).await.expect("recover");

    assert_eq!(report.sessions_aborted, vec![dead.id]);
    assert!(report.sockets_removed >= 1);
    let session = store.get_session(dead.id).expect("session");
    assert_eq!(session.status, SessionStatus::Aborted);
    assert!(!store.session_socket_path(dead.id).exists());

    // Recovery is idempotent.
    let again = recover(&store, &worktrees, None).await.expect("recover again");
    assert!(again.sessions_aborted.is_empty());
}

#[tokio::test]
async fn fresh_starting_session_is_not_reaped_by_recovery() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    let fresh = make_session(&store, dir.path(), 1, false);

    let worktrees = WorktreeManager::new(dir.path());
    let report = recover(&store, &worktrees, None).await.expect("recover");
    assert!(report.sessions_aborted.is_empty());
    assert_eq!(
        store.get_session(fresh.id).expect("session").status,
        SessionStatus::Starting
    );
}
