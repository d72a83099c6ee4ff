//! The session daemon: one loop controller, one unix socket, any number of
//! subscribers.
//!
//! Lifecycle: claim the pid file, bind the socket, run the controller, fan
//! events out, accept cancel/status commands, then persist the final
//! session status and unlink the socket.

use std::sync::Arc;

use adaf_core::session::SessionStatus;
use adaf_core::store::Store;
use adaf_loop::controller::LoopController;
use adaf_runner::event::RunnerEvent;
use adaf_runner::runner::{AgentLauncher, ProcessLauncher, TurnRunner};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bootstrap::DaemonOptions;
use crate::error::DaemonError;
use crate::fanout::FanOut;
use crate::protocol::{snapshot_event, ClientCommand};
use crate::recover::pid_alive;

pub struct SessionDaemon {
    store: Store,
    options: DaemonOptions,
    launcher: Arc<dyn AgentLauncher>,
}

impl SessionDaemon {
    pub fn new(store: Store, options: DaemonOptions) -> Self {
        Self {
            store,
            options,
            launcher: Arc::new(ProcessLauncher),
        }
    }

    /// Replace the agent launcher (tests).
    pub fn with_launcher(mut self, launcher: Arc<dyn AgentLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Host one session to completion.
    pub async fn run(&self, session_id: u64) -> Result<(), DaemonError> {
        let mut session = self.store.get_session(session_id)?;
        self.claim_pid(session_id)?;

        let socket_path = self.store.session_socket_path(session_id);
        let _ = std::fs::remove_file(&socket_path);
        let listener = UnixListener::bind(&socket_path)
            .map_err(|e| DaemonError::io(format!("bind {socket_path:?}"), e))?;

        session.pid = Some(std::process::id() as i32);
        session.socket_path = socket_path.to_string_lossy().to_string();
        session.heartbeat_at = Some(Utc::now());
        self.store.update_session(&session)?;
        info!(session = session_id, "daemon up");

        let cancel = CancellationToken::new();
        let fanout = FanOut::new(self.options.fanout_capacity, self.options.overflow_policy);

        spawn_signal_handler(cancel.clone());
        let heartbeat = tokio::spawn(heartbeat_loop(
            self.store.clone(),
            session_id,
            self.options.heartbeat_interval,
            cancel.clone(),
        ));

        let (events_tx, mut events_rx) = mpsc::channel::<RunnerEvent>(1024);
        let runner = TurnRunner::new(self.store.clone(), Arc::clone(&self.launcher));
        let controller = LoopController::new(
            self.store.clone(),
            session.clone(),
            runner,
            events_tx,
            cancel.clone(),
        );
        let controller_task = tokio::spawn(controller.run());

        let pump_fanout = Arc::clone(&fanout);
        let pump = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                pump_fanout.publish(&event).await;
            }
        });

        let accept = tokio::spawn(accept_loop(
            listener,
            self.store.clone(),
            session_id,
            Arc::clone(&fanout),
            cancel.clone(),
        ));

        let controller_result = controller_task.await;
        // The controller dropped its sender; the pump drains what is left.
        let _ = pump.await;
        accept.abort();
        heartbeat.abort();

        let _ = std::fs::remove_file(&socket_path);
        let _ = std::fs::remove_file(self.store.session_pid_path(session_id));

        // A spawn session reports its outcome back onto the spawn record.
        if let Some(spawn_id) = session.spawn_id {
            self.finalize_spawn(&session, spawn_id, &controller_result)
                .await;
        }

        match controller_result {
            Ok(Ok(reason)) => {
                // The heartbeat task may have raced the controller's final
                // status write with a stale record; make the terminal
                // status authoritative.
                let mut session = self.store.get_session(session_id)?;
                let expected = match reason {
                    adaf_core::loop_run::StopReason::Failed => SessionStatus::Failed,
                    _ => SessionStatus::Done,
                };
                if session.status != expected {
                    session.status = expected;
                    self.store.update_session(&session)?;
                }
                info!(session = session_id, reason = %reason, "daemon done");
                Ok(())
            }
            Ok(Err(err)) => Err(err.into()),
            Err(join_err) => {
                // Controller panic: the session record still says running.
                let mut session = self.store.get_session(session_id)?;
                session.status = SessionStatus::Failed;
                session.last_error = format!("controller panicked: {join_err}");
                self.store.update_session(&session)?;
                Err(DaemonError::io(
                    "controller task",
                    std::io::Error::other(join_err),
                ))
            }
        }
    }

    /// Write the one-shot run's outcome onto the spawn record that created
    /// this session, honoring the terminal-worktree rule: a completed
    /// spawn keeps its branch but loses its checkout directory.
    async fn finalize_spawn(
        &self,
        session: &adaf_core::session::Session,
        spawn_id: u64,
        controller_result: &Result<
            Result<adaf_core::loop_run::StopReason, adaf_loop::LoopError>,
            tokio::task::JoinError,
        >,
    ) {
        let Ok(mut spawn) = self.store.get_spawn(spawn_id) else {
            return;
        };
        if spawn.status.is_terminal() {
            return;
        }

        use adaf_core::loop_run::StopReason;
        use adaf_core::spawn::SpawnStatus;
        let worktrees = adaf_spawn::worktree::WorktreeManager::new(&session.project_dir);
        let path = std::path::PathBuf::from(&spawn.worktree_path);

        match controller_result {
            Ok(Ok(StopReason::Completed | StopReason::Stopped)) => {
                spawn.status = SpawnStatus::Completed;
                spawn.result = self.last_turn_outcome(session).unwrap_or_default();
                if worktrees.remove_dir(&path).await.is_ok() {
                    spawn.worktree_path.clear();
                }
            }
            Ok(Ok(StopReason::Cancelled)) => {
                spawn.status = SpawnStatus::Cancelled;
                if worktrees.remove(&path, &spawn.branch).await.is_ok() {
                    spawn.worktree_path.clear();
                    spawn.branch.clear();
                }
            }
            Ok(Ok(StopReason::Failed)) | Ok(Err(_)) | Err(_) => {
                spawn.status = SpawnStatus::Failed;
                spawn.error = match controller_result {
                    Ok(Err(err)) => err.to_string(),
                    Err(join_err) => join_err.to_string(),
                    _ => "run failed".to_string(),
                };
                if worktrees.remove(&path, &spawn.branch).await.is_ok() {
                    spawn.worktree_path.clear();
                    spawn.branch.clear();
                }
            }
        }
        spawn.completed_at = Some(Utc::now());
        if let Err(err) = self.store.update_spawn(&spawn) {
            warn!(spawn = spawn_id, error = %err, "spawn finalization failed");
        }
    }

    /// Outcome text of the run's last turn, used as the spawn result.
    fn last_turn_outcome(&self, session: &adaf_core::session::Session) -> Option<String> {
        let session = self.store.get_session(session.id).ok()?;
        let run = self.store.get_loop_run(session.loop_run_id?).ok()?;
        let turn = self.store.get_turn(*run.turn_ids.last()?).ok()?;
        if turn.outcome.is_empty() {
            None
        } else {
            Some(turn.outcome)
        }
    }

    /// Claim `sessions/<id>.pid`. A live claimant wins; a stale file is
    /// replaced.
    fn claim_pid(&self, session_id: u64) -> Result<(), DaemonError> {
        let path = self.store.session_pid_path(session_id);
        if let Ok(raw) = std::fs::read_to_string(&path) {
            if let Ok(pid) = raw.trim().parse::<i32>() {
                if pid != std::process::id() as i32 && pid_alive(pid) {
                    return Err(DaemonError::AlreadyRunning(session_id, pid));
                }
            }
        }
        std::fs::write(&path, std::process::id().to_string())
            .map_err(|e| DaemonError::io(format!("write pid file {path:?}"), e))
    }
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        let mut int = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = term.recv() => {}
            _ = int.recv() => {}
        }
        info!("shutdown signal received");
        cancel.cancel();
    });
}

async fn heartbeat_loop(
    store: Store,
    session_id: u64,
    interval: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let Ok(mut session) = store.get_session(session_id) else {
                    return;
                };
                session.heartbeat_at = Some(Utc::now());
                if store.update_session(&session).is_err() {
                    return;
                }
            }
        }
    }
}

async fn accept_loop(
    listener: UnixListener,
    store: Store,
    session_id: u64,
    fanout: Arc<FanOut>,
    cancel: CancellationToken,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                tokio::spawn(handle_client(
                    stream,
                    store.clone(),
                    session_id,
                    Arc::clone(&fanout),
                    cancel.clone(),
                ));
            }
            Err(err) => {
                warn!(error = %err, "accept failed");
                return;
            }
        }
    }
}

/// One task per subscriber: snapshot first, then the live tail, while
/// reading commands off the same connection.
async fn handle_client(
    stream: UnixStream,
    store: Store,
    session_id: u64,
    fanout: Arc<FanOut>,
    cancel: CancellationToken,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half).lines();

    if write_snapshot(&store, session_id, &mut write_half)
        .await
        .is_err()
    {
        return;
    }
    let mut events = fanout.subscribe().await;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { return };
                if write_event(&mut write_half, &event).await.is_err() {
                    return;
                }
            }
            line = reader.next_line() => {
                let Ok(Some(line)) = line else { return };
                match serde_json::from_str::<ClientCommand>(&line) {
                    Ok(ClientCommand::Cancel) => {
                        info!(session = session_id, "cancel requested by subscriber");
                        cancel.cancel();
                    }
                    Ok(ClientCommand::Status) => {
                        if write_snapshot(&store, session_id, &mut write_half).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "bad command line ignored");
                    }
                }
            }
        }
    }
}

async fn write_snapshot(
    store: &Store,
    session_id: u64,
    write_half: &mut tokio::net::unix::OwnedWriteHalf,
) -> Result<(), ()> {
    let Ok(session) = store.get_session(session_id) else {
        return Err(());
    };
    let (cycle, step_index) = match session.loop_run_id.and_then(|id| store.get_loop_run(id).ok()) {
        Some(run) => (run.cycle, run.step_index),
        None => (0, 0),
    };
    write_event(write_half, &snapshot_event(&session, cycle, step_index)).await
}

async fn write_event(
    write_half: &mut tokio::net::unix::OwnedWriteHalf,
    event: &RunnerEvent,
) -> Result<(), ()> {
    let Ok(mut line) = event.to_ndjson() else {
        return Err(());
    };
    line.push('\n');
    write_half.write_all(line.as_bytes()).await.map_err(|_| ())
}
