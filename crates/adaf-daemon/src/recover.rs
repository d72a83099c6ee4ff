//! Crash recovery.
//!
//! A session whose recorded pid points at a dead process is marked
//! `aborted`; its spawn worktree (if any) is removed and its socket and
//! pid files are garbage-collected. Run on every daemon startup and on CLI
//! startup for the stale-socket sweep.

use adaf_core::session::SessionStatus;
use adaf_core::spawn::SpawnStatus;
use adaf_core::store::Store;
use adaf_spawn::worktree::WorktreeManager;
use tracing::{info, warn};

use crate::error::DaemonError;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub sessions_aborted: Vec<u64>,
    pub sockets_removed: usize,
    pub worktrees_removed: usize,
}

/// Whether a pid names a live process.
pub fn pid_alive(pid: i32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid), None).is_ok()
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// How long a `starting` session may sit without a claimed pid before it
/// counts as never-came-up.
fn startup_grace() -> chrono::Duration {
    chrono::Duration::seconds(60)
}

pub async fn recover(
    store: &Store,
    worktrees: &WorktreeManager,
    exclude_session: Option<u64>,
) -> Result<RecoveryReport, DaemonError> {
    let mut report = RecoveryReport::default();
    let now = chrono::Utc::now();

    let sessions = store.list_sessions()?;
    for mut session in sessions.records {
        if Some(session.id) == exclude_session {
            continue;
        }
        let dead = match session.status {
            SessionStatus::Starting | SessionStatus::Running | SessionStatus::Stopping => {
                match session.pid {
                    Some(pid) => !pid_alive(pid),
                    // No pid claimed yet: give a fresh fork time to come up.
                    None => now - session.created_at > startup_grace(),
                }
            }
            _ => false,
        };

        if dead {
            info!(session = session.id, "marking dead session aborted");
            session.status = SessionStatus::Aborted;
            session.last_error = "daemon process died".to_string();
            store.update_session(&session)?;
            store.clear_session_signals(session.id)?;
            report.sessions_aborted.push(session.id);

            if let Some(spawn_id) = session.spawn_id {
                abort_spawn(store, worktrees, spawn_id, &mut report).await?;
            }
        }

        // Terminal or dead sessions keep no socket or pid files around.
        let terminal = store.get_session(session.id)?.status.is_terminal();
        if terminal {
            for path in [
                store.session_socket_path(session.id),
                store.session_pid_path(session.id),
            ] {
                if path.exists() && std::fs::remove_file(&path).is_ok() {
                    report.sockets_removed += 1;
                }
            }
        }
    }

    Ok(report)
}

async fn abort_spawn(
    store: &Store,
    worktrees: &WorktreeManager,
    spawn_id: u64,
    report: &mut RecoveryReport,
) -> Result<(), DaemonError> {
    let mut spawn = match store.get_spawn(spawn_id) {
        Ok(spawn) => spawn,
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    if spawn.status.is_terminal() {
        return Ok(());
    }

    spawn.status = SpawnStatus::Failed;
    spawn.error = "hosting session aborted".to_string();

    if !spawn.worktree_path.is_empty() {
        let path = std::path::PathBuf::from(&spawn.worktree_path);
        match worktrees.remove(&path, &spawn.branch).await {
            Ok(()) => {
                report.worktrees_removed += 1;
                spawn.worktree_path.clear();
                spawn.branch.clear();
            }
            Err(err) => warn!(spawn = spawn_id, error = %err, "worktree removal failed"),
        }
    }
    store.update_spawn(&spawn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::pid_alive;

    #[test]
    fn own_pid_is_alive() {
        assert!(pid_alive(std::process::id() as i32));
    }

    #[test]
    fn absurd_pid_is_dead() {
        // PID_MAX on Linux is bounded well below this.
        assert!(!pid_alive(i32::MAX));
    }
}
