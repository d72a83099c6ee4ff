//! Forking detached session daemons.

use adaf_core::session::{Session, SessionStatus};
use adaf_core::store::Store;
use tracing::info;

use crate::error::DaemonError;

/// Fork a detached daemon process for a session. The child claims its own
/// pid file; a failed fork is recorded on the session as an aborted
/// startup so "never came up" is distinguishable from "ran and exited".
pub fn start_daemon(store: &Store, session: &Session, daemon_bin: &str) -> Result<(), DaemonError> {
    let log_path = store.session_log_path(session.id);
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| DaemonError::io(format!("open session log {log_path:?}"), e))?;
    let log_err = log
        .try_clone()
        .map_err(|e| DaemonError::io("clone session log handle", e))?;

    let mut command = std::process::Command::new(daemon_bin);
    command
        .arg("--project-dir")
        .arg(&session.project_dir)
        .arg("--session")
        .arg(session.id.to_string())
        .stdin(std::process::Stdio::null())
        .stdout(log)
        .stderr(log_err);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    match command.spawn() {
        Ok(child) => {
            info!(session = session.id, pid = child.id(), "daemon forked");
            Ok(())
        }
        Err(err) => {
            let mut session = session.clone();
            session.status = SessionStatus::Aborted;
            session.last_error = format!("daemon never came up: {err}");
            store.update_session(&session)?;
            Err(DaemonError::AbortSessionStartup(err.to_string()))
        }
    }
}
