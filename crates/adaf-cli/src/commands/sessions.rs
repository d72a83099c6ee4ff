//! `adaf sessions`: list sessions with liveness, reaping dead ones first.

use std::io::Write;

use adaf_daemon::recover::{pid_alive, recover};
use adaf_spawn::worktree::WorktreeManager;
use tabwriter::TabWriter;

use crate::error::CliError;
use crate::runtime::{block_on, find_project_dir, open_store};

pub fn run(_args: Vec<String>) -> Result<(), CliError> {
    let store = open_store()?;
    let worktrees = WorktreeManager::new(find_project_dir()?);
    block_on(recover(&store, &worktrees, None))??;

    let sessions = store.list_sessions()?;
    let mut tw = TabWriter::new(std::io::stdout());
    let _ = writeln!(tw, "ID\tSTATUS\tLOOP\tPID\tALIVE\tSTARTED");
    for session in sessions.records {
        let pid = session
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let alive = session.pid.is_some_and(pid_alive);
        let loop_label = if session.one_shot {
            format!("(spawn {})", session.spawn_id.unwrap_or(0))
        } else {
            session.loop_name.clone()
        };
        let _ = writeln!(
            tw,
            "{}\t{}\t{}\t{}\t{}\t{}",
            session.id,
            session.status,
            loop_label,
            pid,
            if alive { "yes" } else { "no" },
            session.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    let _ = tw.flush();

    for corrupt in sessions.corrupt {
        eprintln!("warning: skipped corrupt record {}", corrupt.path.display());
    }
    Ok(())
}
