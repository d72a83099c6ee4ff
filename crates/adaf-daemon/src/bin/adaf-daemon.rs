//! Detached session daemon entry point.
//!
//! Forked by the CLI (or a parent daemon, for spawns) with
//! `--project-dir <dir> --session <id>`.

use std::path::PathBuf;
use std::process::ExitCode;

use adaf_core::store::Store;
use adaf_daemon::bootstrap::{init_logging, DaemonOptions};
use adaf_daemon::daemon::SessionDaemon;
use adaf_daemon::recover;
use adaf_spawn::worktree::WorktreeManager;

struct Args {
    project_dir: PathBuf,
    session_id: u64,
}

fn parse_args(argv: &[String]) -> Result<Args, String> {
    let mut project_dir: Option<PathBuf> = None;
    let mut session_id: Option<u64> = None;

    let mut idx = 0usize;
    while idx < argv.len() {
        match argv[idx].as_str() {
            "--project-dir" => {
                idx += 1;
                let value = argv
                    .get(idx)
                    .ok_or_else(|| usage("missing value for --project-dir"))?;
                project_dir = Some(PathBuf::from(value));
            }
            "--session" => {
                idx += 1;
                let value = argv
                    .get(idx)
                    .ok_or_else(|| usage("missing value for --session"))?;
                session_id = Some(
                    value
                        .parse()
                        .map_err(|_| usage("invalid --session id"))?,
                );
            }
            "-h" | "--help" => return Err(usage("")),
            other => return Err(usage(&format!("unknown flag: {other}"))),
        }
        idx += 1;
    }

    Ok(Args {
        project_dir: project_dir.ok_or_else(|| usage("--project-dir is required"))?,
        session_id: session_id.ok_or_else(|| usage("--session is required"))?,
    })
}

fn usage(message: &str) -> String {
    let mut out = String::new();
    if !message.is_empty() {
        out.push_str(&format!("Error: {message}\n\n"));
    }
    out.push_str("Usage: adaf-daemon --project-dir <dir> --session <id>\n");
    out
}

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(err) => {
            eprint!("{err}");
            return ExitCode::from(2);
        }
    };

    let store = match Store::open(&args.project_dir) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = init_logging(&store.session_log_path(args.session_id)) {
        eprintln!("logging setup failed: {err}");
    }

    let options = DaemonOptions {
        daemon_bin: std::env::args()
            .next()
            .unwrap_or_else(|| "adaf-daemon".to_string()),
        ..DaemonOptions::default()
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("runtime setup failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        // Startup recovery: reap dead siblings before hosting our session.
        let worktrees = WorktreeManager::new(&args.project_dir);
        if let Err(err) = recover::recover(&store, &worktrees, Some(args.session_id)).await {
            tracing::warn!(error = %err, "startup recovery incomplete");
        }
        SessionDaemon::new(store, options).run(args.session_id).await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
