//! adaf-cli: the command table and thin command shells over the core.

pub mod commands;
pub mod error;
pub mod registry;
pub mod runtime;

pub use error::CliError;

use adaf_core::envctx::RuntimeContext;

/// Dispatch one invocation. The registry row is checked before any command
/// code runs; audience and position enforcement live in one place.
pub fn dispatch(command: &str, args: Vec<String>) -> Result<(), CliError> {
    let ctx = RuntimeContext::from_env();
    let spec = registry::find(command)
        .ok_or_else(|| CliError::Usage(format!("unknown command {command:?}; see `adaf help`")))?;
    registry::check_access(&spec, &ctx)?;

    match command {
        "init" => commands::init::run(args),
        "plan" => commands::plan::run(args),
        "sessions" => commands::sessions::run(args),
        "attach" => commands::attach::run(args),
        "lookup" => commands::lookup::run(args),
        "loop-start" => commands::loop_cmd::start(args),
        "loop-stop" => commands::loop_cmd::stop(args),
        "loop-call-supervisor" => commands::loop_cmd::call_supervisor(args),
        "loop-message" => commands::loop_cmd::message(args),
        "spawn" => commands::spawn::spawn(args),
        "spawn-list" => commands::spawn::list(args),
        "spawn-status" => commands::spawn::status(args),
        "spawn-diff" => commands::spawn::diff(args),
        "spawn-merge" => commands::spawn::merge(args),
        "spawn-reject" => commands::spawn::reject(args),
        "spawn-cancel" => commands::spawn::cancel(args),
        "spawn-wait" => commands::spawn::wait(args),
        "parent-ask" => commands::spawn::parent_ask(args),
        "spawn-reply" => commands::spawn::reply(args),
        "tree" => commands::spawn::tree(args),
        "worktree-cleanup" => commands::worktree::cleanup(args),
        "stats-migrate" => commands::stats::migrate(args),
        "stats-show" => commands::stats::show(args),
        other => Err(CliError::Usage(format!("unknown command {other:?}"))),
    }
}

/// Help text filtered to the commands this context may use.
pub fn help_text() -> String {
    let ctx = RuntimeContext::from_env();
    let mut out = String::from("Usage: adaf <command> [args]\n\nCommands:\n");
    for spec in registry::visible(&ctx) {
        out.push_str(&format!("  {:<22} {}\n", spec.name, spec.summary));
    }
    out
}
