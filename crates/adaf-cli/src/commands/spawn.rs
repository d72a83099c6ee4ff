//! `adaf spawn*`, `parent-ask`, `spawn-reply`, `tree`: the delegation
//! surface.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use adaf_core::config::GlobalConfig;
use adaf_core::spawn::AskStatus;
use adaf_core::store::Store;
use adaf_daemon::bootstrap::DaemonOptions;
use adaf_daemon::spawner::DaemonSessionSpawner;
use adaf_spawn::orchestrator::{Orchestrator, SpawnRequest, SpawnTreeNode};
use adaf_spawn::worktree::WorktreeManager;
use adaf_stats::aggregate::StatsAggregator;
use tabwriter::TabWriter;
use tokio_util::sync::CancellationToken;

use crate::error::CliError;
use crate::runtime::{
    block_on, context, daemon_bin, find_project_dir, open_store, parse_id, require_positional,
    take_flag,
};

/// Build an orchestrator whose delegation config comes from the hosting
/// session's snapshot when run inside a turn, falling back to the global
/// config for operator commands.
fn orchestrator(store: &Store) -> Result<Orchestrator, CliError> {
    let ctx = context();
    let config = match ctx.session_id.and_then(|id| store.get_session(id).ok()) {
        Some(session) => GlobalConfig {
            profiles: session.profiles,
            teams: session.teams,
            ..GlobalConfig::default()
        },
        None => adaf_core::config::load_global_config()?,
    };

    let options = DaemonOptions {
        daemon_bin: daemon_bin(),
        ..DaemonOptions::default()
    };
    Ok(Orchestrator::new(
        store.clone(),
        WorktreeManager::new(find_project_dir()?),
        Arc::new(DaemonSessionSpawner::new(store.clone(), options)),
        config,
    ))
}

pub fn spawn(mut args: Vec<String>) -> Result<(), CliError> {
    let profile = take_flag(&mut args, "--profile")?
        .ok_or_else(|| CliError::Usage("--profile is required".to_string()))?;
    let task = take_flag(&mut args, "--task")?
        .ok_or_else(|| CliError::Usage("--task is required".to_string()))?;
    let role = take_flag(&mut args, "--role")?.unwrap_or_default();
    let team = take_flag(&mut args, "--team")?.unwrap_or_default();

    let ctx = context();
    let parent_turn_id = ctx
        .turn_id
        .ok_or_else(|| CliError::Context("`spawn` only works inside an agent turn".to_string()))?;

    let store = open_store()?;
    let orch = orchestrator(&store)?;
    let spawn_id = block_on(orch.spawn(SpawnRequest {
        parent_turn_id,
        child_profile: profile,
        task,
        role,
        team,
    }))??;

    let aggregator = StatsAggregator::new(store.clone());
    aggregator.record_spawn(&store.get_spawn(spawn_id)?)?;

    println!("spawn {spawn_id} started");
    Ok(())
}

pub fn list(_args: Vec<String>) -> Result<(), CliError> {
    let store = open_store()?;
    let spawns = store.list_spawns()?;
    let mut tw = TabWriter::new(std::io::stdout());
    let _ = writeln!(tw, "ID\tSTATUS\tPROFILE\tTASK");
    for spawn in spawns.records {
        let _ = writeln!(
            tw,
            "{}\t{}\t{}\t{}",
            spawn.id, spawn.status, spawn.child_profile, spawn.task
        );
    }
    let _ = tw.flush();
    Ok(())
}

pub fn status(mut args: Vec<String>) -> Result<(), CliError> {
    let id = spawn_id_arg(&mut args)?;
    let store = open_store()?;
    let orch = orchestrator(&store)?;
    let (spawn, asks) = orch.inspect(id)?;

    println!("spawn {}: {} ({})", spawn.id, spawn.status, spawn.child_profile);
    println!("  task: {}", spawn.task);
    if !spawn.worktree_path.is_empty() {
        println!("  worktree: {} ({})", spawn.worktree_path, spawn.branch);
    }
    if !spawn.commit_hash.is_empty() {
        println!("  commit: {}", spawn.commit_hash);
    }
    if !spawn.result.is_empty() {
        println!("  result: {}", spawn.result);
    }
    if !spawn.error.is_empty() {
        println!("  error: {}", spawn.error);
    }
    for ask in asks {
        println!("  ask {} [{}]: {}", ask.id, ask.status, ask.content);
    }
    Ok(())
}

pub fn diff(mut args: Vec<String>) -> Result<(), CliError> {
    let id = spawn_id_arg(&mut args)?;
    let store = open_store()?;
    let orch = orchestrator(&store)?;
    let diff = block_on(orch.diff(id))??;
    print!("{diff}");
    Ok(())
}

pub fn merge(mut args: Vec<String>) -> Result<(), CliError> {
    let id = spawn_id_arg(&mut args)?;
    let store = open_store()?;
    let orch = orchestrator(&store)?;
    let commit = block_on(orch.merge(id))??;
    println!("spawn {id} merged at {commit}");
    Ok(())
}

pub fn reject(mut args: Vec<String>) -> Result<(), CliError> {
    let id = spawn_id_arg(&mut args)?;
    let store = open_store()?;
    let orch = orchestrator(&store)?;
    block_on(orch.reject(id))??;
    println!("spawn {id} rejected; its work was discarded");
    Ok(())
}

pub fn cancel(mut args: Vec<String>) -> Result<(), CliError> {
    let id = spawn_id_arg(&mut args)?;
    let store = open_store()?;
    let orch = orchestrator(&store)?;
    block_on(orch.cancel(id))??;
    println!("spawn {id} cancelled");
    Ok(())
}

pub fn wait(mut args: Vec<String>) -> Result<(), CliError> {
    let id = spawn_id_arg(&mut args)?;
    let timeout = match take_flag(&mut args, "--timeout")? {
        Some(raw) => Some(Duration::from_secs(parse_id(&raw, "timeout seconds")?)),
        None => None,
    };
    let store = open_store()?;
    let orch = orchestrator(&store)?;
    let spawn = block_on(orch.wait(id, timeout, &CancellationToken::new()))??;
    println!("spawn {id} is {}", spawn.status);
    Ok(())
}

/// Child → parent question. Blocks until the parent replies and prints the
/// answer, which becomes the next thing the asking agent reads.
pub fn parent_ask(mut args: Vec<String>) -> Result<(), CliError> {
    let question = require_positional(&mut args, "question")?;
    let ctx = context();
    let session_id = ctx.session_id.ok_or_else(|| {
        CliError::Context("`parent-ask` only works inside a spawned agent turn".to_string())
    })?;

    let store = open_store()?;
    let session = store.get_session(session_id)?;
    let spawn_id = session.spawn_id.ok_or_else(|| {
        CliError::Context("this session was not started by a spawn; there is no parent".to_string())
    })?;

    let orch = orchestrator(&store)?;
    let ask_id = orch.ask(spawn_id, &question)?;
    let answer = block_on(orch.wait_reply(ask_id, None, &CancellationToken::new()))??;
    println!("{answer}");
    Ok(())
}

pub fn reply(mut args: Vec<String>) -> Result<(), CliError> {
    let answer = take_flag(&mut args, "--answer")?
        .ok_or_else(|| CliError::Usage("--answer is required".to_string()))?;
    let ask_id = match take_flag(&mut args, "--ask-id")? {
        Some(raw) => parse_id(&raw, "ask id")?,
        None => {
            // Resolve the pending ask of --spawn-id.
            let spawn_id = spawn_id_arg(&mut args)?;
            let store = open_store()?;
            let pending = store
                .list_asks(spawn_id)?
                .into_iter()
                .find(|a| a.status == AskStatus::Pending)
                .ok_or_else(|| {
                    CliError::Usage(format!("spawn {spawn_id} has no pending ask"))
                })?;
            pending.id
        }
    };

    let store = open_store()?;
    let orch = orchestrator(&store)?;
    orch.reply(ask_id, &answer)?;
    println!("ask {ask_id} answered; the child resumes");
    Ok(())
}

pub fn tree(_args: Vec<String>) -> Result<(), CliError> {
    let store = open_store()?;
    let orch = orchestrator(&store)?;
    let roots = orch.tree()?;
    if roots.is_empty() {
        println!("no spawns");
        return Ok(());
    }
    for node in &roots {
        render_node(node, 0);
    }
    Ok(())
}

fn render_node(node: &SpawnTreeNode, depth: usize) {
    let indent = "  ".repeat(depth);
    println!(
        "{indent}spawn {} [{}] {}: {}",
        node.spawn.id, node.spawn.status, node.spawn.child_profile, node.spawn.task
    );
    for ask in &node.asks {
        if ask.status == AskStatus::Pending {
            println!("{indent}  ? {}", ask.content);
        }
    }
    for child in &node.children {
        render_node(child, depth + 1);
    }
}

fn spawn_id_arg(args: &mut Vec<String>) -> Result<u64, CliError> {
    let raw = match take_flag(args, "--spawn-id")? {
        Some(raw) => raw,
        None => require_positional(args, "spawn id")?,
    };
    parse_id(&raw, "spawn id")
}
