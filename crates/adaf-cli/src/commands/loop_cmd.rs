//! `adaf loop-*`: starting loops and steering them from inside turns.

use adaf_core::config::load_global_config;
use adaf_core::envctx::RuntimeContext;
use adaf_core::session::{Session, SessionStatus};
use adaf_core::signal::InterruptKind;
use adaf_core::store::Store;
use adaf_daemon::launch::start_daemon;
use adaf_daemon::recover::recover;
use adaf_loop::position::next_supervisor_step_index;
use adaf_spawn::worktree::WorktreeManager;
use chrono::Utc;

use crate::error::CliError;
use crate::runtime::{
    block_on, context, daemon_bin, find_project_dir, open_store, parse_id, require_positional,
    take_flag,
};

pub fn start(mut args: Vec<String>) -> Result<(), CliError> {
    let loop_name = require_positional(&mut args, "loop name")?;
    let plan_override = take_flag(&mut args, "--plan")?;

    let project_dir = find_project_dir()?;
    let store = Store::open(&project_dir)?;

    // Reap dead sessions and stale sockets before adding a new one.
    let worktrees = WorktreeManager::new(&project_dir);
    block_on(recover(&store, &worktrees, None))??;

    let cfg = load_global_config()?;
    let loop_def = cfg.loop_def(&loop_name)?.clone();
    for step in &loop_def.steps {
        cfg.profile(&step.profile)?;
    }

    let plan_id = match plan_override {
        Some(plan) => plan,
        None => store
            .active_plan()?
            .map(|p| p.id)
            .unwrap_or_default(),
    };
    let first_profile = loop_def
        .steps
        .first()
        .map(|s| s.profile.clone())
        .unwrap_or_default();
    let agent = cfg
        .profiles
        .get(&first_profile)
        .map(|p| p.agent.clone())
        .unwrap_or_default();

    let mut session = Session {
        id: 0,
        pid: None,
        project_dir: project_dir.to_string_lossy().to_string(),
        work_dir: project_dir.to_string_lossy().to_string(),
        plan_id,
        profile: first_profile,
        agent,
        loop_def,
        loop_name: loop_name.clone(),
        one_shot: false,
        profiles: cfg.profiles.clone(),
        teams: cfg.teams.clone(),
        pushover: cfg.pushover.clone(),
        socket_path: String::new(),
        status: SessionStatus::Starting,
        last_error: String::new(),
        loop_run_id: None,
        spawn_id: None,
        parent_turn_id: None,
        heartbeat_at: None,
        created_at: Utc::now(),
    };
    store.create_session(&mut session)?;
    start_daemon(&store, &session, &daemon_bin())?;

    println!(
        "session {} started for loop {loop_name:?} (attach with `adaf attach {}`)",
        session.id, session.id
    );
    Ok(())
}

pub fn stop(mut args: Vec<String>) -> Result<(), CliError> {
    let store = open_store()?;
    let ctx = context();

    let run_id = match ctx.loop_run_id {
        Some(id) => id,
        None => {
            let raw = take_flag(&mut args, "--run-id")?.ok_or_else(|| {
                CliError::Usage("outside an agent turn, `loop-stop` needs --run-id".to_string())
            })?;
            parse_id(&raw, "run id")?
        }
    };
    store.signal_loop_stop(run_id)?;
    println!("stop requested for run {run_id}; the loop ends after the current step");
    Ok(())
}

pub fn call_supervisor(mut args: Vec<String>) -> Result<(), CliError> {
    let content = require_positional(&mut args, "message")?;
    let store = open_store()?;
    let ctx = agent_ctx()?;

    let run_id = ctx
        .loop_run_id
        .ok_or_else(|| CliError::Context("this turn has no loop run".to_string()))?;
    let from_step = ctx
        .step_index
        .ok_or_else(|| CliError::Context("this turn has no step index".to_string()))?;
    let turn_id = ctx
        .turn_id
        .ok_or_else(|| CliError::Context("this turn has no turn id".to_string()))?;

    let run = store.get_loop_run(run_id)?;
    let Some(target) = next_supervisor_step_index(&run.steps, from_step) else {
        return Err(CliError::Context(format!(
            "loop {:?} has no supervisor step to call",
            run.loop_name
        )));
    };

    store.signal_loop_call_supervisor(run_id, from_step, target, &content)?;
    store.signal_interrupt(turn_id, InterruptKind::CallSupervisor)?;
    println!("supervisor called; the loop fast-forwards to step {target}");
    Ok(())
}

pub fn message(mut args: Vec<String>) -> Result<(), CliError> {
    let content = require_positional(&mut args, "message")?;
    let store = open_store()?;
    let ctx = agent_ctx()?;

    let run_id = ctx
        .loop_run_id
        .ok_or_else(|| CliError::Context("this turn has no loop run".to_string()))?;
    let step_index = ctx
        .step_index
        .ok_or_else(|| CliError::Context("this turn has no step index".to_string()))?;

    let mut message = adaf_core::loop_run::LoopMessage {
        id: 0,
        run_id,
        step_index,
        content,
        created_at: Utc::now(),
    };
    store.create_loop_message(&mut message)?;
    println!("message {} posted for later steps", message.id);
    Ok(())
}

fn agent_ctx() -> Result<RuntimeContext, CliError> {
    let ctx = context();
    if !ctx.is_agent() {
        return Err(CliError::Context(
            "this command only works inside an agent turn".to_string(),
        ));
    }
    Ok(ctx)
}
