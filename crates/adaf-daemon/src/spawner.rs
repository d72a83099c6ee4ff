//! Nested one-shot sessions for spawns.
//!
//! When the orchestrator starts a spawn, this spawner snapshots a one-shot
//! session bound to the spawn's worktree and forks a daemon for it: the
//! same daemon binary hosting the parent, one level down.

use adaf_core::config::{LoopDef, LoopStepDef};
use adaf_core::loop_run::Position;
use adaf_core::session::{Session, SessionStatus};
use adaf_core::spawn::Spawn;
use adaf_core::store::Store;
use adaf_spawn::error::SpawnError;
use adaf_spawn::orchestrator::SessionSpawner;
use async_trait::async_trait;
use chrono::Utc;

use crate::bootstrap::DaemonOptions;
use crate::launch::start_daemon;

pub struct DaemonSessionSpawner {
    store: Store,
    options: DaemonOptions,
}

impl DaemonSessionSpawner {
    pub fn new(store: Store, options: DaemonOptions) -> Self {
        Self { store, options }
    }
}

#[async_trait]
impl SessionSpawner for DaemonSessionSpawner {
    async fn start_one_shot(&self, spawn: &Spawn) -> Result<u64, SpawnError> {
        let parent_turn = self.store.get_turn(spawn.parent_turn_id)?;
        let parent_session = self.store.get_session(parent_turn.session_id)?;

        let loop_def = LoopDef {
            steps: vec![LoopStepDef {
                profile: spawn.child_profile.clone(),
                position: Position::Worker,
                role: spawn.role.clone(),
                turns: 1,
                instructions: spawn.task.clone(),
                team: spawn.team.clone(),
                ..LoopStepDef::default()
            }],
        };

        let mut session = Session {
            id: 0,
            pid: None,
            project_dir: parent_session.project_dir.clone(),
            work_dir: spawn.worktree_path.clone(),
            plan_id: parent_session.plan_id.clone(),
            profile: spawn.child_profile.clone(),
            agent: spawn.child_agent.clone(),
            loop_def,
            loop_name: String::new(),
            one_shot: true,
            profiles: parent_session.profiles.clone(),
            teams: parent_session.teams.clone(),
            pushover: parent_session.pushover.clone(),
            socket_path: String::new(),
            status: SessionStatus::Starting,
            last_error: String::new(),
            loop_run_id: None,
            spawn_id: Some(spawn.id),
            parent_turn_id: Some(spawn.parent_turn_id),
            heartbeat_at: None,
            created_at: Utc::now(),
        };
        self.store.create_session(&mut session)?;

        start_daemon(&self.store, &session, &self.options.daemon_bin)
            .map_err(|e| SpawnError::Launch(e.to_string()))?;
        Ok(session.id)
    }
}
