//! Spawn orchestration: create, run, ask/reply, diff/merge/reject, cancel.
//!
//! The orchestrator owns every spawn's lifecycle. A spawn exclusively owns
//! its worktree until it reaches a terminal status, after which the
//! worktree is removed. Nested sessions are started through the
//! [`SessionSpawner`] seam so the daemon boundary stays mockable.

use std::sync::Arc;
use std::time::Duration;

use adaf_core::config::GlobalConfig;
use adaf_core::delegation::check_delegation;
use adaf_core::signal::InterruptKind;
use adaf_core::spawn::{Ask, AskStatus, Spawn, SpawnStatus};
use adaf_core::store::Store;
use adaf_runner::event::SpawnStatusEntry;
use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::SpawnError;
use crate::lifecycle::validate_transition;
use crate::worktree::WorktreeManager;

/// Poll interval for wait/ask loops.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Starts the nested one-shot session for a spawn and returns its session
/// ID. The production implementation forks a daemon; tests script it.
#[async_trait]
pub trait SessionSpawner: Send + Sync {
    async fn start_one_shot(&self, spawn: &Spawn) -> Result<u64, SpawnError>;
}

/// A spawner that never starts anything; spawns stay `pending`. Used by
/// tests that drive the lifecycle by hand.
pub struct NullSessionSpawner;

#[async_trait]
impl SessionSpawner for NullSessionSpawner {
    async fn start_one_shot(&self, _spawn: &Spawn) -> Result<u64, SpawnError> {
        Ok(0)
    }
}

// ---------------------------------------------------------------------------
// Requests / views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SpawnRequest {
    pub parent_turn_id: u64,
    pub child_profile: String,
    pub task: String,
    pub role: String,
    pub team: String,
}

/// A spawn with its pending asks and recursively nested children.
#[derive(Debug, Clone)]
pub struct SpawnTreeNode {
    pub spawn: Spawn,
    pub asks: Vec<Ask>,
    pub children: Vec<SpawnTreeNode>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    store: Store,
    worktrees: WorktreeManager,
    spawner: Arc<dyn SessionSpawner>,
    config: GlobalConfig,
}

impl Orchestrator {
    pub fn new(
        store: Store,
        worktrees: WorktreeManager,
        spawner: Arc<dyn SessionSpawner>,
        config: GlobalConfig,
    ) -> Self {
        Self {
            store,
            worktrees,
            spawner,
            config,
        }
    }

    // -----------------------------------------------------------------
    // Create & run
    // -----------------------------------------------------------------

    /// Validate delegation, create the spawn record, materialize its
    /// worktree, and start the nested one-shot session. Returns the spawn
    /// ID. A delegation violation is recorded as a failed spawn before the
    /// error surfaces.
    pub async fn spawn(&self, req: SpawnRequest) -> Result<u64, SpawnError> {
        let parent_turn = self.store.get_turn(req.parent_turn_id)?;
        let parent_profile = parent_turn.profile.clone();

        let decision = check_delegation(&self.config, &parent_profile, &req.child_profile)?;
        if !decision.allowed {
            let mut violation = new_spawn(&req, &parent_profile, String::new());
            violation.status = SpawnStatus::Failed;
            violation.error = format!(
                "delegation violation: {parent_profile:?} may not spawn {:?}",
                req.child_profile
            );
            self.store.create_spawn(&mut violation)?;
            return Err(SpawnError::Guardrail {
                parent: parent_profile,
                child: req.child_profile,
                allowed: decision.allow_list,
            });
        }

        let child_agent = self
            .config
            .profile(&req.child_profile)?
            .agent
            .clone();
        let mut spawn = new_spawn(&req, &parent_profile, child_agent);
        self.store.create_spawn(&mut spawn)?;

        let worktree = self.worktrees.create(spawn.id).await?;
        spawn.worktree_path = worktree.path.to_string_lossy().to_string();
        spawn.branch = worktree.branch;
        self.store.update_spawn(&spawn)?;

        let session_id = self.spawner.start_one_shot(&spawn).await?;
        spawn.child_session_id = Some(session_id);
        spawn.status = SpawnStatus::Running;
        spawn.started_at = Some(Utc::now());
        self.store.update_spawn(&spawn)?;

        info!(spawn = spawn.id, profile = %spawn.child_profile, "spawn started");
        Ok(spawn.id)
    }

    pub fn status(&self, id: u64) -> Result<Spawn, SpawnError> {
        Ok(self.store.get_spawn(id)?)
    }

    pub fn list(&self) -> Result<Vec<Spawn>, SpawnError> {
        Ok(self.store.list_spawns()?.records)
    }

    /// Compact status entries for prompts and `spawn_status` events.
    pub fn status_entries(&self) -> Result<Vec<SpawnStatusEntry>, SpawnError> {
        Ok(self
            .list()?
            .into_iter()
            .map(|s| SpawnStatusEntry {
                id: s.id,
                child_profile: s.child_profile,
                task: s.task,
                status: s.status,
            })
            .collect())
    }

    // -----------------------------------------------------------------
    // Completion callbacks (driven by the daemon hosting the child)
    // -----------------------------------------------------------------

    /// Mark a running spawn completed with its result text. The checkout
    /// directory is removed; the branch stays for diff and merge.
    pub async fn complete(&self, id: u64, result: &str) -> Result<(), SpawnError> {
        let mut spawn = self.store.get_spawn(id)?;
        validate_transition(id, spawn.status, SpawnStatus::Completed, "complete")?;
        spawn.status = SpawnStatus::Completed;
        spawn.completed_at = Some(Utc::now());
        spawn.result = result.to_string();
        if !spawn.worktree_path.is_empty() {
            let path = std::path::PathBuf::from(&spawn.worktree_path);
            self.worktrees.remove_dir(&path).await?;
            spawn.worktree_path.clear();
        }
        Ok(self.store.update_spawn(&spawn)?)
    }

    /// Mark a spawn failed; its worktree is discarded.
    pub async fn fail(&self, id: u64, error: &str) -> Result<(), SpawnError> {
        let mut spawn = self.store.get_spawn(id)?;
        validate_transition(id, spawn.status, SpawnStatus::Failed, "fail")?;
        spawn.status = SpawnStatus::Failed;
        spawn.completed_at = Some(Utc::now());
        spawn.error = error.to_string();
        self.store.update_spawn(&spawn)?;
        self.discard_worktree(&mut spawn).await
    }

    // -----------------------------------------------------------------
    // Diff / merge / reject
    // -----------------------------------------------------------------

    /// The diff the spawn branch carries against the parent HEAD.
    pub async fn diff(&self, id: u64) -> Result<String, SpawnError> {
        let spawn = self.store.get_spawn(id)?;
        if spawn.branch.is_empty() {
            return Err(SpawnError::InvalidState {
                spawn_id: id,
                status: spawn.status,
                operation: "diff",
            });
        }
        self.worktrees.diff_against_head(&spawn.branch).await
    }

    /// Fast-forward (or merge-commit) the spawn's branch into the parent.
    /// Requires a completed spawn and a clean parent tree; removes the
    /// worktree on success and rolls back on conflict.
    pub async fn merge(&self, id: u64) -> Result<String, SpawnError> {
        let mut spawn = self.store.get_spawn(id)?;
        validate_transition(id, spawn.status, SpawnStatus::Merged, "merge")?;
        if !self.worktrees.is_clean().await? {
            return Err(SpawnError::git(
                format!("merge spawn {id}"),
                "parent worktree has local modifications; commit or stash them first",
            ));
        }

        let message = format!("merge spawn {id}: {}", spawn.task);
        let commit = self.worktrees.merge_branch(&spawn.branch, &message).await?;

        spawn.status = SpawnStatus::Merged;
        spawn.commit_hash = commit.clone();
        self.store.update_spawn(&spawn)?;
        self.discard_worktree(&mut spawn).await?;
        info!(spawn = id, commit = %commit, "spawn merged");
        Ok(commit)
    }

    /// Discard a completed spawn's work.
    pub async fn reject(&self, id: u64) -> Result<(), SpawnError> {
        let mut spawn = self.store.get_spawn(id)?;
        validate_transition(id, spawn.status, SpawnStatus::Rejected, "reject")?;
        spawn.status = SpawnStatus::Rejected;
        self.store.update_spawn(&spawn)?;
        self.discard_worktree(&mut spawn).await
    }

    // -----------------------------------------------------------------
    // Cancel
    // -----------------------------------------------------------------

    /// Cancel a non-terminal spawn and, recursively, every descendant it
    /// launched through its child session's turns.
    pub async fn cancel(&self, id: u64) -> Result<(), SpawnError> {
        self.cancel_boxed(id).await
    }

    /// Boxed recursive implementation of [`Self::cancel`]. The explicit
    /// erased future type breaks the auto-trait (`Send`) inference cycle
    /// that a directly-recursive `async fn` would introduce.
    fn cancel_boxed(
        &self,
        id: u64,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), SpawnError>> + Send + '_>>
    {
        Box::pin(async move {
            let mut spawn = self.store.get_spawn(id)?;
            if spawn.status.is_terminal() {
                return Err(SpawnError::InvalidState {
                    spawn_id: id,
                    status: spawn.status,
                    operation: "cancel",
                });
            }

            for child in self.children_of(&spawn)? {
                if !child.status.is_terminal() {
                    self.cancel_boxed(child.id).await?;
                }
            }

            self.interrupt_child_session(&spawn)?;

            spawn.status = SpawnStatus::Cancelled;
            spawn.completed_at = Some(Utc::now());
            self.store.update_spawn(&spawn)?;
            self.discard_worktree(&mut spawn).await?;
            info!(spawn = id, "spawn cancelled");
            Ok(())
        })
    }

    /// Spawns created from turns of this spawn's child session.
    fn children_of(&self, spawn: &Spawn) -> Result<Vec<Spawn>, SpawnError> {
        let Some(child_session) = spawn.child_session_id else {
            return Ok(vec![]);
        };
        let mut children = Vec::new();
        for candidate in self.store.list_spawns()?.records {
            if candidate.id == spawn.id {
                continue;
            }
            match self.store.get_turn(candidate.parent_turn_id) {
                Ok(turn) if turn.session_id == child_session => children.push(candidate),
                Ok(_) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(children)
    }

    /// Stop the child session: stop marker on its run, abort marker on its
    /// in-flight turn.
    fn interrupt_child_session(&self, spawn: &Spawn) -> Result<(), SpawnError> {
        let Some(session_id) = spawn.child_session_id else {
            return Ok(());
        };
        let session = match self.store.get_session(session_id) {
            Ok(session) => session,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        if let Some(run_id) = session.loop_run_id {
            self.store.signal_loop_stop(run_id)?;
            if let Ok(run) = self.store.get_loop_run(run_id) {
                if let Some(turn_id) = run.turn_ids.last() {
                    self.store
                        .signal_interrupt(*turn_id, InterruptKind::UserAbort)?;
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Wait
    // -----------------------------------------------------------------

    /// Wait for a spawn to reach a terminal status. A timeout returns an
    /// error without affecting the spawn.
    pub async fn wait(
        &self,
        id: u64,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Spawn, SpawnError> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        let mut last = self.store.get_spawn(id)?;
        loop {
            if last.status.is_terminal() {
                return Ok(last);
            }
            if cancel.is_cancelled() {
                return Err(SpawnError::WaitCancelled { spawn_id: id });
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return Err(SpawnError::WaitTimeout {
                        spawn_id: id,
                        last: last.status,
                    });
                }
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            last = self.store.get_spawn(id)?;
        }
    }

    // -----------------------------------------------------------------
    // Ask / reply
    // -----------------------------------------------------------------

    /// Child → parent question. Moves the spawn to `awaiting_input`; the
    /// asking child blocks in [`Self::wait_reply`] until the parent
    /// answers, which is how the suspension manifests.
    pub fn ask(&self, spawn_id: u64, question: &str) -> Result<u64, SpawnError> {
        let mut spawn = self.store.get_spawn(spawn_id)?;
        validate_transition(spawn_id, spawn.status, SpawnStatus::AwaitingInput, "ask")?;

        let mut ask = Ask {
            id: 0,
            spawn_id,
            content: question.to_string(),
            created_at: Utc::now(),
            reply: String::new(),
            replied_at: None,
            status: AskStatus::Pending,
        };
        self.store.create_ask(&mut ask)?;

        spawn.status = SpawnStatus::AwaitingInput;
        self.store.update_spawn(&spawn)?;
        Ok(ask.id)
    }

    /// Parent → child answer. Marks the ask answered and resumes the spawn.
    pub fn reply(&self, ask_id: u64, answer: &str) -> Result<(), SpawnError> {
        let mut ask = self.store.get_ask(ask_id)?;
        if ask.status != AskStatus::Pending {
            return Err(SpawnError::Store(adaf_core::StoreError::Validation(
                format!("ask {ask_id} is {:?}; only pending asks can be answered", ask.status.as_str()),
            )));
        }
        ask.reply = answer.to_string();
        ask.replied_at = Some(Utc::now());
        ask.status = AskStatus::Answered;
        self.store.update_ask(&ask)?;

        let mut spawn = self.store.get_spawn(ask.spawn_id)?;
        validate_transition(spawn.id, spawn.status, SpawnStatus::Running, "reply")?;
        spawn.status = SpawnStatus::Running;
        self.store.update_spawn(&spawn)?;
        Ok(())
    }

    /// Block until an ask is answered, returning the answer. The answer is
    /// injected into the child as the blocking command's output, making it
    /// the next thing the agent reads.
    pub async fn wait_reply(
        &self,
        ask_id: u64,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<String, SpawnError> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            let ask = self.store.get_ask(ask_id)?;
            match ask.status {
                AskStatus::Answered => return Ok(ask.reply),
                AskStatus::Dismissed => {
                    return Err(SpawnError::Store(adaf_core::StoreError::Validation(
                        format!("ask {ask_id} was dismissed"),
                    )))
                }
                AskStatus::Pending => {}
            }
            if cancel.is_cancelled() {
                return Err(SpawnError::WaitCancelled { spawn_id: ask.spawn_id });
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return Err(SpawnError::WaitTimeout {
                        spawn_id: ask.spawn_id,
                        last: SpawnStatus::AwaitingInput,
                    });
                }
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    // -----------------------------------------------------------------
    // Inspect / tree
    // -----------------------------------------------------------------

    /// A spawn with its asks.
    pub fn inspect(&self, id: u64) -> Result<(Spawn, Vec<Ask>), SpawnError> {
        let spawn = self.store.get_spawn(id)?;
        let asks = self.store.list_asks(id)?;
        Ok((spawn, asks))
    }

    /// The delegation tree rooted at top-level spawns (those whose parent
    /// turn belongs to no other spawn's child session).
    pub fn tree(&self) -> Result<Vec<SpawnTreeNode>, SpawnError> {
        let spawns = self.store.list_spawns()?.records;

        let mut child_sessions = Vec::new();
        for spawn in &spawns {
            if let Some(session) = spawn.child_session_id {
                child_sessions.push(session);
            }
        }

        let mut roots = Vec::new();
        for spawn in &spawns {
            let parent_session = match self.store.get_turn(spawn.parent_turn_id) {
                Ok(turn) => Some(turn.session_id),
                Err(err) if err.is_not_found() => None,
                Err(err) => return Err(err.into()),
            };
            let nested = parent_session.is_some_and(|s| child_sessions.contains(&s));
            if !nested {
                roots.push(self.build_node(spawn, &spawns)?);
            }
        }
        Ok(roots)
    }

    fn build_node(&self, spawn: &Spawn, all: &[Spawn]) -> Result<SpawnTreeNode, SpawnError> {
        let asks = self.store.list_asks(spawn.id)?;
        let mut children = Vec::new();
        if let Some(child_session) = spawn.child_session_id {
            for candidate in all {
                if candidate.id == spawn.id {
                    continue;
                }
                if let Ok(turn) = self.store.get_turn(candidate.parent_turn_id) {
                    if turn.session_id == child_session {
                        children.push(self.build_node(candidate, all)?);
                    }
                }
            }
        }
        Ok(SpawnTreeNode {
            spawn: spawn.clone(),
            asks,
            children,
        })
    }

    // -----------------------------------------------------------------

    async fn discard_worktree(&self, spawn: &mut Spawn) -> Result<(), SpawnError> {
        if spawn.worktree_path.is_empty() && spawn.branch.is_empty() {
            return Ok(());
        }
        let path = std::path::PathBuf::from(&spawn.worktree_path);
        if let Err(err) = self.worktrees.remove(&path, &spawn.branch).await {
            warn!(spawn = spawn.id, error = %err, "worktree removal failed");
            return Err(err);
        }
        spawn.worktree_path.clear();
        spawn.branch.clear();
        self.store.update_spawn(spawn)?;
        Ok(())
    }
}

fn new_spawn(req: &SpawnRequest, parent_profile: &str, child_agent: String) -> Spawn {
    Spawn {
        id: 0,
        parent_turn_id: req.parent_turn_id,
        parent_profile: parent_profile.to_string(),
        child_profile: req.child_profile.clone(),
        child_agent,
        task: req.task.clone(),
        role: req.role.clone(),
        team: req.team.clone(),
        parent_worktree: String::new(),
        worktree_path: String::new(),
        branch: String::new(),
        child_session_id: None,
        status: SpawnStatus::Pending,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
        commit_hash: String::new(),
        result: String::new(),
        error: String::new(),
    }
}
