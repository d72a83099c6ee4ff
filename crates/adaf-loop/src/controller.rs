//! The loop controller.
//!
//! Drives cycles, steps, and turns of one loop run. The controller is the
//! sole writer of the run's state transitions; every external influence
//! (stop, call-supervisor, per-turn interrupts) arrives through store
//! markers polled between and during turns.

use std::collections::BTreeSet;

use adaf_core::config::GlobalConfig;
use adaf_core::delegation::allowed_spawn_targets;
use adaf_core::loop_run::{LoopRun, LoopRunStatus, StopReason};
use adaf_core::session::{Session, SessionStatus};
use adaf_core::signal::InterruptKind;
use adaf_core::store::Store;
use adaf_core::turn::Turn;
use adaf_runner::event::{RunnerEvent, SpawnStatusEntry};
use adaf_runner::request::{AgentKind, TurnRequest};
use adaf_runner::runner::{TurnOutcome, TurnRunner};
use adaf_stats::aggregate::StatsAggregator;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::LoopError;
use crate::position::{effective_position, effective_worker_role};
use crate::prompt::{render_prompt, PromptInputs};

pub struct LoopController {
    store: Store,
    session: Session,
    runner: TurnRunner,
    events: mpsc::Sender<RunnerEvent>,
    cancel: CancellationToken,
    stats: StatsAggregator,
    /// Spawn IDs whose guardrail violation was already surfaced.
    reported_guardrails: BTreeSet<u64>,
}

/// What a finished turn told the controller to do next.
enum TurnVerdict {
    Continue,
    Stop(StopReason),
    Jump { cycle: u64, step_index: usize },
}

impl LoopController {
    pub fn new(
        store: Store,
        session: Session,
        runner: TurnRunner,
        events: mpsc::Sender<RunnerEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let stats = StatsAggregator::new(store.clone());
        Self {
            store,
            session,
            runner,
            events,
            cancel,
            stats,
            reported_guardrails: BTreeSet::new(),
        }
    }

    /// Execute the run to completion, external stop, or failure. Returns
    /// the stop reason recorded on the run.
    pub async fn run(mut self) -> Result<StopReason, LoopError> {
        let steps: Vec<_> = self
            .session
            .loop_def
            .steps
            .iter()
            .map(|s| s.freeze())
            .collect();

        let mut run = LoopRun {
            id: 0,
            hex_id: String::new(),
            loop_name: self.session.loop_name.clone(),
            status: LoopRunStatus::Running,
            cycle: 0,
            step_index: 0,
            steps,
            turn_ids: vec![],
            step_hex_ids: Default::default(),
            session_id: self.session.id,
            stop_reason: None,
            started_at: Utc::now(),
            ended_at: None,
        };
        self.store.create_loop_run(&mut run)?;

        self.session.loop_run_id = Some(run.id);
        self.session.status = SessionStatus::Running;
        self.store.update_session(&self.session)?;

        let reason = match self.drive(&mut run).await {
            Ok(reason) => reason,
            Err(err) => {
                error!(run = run.id, error = %err, "loop run failed");
                self.session.last_error = err.to_string();
                self.finalize(&mut run, StopReason::Failed).await?;
                return Err(err);
            }
        };
        self.finalize(&mut run, reason).await?;
        Ok(reason)
    }

    async fn drive(&mut self, run: &mut LoopRun) -> Result<StopReason, LoopError> {
        if run.steps.is_empty() {
            return Ok(StopReason::Completed);
        }

        let mut delivered_messages: BTreeSet<u64> = BTreeSet::new();
        let mut cycle: u64 = 0;
        let mut step_index: usize = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }

            run.cycle = cycle;
            run.step_index = step_index;
            let step = run.steps[step_index].clone();
            let position = effective_position(&step);

            self.emit(RunnerEvent::LoopStepStart {
                cycle,
                step_index,
                profile: step.profile.clone(),
                position,
            })
            .await;

            let key = LoopRun::step_key(cycle, step_index);
            if !run.step_hex_ids.contains_key(&key) {
                let hex = self.unique_step_hex(run)?;
                run.step_hex_ids.insert(key, hex);
            }
            self.store.update_loop_run(run)?;

            let mut verdict = TurnVerdict::Continue;
            for turn_in_step in 1..=step.turns {
                verdict = self
                    .run_turn(run, cycle, step_index, turn_in_step, &mut delivered_messages)
                    .await?;
                if !matches!(verdict, TurnVerdict::Continue) {
                    break;
                }
            }

            self.emit(RunnerEvent::LoopStepEnd { cycle, step_index }).await;

            match verdict {
                TurnVerdict::Stop(reason) => return Ok(reason),
                TurnVerdict::Jump {
                    cycle: c,
                    step_index: s,
                } => {
                    info!(run = run.id, from = step_index, to = s, "fast-forward to supervisor");
                    cycle = c;
                    step_index = s;
                    continue;
                }
                TurnVerdict::Continue => {}
            }

            // A stop signaled during the final turn of a step still bounds
            // the run to this one step-end.
            if self.store.is_loop_stopped(run.id)? {
                return Ok(StopReason::Stopped);
            }

            step_index += 1;
            if step_index >= run.steps.len() {
                step_index = 0;
                cycle += 1;
                if self.session.one_shot {
                    return Ok(StopReason::Completed);
                }
            }
        }
    }

    async fn run_turn(
        &mut self,
        run: &mut LoopRun,
        cycle: u64,
        step_index: usize,
        turn_in_step: u32,
        delivered_messages: &mut BTreeSet<u64>,
    ) -> Result<TurnVerdict, LoopError> {
        let step = run.steps[step_index].clone();
        let position = effective_position(&step);
        let profile = self
            .session
            .profiles
            .get(&step.profile)
            .ok_or_else(|| LoopError::UnknownProfile(step.profile.clone()))?
            .clone();
        let role = effective_worker_role(position, &step, &profile);

        // Deliver messages posted by earlier steps and not yet seen.
        let pending: Vec<_> = self
            .store
            .list_loop_messages(run.id)?
            .into_iter()
            .filter(|m| !delivered_messages.contains(&m.id) && m.step_index != step_index)
            .collect();
        for message in &pending {
            delivered_messages.insert(message.id);
        }

        self.surface_guardrail_violations().await?;
        let spawns = self.active_spawn_entries()?;
        if !spawns.is_empty() {
            self.emit(RunnerEvent::SpawnStatus {
                spawns: spawns.clone(),
            })
            .await;
        }

        let prompt = render_prompt(&PromptInputs {
            role: &role,
            instructions: &step.instructions,
            cycle,
            turn_in_step,
            messages: &pending,
            spawns: &spawns,
        });

        let step_key = LoopRun::step_key(cycle, step_index);
        let mut turn = Turn {
            id: 0,
            hex_id: String::new(),
            date: Utc::now(),
            agent: profile.agent.clone(),
            model: profile.model.clone(),
            profile: step.profile.clone(),
            plan_id: self.session.plan_id.clone(),
            objective: step.instructions.clone(),
            outcome: String::new(),
            build_state: Default::default(),
            commit_hash: String::new(),
            known_issues: vec![],
            duration_seconds: 0,
            session_id: self.session.id,
            loop_run_id: Some(run.id),
            loop_run_hex_id: run.hex_id.clone(),
            step_index: Some(step_index),
            step_hex_id: run
                .step_hex_ids
                .get(&step_key)
                .cloned()
                .unwrap_or_default(),
            failed: false,
            interrupted: false,
        };
        self.store.create_turn(&mut turn)?;

        let delegation = self.delegation_for(&step.profile);
        let request = TurnRequest {
            turn_id: turn.id,
            session_id: self.session.id,
            loop_run_id: Some(run.id),
            step_index: Some(step_index),
            position,
            parent_turn: self.session.parent_turn_id,
            delegation,
            agent: AgentKind::parse(&profile.agent),
            model: profile.model.clone(),
            workdir: self.session.work_dir.clone().into(),
            project_dir: self.session.project_dir.clone().into(),
            prompt,
            extra_env: vec![],
        };

        let result = self.runner.run(&request, &self.events, &self.cancel).await?;

        turn.duration_seconds = result.duration.as_secs();
        match &result.outcome {
            TurnOutcome::Completed => {}
            TurnOutcome::Failed(message) => {
                warn!(turn = turn.id, error = %message, "turn failed");
                turn.failed = true;
                turn.outcome = message.clone();
            }
            TurnOutcome::Interrupted(kind) => {
                turn.interrupted = true;
                turn.outcome = format!("interrupted: {kind}");
            }
        }
        self.store.update_turn(&turn)?;
        self.store
            .clear_interrupts_for_turn(self.session.id, turn.id)?;

        run.turn_ids.push(turn.id);
        self.store.update_loop_run(run)?;

        // Incremental stats; a failure here never fails the run.
        if let Err(err) = self.stats.record_turn(&turn) {
            warn!(turn = turn.id, error = %err, "stats update failed");
        }

        // A user abort ends the run regardless of step policy.
        if matches!(
            result.outcome,
            TurnOutcome::Interrupted(InterruptKind::UserAbort)
        ) {
            return Ok(TurnVerdict::Stop(StopReason::Cancelled));
        }

        // Call-supervisor fast-forward: the marker names the target step.
        if let Some(signal) = self.store.pending_call_supervisor(self.session.id)? {
            self.store.clear_call_supervisor(self.session.id)?;
            let (target_cycle, target_step) = if signal.to_step > step_index {
                (cycle, signal.to_step)
            } else {
                (cycle + 1, signal.to_step)
            };
            return Ok(TurnVerdict::Jump {
                cycle: target_cycle,
                step_index: target_step,
            });
        }

        if self.store.is_loop_stopped(run.id)? {
            return Ok(TurnVerdict::Stop(StopReason::Stopped));
        }

        if turn.failed && step.on_fail == adaf_core::loop_run::StepFailurePolicy::FailRun {
            return Ok(TurnVerdict::Stop(StopReason::Failed));
        }

        Ok(TurnVerdict::Continue)
    }

    async fn finalize(&mut self, run: &mut LoopRun, reason: StopReason) -> Result<(), LoopError> {
        run.status = match reason {
            StopReason::Completed | StopReason::Stopped => LoopRunStatus::Completed,
            StopReason::Failed => LoopRunStatus::Failed,
            StopReason::Cancelled => LoopRunStatus::Cancelled,
        };
        run.stop_reason = Some(reason);
        run.ended_at = Some(Utc::now());
        self.store.update_loop_run(run)?;

        self.session.status = match reason {
            StopReason::Completed | StopReason::Stopped => SessionStatus::Done,
            StopReason::Failed => SessionStatus::Failed,
            StopReason::Cancelled => SessionStatus::Done,
        };
        self.store.update_session(&self.session)?;
        self.store.clear_session_signals(self.session.id)?;

        self.emit(RunnerEvent::LoopDone { reason }).await;
        info!(run = run.id, reason = %reason, "loop run finished");
        Ok(())
    }

    /// Expanded allow-list for a profile, from the session's snapshots.
    fn delegation_for(&self, profile_name: &str) -> Vec<String> {
        let cfg = GlobalConfig {
            profiles: self.session.profiles.clone(),
            teams: self.session.teams.clone(),
            ..GlobalConfig::default()
        };
        allowed_spawn_targets(&cfg, profile_name).unwrap_or_default()
    }

    /// Spawns recorded with a delegation violation become one
    /// `guardrail_violation` event each on the stream.
    async fn surface_guardrail_violations(&mut self) -> Result<(), LoopError> {
        let spawns = self.store.list_spawns()?;
        let mut found = Vec::new();
        for spawn in &spawns.records {
            if spawn.error.starts_with("delegation violation")
                && !self.reported_guardrails.contains(&spawn.id)
            {
                self.reported_guardrails.insert(spawn.id);
                found.push((spawn.parent_profile.clone(), spawn.child_profile.clone()));
            }
        }
        for (role, child) in found {
            self.emit(RunnerEvent::GuardrailViolation {
                role,
                tool: format!("spawn:{child}"),
            })
            .await;
        }
        Ok(())
    }

    fn active_spawn_entries(&self) -> Result<Vec<SpawnStatusEntry>, LoopError> {
        let spawns = self.store.list_spawns()?;
        Ok(spawns
            .records
            .into_iter()
            .filter(|s| !s.status.is_terminal())
            .map(|s| SpawnStatusEntry {
                id: s.id,
                child_profile: s.child_profile,
                task: s.task,
                status: s.status,
            })
            .collect())
    }

    fn unique_step_hex(&self, run: &LoopRun) -> Result<String, LoopError> {
        loop {
            let hex = adaf_core::ids::new_short_hex();
            if !run.step_hex_ids.values().any(|v| v == &hex) {
                return Ok(hex);
            }
        }
    }

    async fn emit(&self, event: RunnerEvent) {
        let _ = self.events.send(event).await;
    }
}
