//! Incremental and full-rebuild stats aggregation.
//!
//! Incremental mode applies one turn (or one spawn) at a time as the
//! daemon observes completions. `migrate` clears everything and re-derives
//! the same files from turns, recordings, and spawn records; starting from
//! empty, both paths produce identical output.

use adaf_core::spawn::Spawn;
use adaf_core::stats::{LoopStats, ProfileStats, StatsCounters};
use adaf_core::store::Store;
use adaf_core::turn::{BuildState, Turn};
use adaf_core::StoreError;
use tracing::debug;

use crate::recording_scan::{scan_recording, RecordingUsage};

pub struct StatsAggregator {
    store: Store,
}

impl StatsAggregator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    // -----------------------------------------------------------------
    // Incremental
    // -----------------------------------------------------------------

    /// Fold one completed turn into its profile's counters and, when the
    /// turn belongs to a run, its loop's counters.
    pub fn record_turn(&self, turn: &Turn) -> Result<(), StoreError> {
        let usage = scan_recording(&self.store.recording_path(turn.id))?;

        let mut profile_stats = self
            .store
            .read_profile_stats(&turn.profile)?
            .unwrap_or_else(|| ProfileStats {
                profile: turn.profile.clone(),
                ..ProfileStats::default()
            });
        apply_turn(&mut profile_stats.counters, turn, &usage);
        self.store.write_profile_stats(&profile_stats)?;

        if let Some(run_id) = turn.loop_run_id {
            let run = self.store.get_loop_run(run_id)?;
            if !run.loop_name.is_empty() {
                let mut loop_stats = self
                    .store
                    .read_loop_stats(&run.loop_name)?
                    .unwrap_or_else(|| LoopStats {
                        loop_name: run.loop_name.clone(),
                        ..LoopStats::default()
                    });
                apply_turn(&mut loop_stats.counters, turn, &usage);
                self.store.write_loop_stats(&loop_stats)?;
            }
        }
        debug!(turn = turn.id, profile = %turn.profile, "stats updated");
        Ok(())
    }

    /// Fold one spawn into the parent's spawns-created counter and the
    /// child's spawned-by histogram.
    pub fn record_spawn(&self, spawn: &Spawn) -> Result<(), StoreError> {
        let mut parent = self
            .store
            .read_profile_stats(&spawn.parent_profile)?
            .unwrap_or_else(|| ProfileStats {
                profile: spawn.parent_profile.clone(),
                ..ProfileStats::default()
            });
        parent.counters.spawns_created += 1;
        self.store.write_profile_stats(&parent)?;

        let mut child = self
            .store
            .read_profile_stats(&spawn.child_profile)?
            .unwrap_or_else(|| ProfileStats {
                profile: spawn.child_profile.clone(),
                ..ProfileStats::default()
            });
        *child
            .counters
            .spawned_by
            .entry(spawn.parent_profile.clone())
            .or_insert(0) += 1;
        self.store.write_profile_stats(&child)?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Migration
    // -----------------------------------------------------------------

    /// Clear all stats files and re-derive them from turns, recordings,
    /// and spawn records.
    pub fn migrate(&self) -> Result<MigrateReport, StoreError> {
        self.store.clear_stats()?;

        let turns = self.store.list_turns()?;
        for turn in &turns.records {
            self.record_turn(turn)?;
        }

        let spawns = self.store.list_spawns()?;
        for spawn in &spawns.records {
            self.record_spawn(spawn)?;
        }

        Ok(MigrateReport {
            turns_scanned: turns.records.len(),
            spawns_scanned: spawns.records.len(),
            corrupt_turns: turns.corrupt.len(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrateReport {
    pub turns_scanned: usize,
    pub spawns_scanned: usize,
    pub corrupt_turns: usize,
}

fn apply_turn(counters: &mut StatsCounters, turn: &Turn, usage: &RecordingUsage) {
    counters.runs += 1;
    if turn.failed || turn.build_state == BuildState::Failing {
        counters.failures += 1;
    } else if turn.build_state == BuildState::Passing {
        counters.successes += 1;
    }
    counters.duration_seconds += turn.duration_seconds;
    counters.cost_usd += usage.cost_usd;
    counters.input_tokens += usage.input_tokens;
    counters.output_tokens += usage.output_tokens;
    for (tool, count) in &usage.tool_calls {
        *counters.tool_calls.entry(tool.clone()).or_insert(0) += count;
    }
    counters.last_run_at = match counters.last_run_at {
        Some(prev) if prev >= turn.date => Some(prev),
        _ => Some(turn.date),
    };
    counters.push_recent_turn(turn.id);
}
