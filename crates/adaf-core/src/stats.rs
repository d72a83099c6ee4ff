//! Denormalized per-profile and per-loop counters.
//!
//! Everything here is recomputable from turns plus recordings; `stats
//! migrate` does exactly that.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How many recent turn IDs a stats record keeps.
pub const RECENT_TURNS_KEPT: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsCounters {
    pub runs: u64,
    pub successes: u64,
    pub failures: u64,
    pub duration_seconds: u64,
    pub cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Call count per tool name.
    #[serde(default)]
    pub tool_calls: BTreeMap<String, u64>,
    pub spawns_created: u64,
    /// How often each parent profile spawned this one.
    #[serde(default)]
    pub spawned_by: BTreeMap<String, u64>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    /// Most recent turn IDs, newest last, bounded by [`RECENT_TURNS_KEPT`].
    #[serde(default)]
    pub recent_turn_ids: Vec<u64>,
}

impl StatsCounters {
    pub fn push_recent_turn(&mut self, turn_id: u64) {
        self.recent_turn_ids.push(turn_id);
        if self.recent_turn_ids.len() > RECENT_TURNS_KEPT {
            let excess = self.recent_turn_ids.len() - RECENT_TURNS_KEPT;
            self.recent_turn_ids.drain(..excess);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub profile: String,
    #[serde(flatten)]
    pub counters: StatsCounters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopStats {
    pub loop_name: String,
    #[serde(flatten)]
    pub counters: StatsCounters,
}

#[cfg(test)]
mod tests {
    use super::{StatsCounters, RECENT_TURNS_KEPT};

    #[test]
    fn recent_turns_list_is_bounded() {
        let mut counters = StatsCounters::default();
        for id in 0..(RECENT_TURNS_KEPT as u64 + 5) {
            counters.push_recent_turn(id);
        }
        assert_eq!(counters.recent_turn_ids.len(), RECENT_TURNS_KEPT);
        assert_eq!(counters.recent_turn_ids[0], 5);
        assert_eq!(
            *counters
                .recent_turn_ids
                .last()
                .unwrap_or(&0),
            RECENT_TURNS_KEPT as u64 + 4
        );
    }
}
