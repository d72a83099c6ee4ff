//! Delegation allow-list expansion.
//!
//! A profile may spawn a target profile when the target appears in its
//! `spawnable_profiles`, or in the transitive expansion of its `team`
//! reference. Expansion is cycle-safe and deterministic.

use std::collections::BTreeSet;

use crate::config::GlobalConfig;
use crate::error::StoreError;

/// The set of profiles `profile` is allowed to spawn, sorted.
pub fn allowed_spawn_targets(
    cfg: &GlobalConfig,
    profile_name: &str,
) -> Result<Vec<String>, StoreError> {
    let profile = cfg.profile(profile_name)?;

    let mut allowed: BTreeSet<String> = profile
        .spawnable_profiles
        .iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    if !profile.team.trim().is_empty() {
        expand_team(cfg, profile.team.trim(), &mut allowed, &mut BTreeSet::new());
    }

    Ok(allowed.into_iter().collect())
}

/// Whether `parent` may spawn `child`. The decision carries the expanded
/// allow-list so guardrail reports can name what was permitted.
pub struct DelegationDecision {
    pub allowed: bool,
    pub allow_list: Vec<String>,
}

pub fn check_delegation(
    cfg: &GlobalConfig,
    parent_profile: &str,
    child_profile: &str,
) -> Result<DelegationDecision, StoreError> {
    let allow_list = allowed_spawn_targets(cfg, parent_profile)?;
    let allowed = allow_list.iter().any(|p| p == child_profile);
    Ok(DelegationDecision {
        allowed,
        allow_list,
    })
}

fn expand_team(
    cfg: &GlobalConfig,
    team_name: &str,
    out: &mut BTreeSet<String>,
    visited: &mut BTreeSet<String>,
) {
    if !visited.insert(team_name.to_string()) {
        return;
    }
    let Some(team) = cfg.teams.get(team_name) else {
        return;
    };
    for profile in &team.delegation.profiles {
        let trimmed = profile.trim();
        if !trimmed.is_empty() {
            out.insert(trimmed.to_string());
        }
    }
    for sub in &team.delegation.teams {
        expand_team(cfg, sub.trim(), out, visited);
    }
}
