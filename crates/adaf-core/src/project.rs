//! Project record: the root anchor of an initialized repository.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One per repository, created by `init`, never deleted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    /// Absolute path of the repository the project anchors.
    pub repo_path: String,
    pub created_at: DateTime<Utc>,
    /// Free-form agent configuration (agent name -> executable/flags).
    #[serde(default)]
    pub agents: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Slug of the active plan; empty when none.
    #[serde(default)]
    pub active_plan: String,
}

impl Project {
    pub fn new(name: impl Into<String>, repo_path: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            repo_path: repo_path.into(),
            created_at: now,
            agents: BTreeMap::new(),
            metadata: BTreeMap::new(),
            active_plan: String::new(),
        }
    }
}
