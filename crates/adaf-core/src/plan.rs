//! Plans: user-declared units of work with slug IDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Maximum slug length including the leading character.
const MAX_SLUG_LEN: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Active,
    Frozen,
    Done,
    Cancelled,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Frozen => "frozen",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "active" => Ok(Self::Active),
            "frozen" => Ok(Self::Frozen),
            "done" => Ok(Self::Done),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(StoreError::Validation(format!(
                "invalid plan status: {other:?}"
            ))),
        }
    }

    /// Only done/cancelled plans are deletable.
    pub fn is_deletable(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Slug matching `^[a-z0-9][a-z0-9-]{0,63}$`.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validate a plan slug: lowercase alphanumeric start, then alphanumeric or
/// dash, at most 64 chars.
pub fn validate_plan_id(id: &str) -> Result<(), StoreError> {
    let bytes = id.as_bytes();
    let valid_head = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let valid_tail = |b: u8| valid_head(b) || b == b'-';

    let ok = match bytes.split_first() {
        Some((head, tail)) => {
            bytes.len() <= MAX_SLUG_LEN && valid_head(*head) && tail.iter().all(|b| valid_tail(*b))
        }
        None => false,
    };
    if ok {
        Ok(())
    } else {
        Err(StoreError::Validation(format!(
            "invalid plan id {id:?}: must match ^[a-z0-9][a-z0-9-]{{0,63}}$"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_plan_id, PlanStatus};

    #[test]
    fn slug_validation_accepts_spec_shapes() {
        for id in ["p1", "refactor-auth", "0day", "a"] {
            assert!(validate_plan_id(id).is_ok(), "expected {id:?} valid");
        }
    }

    #[test]
    fn slug_validation_rejects_bad_shapes() {
        for id in ["", "-lead", "UPPER", "has space", "x".repeat(65).as_str()] {
            assert!(validate_plan_id(id).is_err(), "expected {id:?} invalid");
        }
    }

    #[test]
    fn status_roundtrip_and_deletability() {
        for status in [
            PlanStatus::Active,
            PlanStatus::Frozen,
            PlanStatus::Done,
            PlanStatus::Cancelled,
        ] {
            let parsed = match PlanStatus::parse(status.as_str()) {
                Ok(s) => s,
                Err(e) => panic!("parse {status}: {e}"),
            };
            assert_eq!(parsed, status);
        }
        assert!(!PlanStatus::Active.is_deletable());
        assert!(!PlanStatus::Frozen.is_deletable());
        assert!(PlanStatus::Done.is_deletable());
        assert!(PlanStatus::Cancelled.is_deletable());
    }
}
