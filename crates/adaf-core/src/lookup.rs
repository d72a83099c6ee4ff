//! Short-hex lookup across loop runs and turns.
//!
//! A hex may name a loop run, a per-step record inside a run, or a turn;
//! turns are additionally indexed by the run and step hexes they reference.
//! One pass over both directories finds every match.

use serde::Serialize;

use crate::error::StoreError;
use crate::ids::is_short_hex;
use crate::loop_run::LoopRun;
use crate::store::Store;
use crate::turn::Turn;

/// Which indexed field matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupMatchKind {
    LoopRunHex,
    StepHex,
    TurnHex,
    TurnLoopRunHex,
    TurnStepHex,
}

impl LookupMatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoopRunHex => "loop_run_hex",
            Self::StepHex => "step_hex",
            Self::TurnHex => "turn_hex",
            Self::TurnLoopRunHex => "turn_loop_run_hex",
            Self::TurnStepHex => "turn_step_hex",
        }
    }
}

#[derive(Debug, Clone)]
pub enum LookupMatch {
    LoopRun {
        kind: LookupMatchKind,
        run: Box<LoopRun>,
        /// Set for step-hex matches: the `"<cycle>:<stepIndex>"` key.
        step_key: Option<String>,
    },
    Turn {
        kind: LookupMatchKind,
        turn: Box<Turn>,
    },
}

impl Store {
    /// Find every record the hex identifies. Returns an empty vec when
    /// nothing matches; malformed hexes fail validation up front.
    pub fn lookup(&self, hex: &str) -> Result<Vec<LookupMatch>, StoreError> {
        if !is_short_hex(hex) {
            return Err(StoreError::Validation(format!(
                "invalid short hex id {hex:?}: want 8 lowercase hex chars"
            )));
        }

        let mut matches = Vec::new();

        let runs = self.list_loop_runs()?;
        for run in runs.records {
            if run.hex_id == hex {
                matches.push(LookupMatch::LoopRun {
                    kind: LookupMatchKind::LoopRunHex,
                    run: Box::new(run),
                    step_key: None,
                });
                continue;
            }
            if let Some((key, _)) = run.step_hex_ids.iter().find(|(_, v)| v.as_str() == hex) {
                let key = key.clone();
                matches.push(LookupMatch::LoopRun {
                    kind: LookupMatchKind::StepHex,
                    run: Box::new(run),
                    step_key: Some(key),
                });
            }
        }

        let turns = self.list_turns()?;
        for turn in turns.records {
            let kind = if turn.hex_id == hex {
                LookupMatchKind::TurnHex
            } else if turn.loop_run_hex_id == hex {
                LookupMatchKind::TurnLoopRunHex
            } else if turn.step_hex_id == hex {
                LookupMatchKind::TurnStepHex
            } else {
                continue;
            };
            matches.push(LookupMatch::Turn {
                kind,
                turn: Box::new(turn),
            });
        }

        Ok(matches)
    }
}
