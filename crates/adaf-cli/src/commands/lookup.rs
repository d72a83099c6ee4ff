//! `adaf lookup`: resolve a short hex id across runs, steps, and turns.

use adaf_core::lookup::LookupMatch;

use crate::error::CliError;
use crate::runtime::{open_store, require_positional};

pub fn run(mut args: Vec<String>) -> Result<(), CliError> {
    let hex = require_positional(&mut args, "short hex id")?;
    let store = open_store()?;
    let matches = store.lookup(&hex)?;

    if matches.is_empty() {
        println!("no record matches {hex}");
        return Ok(());
    }

    for found in matches {
        match found {
            LookupMatch::LoopRun { kind, run, step_key } => match step_key {
                Some(key) => println!(
                    "loop run {} ({}) step {key} [{}]",
                    run.id,
                    run.loop_name,
                    kind.as_str()
                ),
                None => println!(
                    "loop run {} ({}) status {} [{}]",
                    run.id,
                    run.loop_name,
                    run.status,
                    kind.as_str()
                ),
            },
            LookupMatch::Turn { kind, turn } => println!(
                "turn {} ({} on {}) run-hex {} step-hex {} [{}]",
                turn.id,
                turn.profile,
                turn.date.format("%Y-%m-%d"),
                if turn.loop_run_hex_id.is_empty() { "-" } else { &turn.loop_run_hex_id },
                if turn.step_hex_id.is_empty() { "-" } else { &turn.step_hex_id },
                kind.as_str()
            ),
        }
    }
    Ok(())
}
