//! `adaf plan`: plan CRUD, thin shell over store operations.

use std::io::Write;

use adaf_core::plan::{Plan, PlanStatus};
use chrono::Utc;
use tabwriter::TabWriter;

use crate::error::CliError;
use crate::runtime::{open_store, require_positional, take_flag};

pub fn run(mut args: Vec<String>) -> Result<(), CliError> {
    let action = require_positional(&mut args, "plan action (create|list|activate|done|cancel|delete)")?;
    let store = open_store()?;

    match action.as_str() {
        "create" => {
            let id = require_positional(&mut args, "plan id")?;
            let title = take_flag(&mut args, "--title")?.unwrap_or_else(|| id.clone());
            let description = take_flag(&mut args, "--description")?.unwrap_or_default();
            let now = Utc::now();
            store.create_plan(&Plan {
                id: id.clone(),
                title,
                description,
                status: PlanStatus::Active,
                created_at: now,
                updated_at: now,
            })?;
            println!("plan {id:?} created and activated");
        }
        "list" => {
            let plans = store.list_plans()?;
            let mut tw = TabWriter::new(std::io::stdout());
            let _ = writeln!(tw, "ID\tSTATUS\tTITLE");
            for plan in plans {
                let _ = writeln!(tw, "{}\t{}\t{}", plan.id, plan.status, plan.title);
            }
            let _ = tw.flush();
        }
        "activate" => {
            let id = require_positional(&mut args, "plan id")?;
            let mut plan = store.get_plan(&id)?;
            plan.status = PlanStatus::Active;
            plan.updated_at = Utc::now();
            store.update_plan(&plan)?;
            store.set_active_plan(&id)?;
            println!("plan {id:?} activated");
        }
        "done" => {
            let id = require_positional(&mut args, "plan id")?;
            store.complete_plan(&id)?;
            println!("plan {id:?} done; its open issues and wiki entries are now shared");
        }
        "cancel" => {
            let id = require_positional(&mut args, "plan id")?;
            store.cancel_plan(&id)?;
            println!("plan {id:?} cancelled; its open issues are now wontfix");
        }
        "delete" => {
            let id = require_positional(&mut args, "plan id")?;
            store.delete_plan(&id)?;
            println!("plan {id:?} deleted");
        }
        other => {
            return Err(CliError::Usage(format!(
                "unknown plan action {other:?} (want create|list|activate|done|cancel|delete)"
            )))
        }
    }
    Ok(())
}
