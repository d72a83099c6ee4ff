//! `adaf init`: create the project store.

use adaf_core::project::Project;
use adaf_core::store::Store;
use chrono::Utc;

use crate::error::CliError;
use crate::runtime::take_flag;

pub fn run(mut args: Vec<String>) -> Result<(), CliError> {
    let cwd = std::env::current_dir().map_err(|e| CliError::io("resolve working dir", e))?;
    let name = take_flag(&mut args, "--name")?.unwrap_or_else(|| {
        cwd.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("project")
            .to_string()
    });

    let project = Project::new(name.clone(), cwd.to_string_lossy(), Utc::now());
    Store::init(&cwd, &project)?;
    println!("initialized project {name:?} at {}", cwd.display());
    Ok(())
}
