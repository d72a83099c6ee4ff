//! Shared CLI runtime helpers: project resolution, tokio bridge, argv
//! utilities.

use std::path::PathBuf;

use adaf_core::envctx::{RuntimeContext, ENV_PROJECT_DIR};
use adaf_core::store::{Store, STORE_DIR};

use crate::error::CliError;

/// Resolve the project directory: `ADAF_PROJECT_DIR` wins, otherwise walk
/// up from the working directory looking for `.adaf`.
pub fn find_project_dir() -> Result<PathBuf, CliError> {
    if let Ok(dir) = std::env::var(ENV_PROJECT_DIR) {
        let trimmed = dir.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    let cwd = std::env::current_dir().map_err(|e| CliError::io("resolve working dir", e))?;
    let mut dir = cwd.as_path();
    loop {
        if dir.join(STORE_DIR).is_dir() {
            return Ok(dir.to_path_buf());
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => {
                return Err(CliError::Usage(format!(
                    "no {STORE_DIR} directory found from {cwd:?}; run `adaf init` in the repository root"
                )))
            }
        }
    }
}

pub fn open_store() -> Result<Store, CliError> {
    Ok(Store::open(&find_project_dir()?)?)
}

pub fn context() -> RuntimeContext {
    RuntimeContext::from_env()
}

/// One multi-thread runtime per command invocation.
pub fn block_on<F: std::future::Future>(future: F) -> Result<F::Output, CliError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::io("start tokio runtime", e))?;
    Ok(runtime.block_on(future))
}

/// The daemon executable: a sibling of the current binary when present,
/// otherwise whatever `adaf-daemon` resolves to on PATH.
pub fn daemon_bin() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join("adaf-daemon")))
        .filter(|p| p.exists())
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "adaf-daemon".to_string())
}

/// Pull the value following a `--flag` out of argv, consuming both.
pub fn take_flag(args: &mut Vec<String>, flag: &str) -> Result<Option<String>, CliError> {
    if let Some(idx) = args.iter().position(|a| a == flag) {
        if idx + 1 >= args.len() {
            return Err(CliError::Usage(format!("missing value for {flag}")));
        }
        let value = args.remove(idx + 1);
        args.remove(idx);
        return Ok(Some(value));
    }
    Ok(None)
}

/// Presence-only flag.
pub fn take_switch(args: &mut Vec<String>, flag: &str) -> bool {
    if let Some(idx) = args.iter().position(|a| a == flag) {
        args.remove(idx);
        return true;
    }
    false
}

pub fn require_positional(args: &mut Vec<String>, what: &str) -> Result<String, CliError> {
    if args.is_empty() {
        return Err(CliError::Usage(format!("missing {what}")));
    }
    Ok(args.remove(0))
}

pub fn parse_id(raw: &str, what: &str) -> Result<u64, CliError> {
    raw.parse()
        .map_err(|_| CliError::Usage(format!("invalid {what}: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::{parse_id, take_flag, take_switch};

    #[test]
    fn take_flag_consumes_flag_and_value() {
        let mut args = vec![
            "--spawn-id".to_string(),
            "7".to_string(),
            "rest".to_string(),
        ];
        let value = match take_flag(&mut args, "--spawn-id") {
            Ok(v) => v,
            Err(e) => panic!("take: {e}"),
        };
        assert_eq!(value.as_deref(), Some("7"));
        assert_eq!(args, vec!["rest".to_string()]);
    }

    #[test]
    fn take_flag_without_value_is_usage_error() {
        let mut args = vec!["--answer".to_string()];
        assert!(take_flag(&mut args, "--answer").is_err());
    }

    #[test]
    fn take_switch_reports_presence() {
        let mut args = vec!["--ndjson".to_string(), "x".to_string()];
        assert!(take_switch(&mut args, "--ndjson"));
        assert!(!take_switch(&mut args, "--ndjson"));
        assert_eq!(args, vec!["x".to_string()]);
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id("12", "id").is_ok());
        assert!(parse_id("abc", "id").is_err());
    }
}
