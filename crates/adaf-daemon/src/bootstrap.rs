//! Daemon constants, options, and logging setup.

use std::path::Path;
use std::time::Duration;

/// Default per-subscriber fan-out queue depth.
pub const DEFAULT_FANOUT_CAPACITY: usize = 256;

/// Default heartbeat refresh interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// What to do with a subscriber whose queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the slow subscriber; the producer never blocks.
    #[default]
    DropSubscriber,
    /// Apply backpressure to the producer until the subscriber drains.
    Block,
}

#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub fanout_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub heartbeat_interval: Duration,
    /// Path of the daemon executable, used when forking nested sessions.
    pub daemon_bin: String,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            fanout_capacity: DEFAULT_FANOUT_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            daemon_bin: "adaf-daemon".to_string(),
        }
    }
}

/// Install a tracing subscriber writing to the session log file. Honors
/// `ADAF_LOG` for the filter (default `info`).
pub fn init_logging(log_path: &Path) -> Result<(), std::io::Error> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let filter = tracing_subscriber::EnvFilter::try_from_env("ADAF_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Arc::new(file))
        .with_ansi(false)
        .finish();
    // A second init in-process (tests) is fine to ignore.
    let _ = tracing::subscriber::set_global_default(subscriber);
    Ok(())
}
