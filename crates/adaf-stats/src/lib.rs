//! adaf-stats: per-profile and per-loop counters derived from turns and
//! recordings.

pub mod aggregate;
pub mod recording_scan;

pub use aggregate::{MigrateReport, StatsAggregator};
pub use recording_scan::{scan_recording, RecordingUsage};
