//! `adaf stats-*`: migration and display of aggregated counters.

use std::io::Write;

use adaf_core::stats::StatsCounters;
use adaf_stats::aggregate::StatsAggregator;
use tabwriter::TabWriter;

use crate::error::CliError;
use crate::runtime::{open_store, take_flag};

pub fn migrate(_args: Vec<String>) -> Result<(), CliError> {
    let store = open_store()?;
    let aggregator = StatsAggregator::new(store);
    let report = aggregator.migrate()?;
    println!(
        "stats rebuilt from {} turns and {} spawns ({} corrupt records skipped)",
        report.turns_scanned, report.spawns_scanned, report.corrupt_turns
    );
    Ok(())
}

pub fn show(mut args: Vec<String>) -> Result<(), CliError> {
    let store = open_store()?;

    if let Some(profile) = take_flag(&mut args, "--profile")? {
        let Some(stats) = store.read_profile_stats(&profile)? else {
            println!("no stats recorded for profile {profile:?}");
            return Ok(());
        };
        render(&profile, &stats.counters);
        return Ok(());
    }
    if let Some(loop_name) = take_flag(&mut args, "--loop")? {
        let Some(stats) = store.read_loop_stats(&loop_name)? else {
            println!("no stats recorded for loop {loop_name:?}");
            return Ok(());
        };
        render(&loop_name, &stats.counters);
        return Ok(());
    }
    Err(CliError::Usage(
        "stats-show needs --profile <name> or --loop <name>".to_string(),
    ))
}

fn render(subject: &str, counters: &StatsCounters) {
    let mut tw = TabWriter::new(std::io::stdout());
    let _ = writeln!(tw, "stats for {subject}");
    let _ = writeln!(tw, "runs\t{}", counters.runs);
    let _ = writeln!(tw, "successes\t{}", counters.successes);
    let _ = writeln!(tw, "failures\t{}", counters.failures);
    let _ = writeln!(tw, "duration\t{}s", counters.duration_seconds);
    let _ = writeln!(tw, "cost\t${:.4}", counters.cost_usd);
    let _ = writeln!(
        tw,
        "tokens\t{} in / {} out",
        counters.input_tokens, counters.output_tokens
    );
    let _ = writeln!(tw, "spawns created\t{}", counters.spawns_created);
    for (tool, count) in &counters.tool_calls {
        let _ = writeln!(tw, "tool {tool}\t{count}");
    }
    for (parent, count) in &counters.spawned_by {
        let _ = writeln!(tw, "spawned by {parent}\t{count}");
    }
    if let Some(last) = counters.last_run_at {
        let _ = writeln!(tw, "last run\t{}", last.format("%Y-%m-%d %H:%M:%S"));
    }
    let _ = tw.flush();
}
