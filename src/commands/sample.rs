//! `total`, `per-cpu` and `times` commands.

use anyhow::Context;
use std::time::Duration;
use tracing::{debug, info};

use cpuproc::config::{DEFAULT_INTERVAL_MS, DEFAULT_SAMPLES};
use cpuproc::percent::sleep;
use cpuproc::TimesStat;

use super::render;
use crate::cli::OutputFormat;
use crate::state::AppState;

/// Pause between since-last-call prints.
const SINCE_LAST_CALL_PAUSE: Duration = Duration::from_secs(1);

/// Prints busy percentages `count` times.
///
/// A non-zero interval measures across that interval; zero diffs against
/// the previous print (the first against the startup baseline).
pub async fn command_percent(
    state: &AppState,
    per_cpu: bool,
    interval_ms: Option<u64>,
    count: Option<u64>,
) -> anyhow::Result<()> {
    let interval_ms = interval_ms
        .or(state.config.interval_ms)
        .unwrap_or(DEFAULT_INTERVAL_MS);
    let count = count.or(state.config.samples).unwrap_or(DEFAULT_SAMPLES);
    let interval = Duration::from_millis(interval_ms);

    info!(per_cpu, interval_ms, count, "Sampling CPU percent");

    for i in 0..count {
        if interval.is_zero() {
            // Give the counters something to diff.
            sleep(SINCE_LAST_CALL_PAUSE, &state.cancel).await?;
        }

        let percents = state
            .engine
            .percent(interval, per_cpu, &state.cancel)
            .await
            .context("failed to compute CPU percent")?;
        debug!(sample = i + 1, ?percents, "CPU percent sample");

        if per_cpu {
            let line: Vec<String> = percents
                .iter()
                .enumerate()
                .map(|(core, p)| format!("cpu{core}={p:.1}%"))
                .collect();
            println!("{}", line.join(" "));
        } else {
            match percents.first() {
                Some(p) => println!("{p:.1}%"),
                None => println!("n/a"),
            }
        }
    }
    Ok(())
}

/// Dumps the current counters.
pub fn command_times(state: &AppState, per_cpu: bool, format: OutputFormat) -> anyhow::Result<()> {
    let times = state.engine.times(per_cpu);
    if times.is_empty() {
        anyhow::bail!("no CPU times available");
    }

    if let Some(out) = render(&times, format)? {
        println!("{out}");
        return Ok(());
    }

    println!(
        "{:<10} {:>12} {:>10} {:>12} {:>14} {:>10} {:>8} {:>10} {:>8} {:>8} {:>10}",
        "cpu", "user", "nice", "system", "idle", "iowait", "irq", "softirq", "steal", "guest", "guest_nice"
    );
    for t in &times {
        println!("{}", format_times_row(t));
    }
    Ok(())
}

fn format_times_row(t: &TimesStat) -> String {
    format!(
        "{:<10} {:>12.2} {:>10.2} {:>12.2} {:>14.2} {:>10.2} {:>8.2} {:>10.2} {:>8.2} {:>8.2} {:>10.2}",
        t.cpu, t.user, t.nice, t.system, t.idle, t.iowait, t.irq, t.softirq, t.steal, t.guest, t.guest_nice
    )
}
