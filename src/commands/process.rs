//! `process` command implementation.

use anyhow::Context;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use cpuproc::percent::sleep;
use cpuproc::{ProcessHandle, ProcessStat};

use super::render;
use crate::cli::OutputFormat;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessReport {
    #[serde(flatten)]
    stat: ProcessStat,
    allowed_cpus: usize,
    cpu_percent: f64,
}

/// Samples one process (or one of its threads) `count` times.
pub async fn command_process(
    state: &AppState,
    pid: Option<i32>,
    tid: Option<i32>,
    count: Option<u64>,
    interval_ms: Option<u64>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let pid = pid.unwrap_or_else(|| std::process::id() as i32);
    let count = count.or(state.config.samples).unwrap_or(1);
    let pause = Duration::from_millis(interval_ms.or(state.config.interval_ms).unwrap_or(1000));

    let handle = ProcessHandle::new(pid, state.sampler.clone())
        .with_context(|| format!("failed to open process {pid}"))?;
    info!(pid, allowed_cpus = handle.allowed_cpus(), "Sampling process");

    for i in 0..count {
        if i > 0 {
            sleep(pause, &state.cancel).await?;
        }

        let stat = match tid {
            Some(tid) => handle.thread_stat(tid),
            None => handle.stat(),
        }
        .with_context(|| format!("failed to sample process {pid}"))?;
        let cpu_percent = handle.cpu_percent()?;

        let report = ProcessReport {
            stat,
            allowed_cpus: handle.allowed_cpus(),
            cpu_percent,
        };
        if let Some(out) = render(&report, format)? {
            println!("{out}");
        } else {
            print_text(&report);
        }
    }
    Ok(())
}

fn print_text(r: &ProcessReport) {
    let s = &r.stat;
    println!("{} (pid {}, ppid {})", s.name, s.pid, s.ppid);
    println!("   ├─ CPU: {:.2}% of {} allowed cores", r.cpu_percent, r.allowed_cpus);
    println!(
        "   ├─ Times: user={:.2}s system={:.2}s iowait={:.2}s",
        s.cpu_times.user, s.cpu_times.system, s.cpu_times.iowait
    );
    println!("   ├─ Created: {} ms since epoch", s.create_time);
    println!(
        "   ├─ Priority: nice={} rt={} tty={}",
        s.nice, s.rt_priority, s.terminal
    );
    println!(
        "   └─ Faults: minor={} major={} child_minor={} child_major={}",
        s.page_faults.minor_faults,
        s.page_faults.major_faults,
        s.page_faults.child_minor_faults,
        s.page_faults.child_major_faults
    );
}
