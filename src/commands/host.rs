//! `host` command implementation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::render;
use crate::cli::OutputFormat;
use crate::state::AppState;

#[derive(Serialize)]
struct HostReport {
    boot_time: Option<u64>,
    boot_time_utc: Option<DateTime<Utc>>,
    virtualization_system: String,
    virtualization_role: String,
    platform: String,
    platform_version: String,
}

pub fn command_host(state: &AppState, format: OutputFormat) -> anyhow::Result<()> {
    let use_cache = state.config.boot_time_cache.unwrap_or(true);
    let boot_time = match state.host.boot_time(use_cache) {
        Ok(t) => Some(t),
        Err(e) => {
            warn!("Boot time unavailable: {}", e);
            None
        }
    };
    let virt = state.host.virtualization();
    let (platform, platform_version) = state.host.os_release();

    let report = HostReport {
        boot_time,
        boot_time_utc: boot_time.and_then(|t| DateTime::<Utc>::from_timestamp(t as i64, 0)),
        virtualization_system: virt.system,
        virtualization_role: virt.role,
        platform,
        platform_version,
    };

    if let Some(out) = render(&report, format)? {
        println!("{out}");
        return Ok(());
    }

    let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
    match (report.boot_time, report.boot_time_utc) {
        (Some(t), Some(utc)) => println!("Boot time:      {} ({})", t, utc.to_rfc3339()),
        _ => println!("Boot time:      -"),
    }
    println!(
        "Virtualization: {} ({})",
        or_dash(&report.virtualization_system),
        or_dash(&report.virtualization_role)
    );
    println!(
        "OS release:     {} {}",
        or_dash(&report.platform),
        report.platform_version
    );
    Ok(())
}
