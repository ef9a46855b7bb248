//! Application state shared by the CLI commands.
//!
//! Built once in `main` from the effective configuration: one host info
//! (boot time and virtualization memo), one sampler, one percentage engine
//! (last-sample cache) and the cancellation token fired by shutdown signals.

use cpuproc::config::Config;
use cpuproc::{CpuPercent, HostInfo, Sampler};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct AppState {
    pub config: Config,
    pub host: Arc<HostInfo>,
    pub sampler: Arc<dyn Sampler>,
    pub engine: CpuPercent,
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, cancel: CancellationToken) -> Self {
        let host = Arc::new(HostInfo::new(config.host_paths()));
        let sampler = build_sampler(&config, host.clone());
        let engine = CpuPercent::new(sampler.clone());
        Self {
            config,
            host,
            sampler,
            engine,
            cancel,
        }
    }
}

#[cfg(target_os = "linux")]
fn build_sampler(config: &Config, host: Arc<HostInfo>) -> Arc<dyn Sampler> {
    let mut sampler = cpuproc::LinuxSampler::with_host(host)
        .with_boot_time_cache(config.boot_time_cache.unwrap_or(true));
    if let Some(ticks) = config.clock_ticks {
        sampler = sampler.with_clock_ticks(ticks);
    }
    Arc::new(sampler)
}

#[cfg(not(target_os = "linux"))]
fn build_sampler(_config: &Config, _host: Arc<HostInfo>) -> Arc<dyn Sampler> {
    Arc::new(cpuproc::NullSampler)
}
