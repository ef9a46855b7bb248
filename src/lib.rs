//! cpuproc - host and per-process CPU utilization from /proc counters.
//!
//! The crate samples the kernel's CPU time counters (`/proc/stat` and
//! `/proc/<pid>/stat`), diffs successive snapshots and turns them into busy
//! percentages.
//!
//! ```no_run
//! use std::time::Duration;
//! use cpuproc::{default_sampler, CpuPercent, HostPaths, ProcessHandle};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> cpuproc::Result<()> {
//! let sampler = default_sampler(HostPaths::default());
//! let engine = CpuPercent::new(sampler.clone());
//! let cancel = CancellationToken::new();
//!
//! let total = engine.percent_total(Duration::from_secs(1), &cancel).await?;
//! let per_core = engine.percent(Duration::ZERO, true, &cancel).await?;
//!
//! let me = ProcessHandle::new(std::process::id() as i32, sampler)?;
//! let mine = me.cpu_percent()?;
//! # let _ = (total, per_core, mine);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod fsutil;
pub mod host;
pub mod percent;
pub mod process;
pub mod sampler;
pub mod stat;

pub use env::{EnvMap, HostPaths, HostRoot};
pub use error::{CpuError, Result};
pub use host::{HostInfo, Virtualization};
pub use percent::{calculate_all_busy, calculate_busy, CpuPercent, LastSampleCache};
pub use process::ProcessHandle;
pub use sampler::{default_sampler, LinuxSampler, NullSampler, ProcessStat, Sampler};
pub use stat::{PageFaultsStat, TimesStat};
