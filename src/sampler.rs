//! Point-in-time CPU counter sampling.
//!
//! [`Sampler`] is the seam between the percentage engine and the operating
//! system. [`LinuxSampler`] reads the proc filesystem; [`NullSampler`] stands
//! in on platforms without one and reports no data rather than failing.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::env::HostPaths;
use crate::error::{CpuError, Result};
use crate::fsutil::{read_file, read_lines, read_lines_offset_n};
use crate::host::HostInfo;
use crate::stat::{clock_ticks, parse_proc_stat, parse_stat_line, PageFaultsStat, TimesStat};

/// One decoded process (or thread) stat sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStat {
    pub pid: i32,
    pub name: String,
    pub terminal: u64,
    pub ppid: i32,
    pub cpu_times: TimesStat,
    /// Epoch milliseconds.
    pub create_time: i64,
    pub rt_priority: u32,
    pub nice: i32,
    pub page_faults: PageFaultsStat,
}

/// Source of CPU counter snapshots.
pub trait Sampler: Send + Sync {
    /// Aggregate (`per_cpu = false`, one `cpu-total` element) or per-core
    /// times. Read failures yield an empty vector, never an error.
    fn times(&self, per_cpu: bool) -> Vec<TimesStat>;

    /// Stat record of `pid`, or of thread `tid` within it. All-or-nothing.
    fn process_stat(&self, pid: i32, tid: Option<i32>) -> Result<ProcessStat>;

    /// Number of CPUs `pid` is allowed to run on.
    fn allowed_cpus(&self, pid: i32) -> Result<usize>;
}

/// Returns the sampler for the platform this crate was built for.
pub fn default_sampler(paths: HostPaths) -> Arc<dyn Sampler> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(LinuxSampler::new(paths))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = paths;
        Arc::new(NullSampler)
    }
}

/// Proc filesystem sampler.
#[derive(Debug)]
pub struct LinuxSampler {
    host: Arc<HostInfo>,
    ticks: u64,
    boot_time_cache: bool,
}

impl LinuxSampler {
    pub fn new(paths: HostPaths) -> Self {
        Self::with_host(Arc::new(HostInfo::new(paths)))
    }

    pub fn with_host(host: Arc<HostInfo>) -> Self {
        Self {
            host,
            ticks: clock_ticks(),
            boot_time_cache: true,
        }
    }

    /// Overrides the clock tick rate read from `sysconf`.
    pub fn with_clock_ticks(mut self, ticks: u64) -> Self {
        if ticks > 0 {
            self.ticks = ticks;
        }
        self
    }

    /// Disables boot time memoization, re-reading it on every process sample.
    pub fn with_boot_time_cache(mut self, enabled: bool) -> Self {
        self.boot_time_cache = enabled;
        self
    }

    pub fn host(&self) -> &Arc<HostInfo> {
        &self.host
    }

    pub fn clock_ticks(&self) -> u64 {
        self.ticks
    }

    fn stat_lines(&self, per_cpu: bool) -> Result<Vec<String>> {
        let path = self.host.paths().proc(&["stat"]);
        if !per_cpu {
            return read_lines_offset_n(&path, 0, Some(1));
        }
        // Skip the aggregate line, stop at the first non-cpu line.
        let lines = read_lines(&path)?;
        Ok(lines
            .into_iter()
            .skip(1)
            .take_while(|l| l.starts_with("cpu"))
            .collect())
    }
}

impl Sampler for LinuxSampler {
    fn times(&self, per_cpu: bool) -> Vec<TimesStat> {
        let lines = match self.stat_lines(per_cpu) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("CPU times unavailable: {}", e);
                return Vec::new();
            }
        };

        let ticks = self.ticks as f64;
        lines
            .iter()
            .filter_map(|line| match parse_stat_line(line, ticks) {
                Ok(ct) => Some(ct),
                Err(e) => {
                    debug!("Skipping stat line {:?}: {}", line, e);
                    None
                }
            })
            .collect()
    }

    fn process_stat(&self, pid: i32, tid: Option<i32>) -> Result<ProcessStat> {
        let pid_s = pid.to_string();
        let path = match tid {
            Some(tid) => {
                let tid_s = tid.to_string();
                self.host
                    .paths()
                    .proc(&[pid_s.as_str(), "task", tid_s.as_str(), "stat"])
            }
            None => self.host.paths().proc(&[pid_s.as_str(), "stat"]),
        };

        let content = read_file(&path)?;
        let rec = parse_proc_stat(&content)?;

        let boot_time = self
            .host
            .boot_time(self.boot_time_cache)
            .unwrap_or_else(|e| {
                warn!("Boot time unavailable, process create time is relative to the epoch: {}", e);
                0
            });

        Ok(ProcessStat {
            pid: rec.pid,
            name: rec.name.clone(),
            terminal: rec.terminal,
            ppid: rec.ppid,
            cpu_times: rec.cpu_times(self.ticks as f64),
            create_time: rec.create_time_millis(self.ticks, boot_time),
            rt_priority: rec.rt_priority,
            nice: process_nice(pid),
            page_faults: rec.page_faults,
        })
    }

    fn allowed_cpus(&self, pid: i32) -> Result<usize> {
        affinity_count(pid)
    }
}

/// Sampler for platforms without a proc filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSampler;

impl Sampler for NullSampler {
    fn times(&self, _per_cpu: bool) -> Vec<TimesStat> {
        Vec::new()
    }

    fn process_stat(&self, pid: i32, _tid: Option<i32>) -> Result<ProcessStat> {
        Ok(ProcessStat {
            pid,
            ..ProcessStat::default()
        })
    }

    fn allowed_cpus(&self, _pid: i32) -> Result<usize> {
        Ok(1)
    }
}

/// Nice value via `getpriority(2)`; the stat file's nice column is not
/// trusted across kernel versions.
fn process_nice(pid: i32) -> i32 {
    // SAFETY: getpriority has no memory preconditions. A return of -1 is
    // ambiguous with a real nice of -1 and is reported as-is.
    unsafe { libc::getpriority(libc::PRIO_PROCESS as _, pid as libc::id_t) }
}

#[cfg(target_os = "linux")]
fn affinity_count(pid: i32) -> Result<usize> {
    // SAFETY: cpu_set_t is plain data and sched_getaffinity writes at most
    // size_of::<cpu_set_t>() bytes into it.
    let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    let rc = unsafe {
        libc::sched_getaffinity(pid, std::mem::size_of::<libc::cpu_set_t>(), &mut set)
    };
    if rc != 0 {
        return Err(CpuError::last_os_error("sched_getaffinity"));
    }
    let count = unsafe { libc::CPU_COUNT(&set) };
    Ok(count.max(0) as usize)
}

#[cfg(not(target_os = "linux"))]
fn affinity_count(_pid: i32) -> Result<usize> {
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::HostRoot;
    use std::fs;
    use tempfile::TempDir;

    const STAT: &str = "cpu  400 0 200 1600 20 0 0 0 0 0\n\
                        cpu0 200 0 100 800 10 0 0 0 0 0\n\
                        cpu1 200 0 100 800 10 0 0 0 0 0\n\
                        intr 12345 0 0\n\
                        cpu9 1 1 1 1 1 1 1\n\
                        btime 1700000000\n";

    fn proc_root(stat: &str) -> (TempDir, LinuxSampler) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stat"), stat).unwrap();
        let paths = HostPaths::default()
            .with_root(HostRoot::Proc, dir.path().to_string_lossy())
            .with_root(HostRoot::Etc, dir.path().join("etc").to_string_lossy())
            .with_root(HostRoot::Root, dir.path().join("root").to_string_lossy());
        let sampler = LinuxSampler::new(paths).with_clock_ticks(100);
        (dir, sampler)
    }

    #[test]
    fn test_aggregate_times() {
        let (_dir, sampler) = proc_root(STAT);
        let times = sampler.times(false);
        assert_eq!(times.len(), 1);
        assert_eq!(times[0].cpu, "cpu-total");
        assert!((times[0].user - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_per_cpu_stops_at_first_non_cpu_line() {
        let (_dir, sampler) = proc_root(STAT);
        let times = sampler.times(true);
        let labels: Vec<&str> = times.iter().map(|t| t.cpu.as_str()).collect();
        assert_eq!(labels, vec!["cpu0", "cpu1"]);
    }

    #[test]
    fn test_per_cpu_skips_malformed_lines() {
        let (_dir, sampler) =
            proc_root("cpu 1 1 1 1 1 1 1\ncpu0 1 1 1 1 1 1 1\ncpu1 1 x 1 1 1 1 1\ncpu2 1 1\ncpu3 2 2 2 2 2 2 2\n");
        let labels: Vec<String> = sampler.times(true).into_iter().map(|t| t.cpu).collect();
        assert_eq!(labels, vec!["cpu0", "cpu3"]);
    }

    #[test]
    fn test_missing_stat_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = HostPaths::default()
            .with_root(HostRoot::Proc, dir.path().join("absent").to_string_lossy());
        let sampler = LinuxSampler::new(paths);
        assert!(sampler.times(false).is_empty());
        assert!(sampler.times(true).is_empty());
    }

    #[test]
    fn test_process_stat_from_fixture() {
        let (dir, sampler) = proc_root(STAT);
        let pid = std::process::id() as i32;
        let pid_dir = dir.path().join(pid.to_string());
        fs::create_dir_all(pid_dir.join("task").join("7")).unwrap();
        let record = format!(
            "{pid} (my (odd) proc) S 1 {pid} {pid} 0 -1 4194304 10 20 1 2 300 100 0 0 20 0 1 0 500 1000 100 0 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 4"
        );
        fs::write(pid_dir.join("stat"), &record).unwrap();
        fs::write(pid_dir.join("task").join("7").join("stat"), &record).unwrap();

        let stat = sampler.process_stat(pid, None).unwrap();
        assert_eq!(stat.name, "my (odd) proc");
        assert_eq!(stat.ppid, 1);
        assert_eq!(stat.terminal, 0);
        assert!((stat.cpu_times.user - 3.0).abs() < 1e-9);
        assert!((stat.cpu_times.system - 1.0).abs() < 1e-9);
        assert!((stat.cpu_times.iowait - 0.04).abs() < 1e-9);
        assert_eq!(stat.create_time, (1_700_000_000 + 5) * 1000);
        assert_eq!(stat.page_faults.minor_faults, 10);
        assert_eq!(stat.page_faults.child_minor_faults, 20);
        assert_eq!(stat.page_faults.major_faults, 1);
        assert_eq!(stat.page_faults.child_major_faults, 2);

        let thread = sampler.process_stat(pid, Some(7)).unwrap();
        assert_eq!(thread.cpu_times, stat.cpu_times);
    }

    #[test]
    fn test_process_stat_missing_is_fatal() {
        let (_dir, sampler) = proc_root(STAT);
        assert!(matches!(
            sampler.process_stat(999_999, None),
            Err(CpuError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_process_stat_malformed_is_fatal() {
        let (dir, sampler) = proc_root(STAT);
        fs::create_dir_all(dir.path().join("5")).unwrap();
        fs::write(dir.path().join("5").join("stat"), "5 (x) S 1 2").unwrap();
        assert!(matches!(
            sampler.process_stat(5, None),
            Err(CpuError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_allowed_cpus_for_self() {
        let (_dir, sampler) = proc_root(STAT);
        let n = sampler.allowed_cpus(std::process::id() as i32).unwrap();
        assert!(n >= 1);
    }

    #[test]
    fn test_null_sampler() {
        let s = NullSampler;
        assert!(s.times(true).is_empty());
        assert_eq!(s.process_stat(3, None).unwrap().create_time, 0);
        assert_eq!(s.allowed_cpus(3).unwrap(), 1);
    }
}
