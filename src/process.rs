//! Per-process CPU usage normalized by the process's allowed CPUs.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::error::{CpuError, Result};
use crate::sampler::{ProcessStat, Sampler};
use crate::stat::{PageFaultsStat, TimesStat};

/// A process of interest and the size of its affinity set.
///
/// The affinity set is read once at construction and never refreshed.
#[derive(Clone)]
pub struct ProcessHandle {
    pid: i32,
    allowed_cpus: usize,
    sampler: Arc<dyn Sampler>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("allowed_cpus", &self.allowed_cpus)
            .finish()
    }
}

impl ProcessHandle {
    pub fn new(pid: i32, sampler: Arc<dyn Sampler>) -> Result<Self> {
        let allowed_cpus = sampler.allowed_cpus(pid)?;
        debug!(pid, allowed_cpus, "Created process handle");
        Ok(Self {
            pid,
            allowed_cpus,
            sampler,
        })
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn allowed_cpus(&self) -> usize {
        self.allowed_cpus
    }

    /// Full stat sample of the process.
    pub fn stat(&self) -> Result<ProcessStat> {
        self.sampler.process_stat(self.pid, None)
    }

    /// Full stat sample of one of the process's threads.
    pub fn thread_stat(&self, tid: i32) -> Result<ProcessStat> {
        self.sampler.process_stat(self.pid, Some(tid))
    }

    pub fn times(&self) -> Result<TimesStat> {
        Ok(self.stat()?.cpu_times)
    }

    /// Creation time in epoch milliseconds.
    pub fn create_time(&self) -> Result<i64> {
        Ok(self.stat()?.create_time)
    }

    pub fn page_faults(&self) -> Result<PageFaultsStat> {
        Ok(self.stat()?.page_faults)
    }

    /// Lifetime CPU usage as a share of the allowed CPUs, `0..=100` for a
    /// process that never exceeds its affinity set.
    pub fn cpu_percent(&self) -> Result<f64> {
        let stat = self.stat()?;
        let elapsed = seconds_since_millis(stat.create_time);
        normalized_cpu_percent(stat.cpu_times.total(), elapsed, self.allowed_cpus)
            .map_err(|e| match e {
                CpuError::NoAllowedCpus { .. } => CpuError::NoAllowedCpus { pid: self.pid },
                other => other,
            })
    }
}

fn seconds_since_millis(create_time: i64) -> f64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    now - create_time as f64 / 1000.0
}

/// `100 * cpu_seconds / elapsed_seconds`, divided by `allowed_cpus`.
/// A non-positive elapsed time yields 0.
pub fn normalized_cpu_percent(cpu_seconds: f64, elapsed_seconds: f64, allowed_cpus: usize) -> Result<f64> {
    if allowed_cpus == 0 {
        return Err(CpuError::NoAllowedCpus { pid: 0 });
    }
    if elapsed_seconds <= 0.0 {
        return Ok(0.0);
    }
    let raw = 100.0 * cpu_seconds / elapsed_seconds;
    Ok(raw / allowed_cpus as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{HostPaths, HostRoot};
    use crate::sampler::LinuxSampler;
    use std::fs;

    /// Reports a process that started `age` seconds ago having used
    /// `cpu` seconds, pinned to `cpus` cores.
    struct FakeProcess {
        age: f64,
        cpu: f64,
        cpus: usize,
    }

    impl Sampler for FakeProcess {
        fn times(&self, _per_cpu: bool) -> Vec<TimesStat> {
            Vec::new()
        }

        fn process_stat(&self, pid: i32, _tid: Option<i32>) -> Result<ProcessStat> {
            let now_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_millis() as i64;
            Ok(ProcessStat {
                pid,
                cpu_times: TimesStat {
                    cpu: "cpu".to_string(),
                    user: self.cpu,
                    ..TimesStat::default()
                },
                create_time: now_ms - (self.age * 1000.0) as i64,
                ..ProcessStat::default()
            })
        }

        fn allowed_cpus(&self, _pid: i32) -> Result<usize> {
            Ok(self.cpus)
        }
    }

    #[test]
    fn test_normalized_percent() {
        // 1.5 cores busy out of 2 allowed.
        assert_eq!(normalized_cpu_percent(15.0, 10.0, 2).unwrap(), 75.0);
        assert_eq!(normalized_cpu_percent(15.0, 10.0, 1).unwrap(), 150.0);
        assert_eq!(normalized_cpu_percent(5.0, 0.0, 4).unwrap(), 0.0);
        assert_eq!(normalized_cpu_percent(5.0, -3.0, 4).unwrap(), 0.0);
        assert!(matches!(
            normalized_cpu_percent(5.0, 10.0, 0),
            Err(CpuError::NoAllowedCpus { .. })
        ));
    }

    #[test]
    fn test_handle_normalizes_by_affinity() {
        let sampler = Arc::new(FakeProcess {
            age: 1000.0,
            cpu: 1500.0,
            cpus: 2,
        });
        let handle = ProcessHandle::new(7, sampler).unwrap();
        assert_eq!(handle.allowed_cpus(), 2);
        let p = handle.cpu_percent().unwrap();
        assert!((p - 75.0).abs() < 0.1, "got {p}");
    }

    #[test]
    fn test_handle_future_create_time_is_zero() {
        let sampler = Arc::new(FakeProcess {
            age: -60.0,
            cpu: 10.0,
            cpus: 1,
        });
        let handle = ProcessHandle::new(7, sampler).unwrap();
        assert_eq!(handle.cpu_percent().unwrap(), 0.0);
    }

    #[test]
    fn test_handle_empty_affinity() {
        let sampler = Arc::new(FakeProcess {
            age: 10.0,
            cpu: 1.0,
            cpus: 0,
        });
        let handle = ProcessHandle::new(9, sampler).unwrap();
        assert!(matches!(
            handle.cpu_percent(),
            Err(CpuError::NoAllowedCpus { pid: 9 })
        ));
    }

    #[test]
    fn test_missing_process_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let paths = HostPaths::default().with_root(HostRoot::Proc, dir.path().to_string_lossy());
        let sampler = Arc::new(LinuxSampler::new(paths));
        let handle = ProcessHandle::new(std::process::id() as i32, sampler).unwrap();
        assert!(matches!(handle.cpu_percent(), Err(CpuError::Unreadable { .. })));
        assert!(handle.times().is_err());
    }

    #[test]
    fn test_accessors_from_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let pid = std::process::id() as i32;
        fs::create_dir_all(dir.path().join(pid.to_string())).unwrap();
        fs::write(dir.path().join("stat"), "btime 1600000000\n").unwrap();
        fs::write(
            dir.path().join(pid.to_string()).join("stat"),
            format!("{pid} (worker) R 1 1 1 0 -1 0 4 5 6 7 250 50 0 0 20 0 4 0 1000 0 0"),
        )
        .unwrap();
        let paths = HostPaths::default()
            .with_root(HostRoot::Proc, dir.path().to_string_lossy())
            .with_root(HostRoot::Etc, dir.path().join("etc").to_string_lossy())
            .with_root(HostRoot::Root, dir.path().join("root").to_string_lossy());
        let sampler = Arc::new(LinuxSampler::new(paths).with_clock_ticks(100));
        let handle = ProcessHandle::new(pid, sampler).unwrap();

        let times = handle.times().unwrap();
        assert!((times.total() - 3.0).abs() < 1e-9);
        assert_eq!(handle.create_time().unwrap(), 1_600_000_010_000);
        let faults = handle.page_faults().unwrap();
        assert_eq!(faults.minor_faults, 4);
        assert_eq!(faults.child_minor_faults, 5);
        assert_eq!(faults.major_faults, 6);
        assert_eq!(faults.child_major_faults, 7);

        let p = handle.cpu_percent().unwrap();
        assert!((0.0..=100.0).contains(&p));
    }
}
