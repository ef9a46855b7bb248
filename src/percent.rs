//! Busy-percentage computation over CPU time snapshots.
//!
//! Two modes are offered by [`CpuPercent`]:
//! - interval mode samples, sleeps, samples again and diffs the pair. It
//!   touches no shared state.
//! - since-last-call mode (zero interval) diffs a fresh sample against the
//!   one stored by the previous call and replaces it. The stored samples live
//!   in a [`LastSampleCache`] owned by the engine.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{CpuError, Result};
use crate::sampler::Sampler;
use crate::stat::TimesStat;

/// Returns `(total, busy)` seconds. Guest time is already part of user and
/// nice on Linux, so it is taken out of the total to avoid counting it twice.
fn all_busy(t: &TimesStat) -> (f64, f64) {
    let mut total = t.total();
    if cfg!(target_os = "linux") {
        total -= t.guest; // Linux 2.6.24+
        total -= t.guest_nice; // Linux 3.2.0+
    }
    let busy = total - t.idle - t.iowait;
    (total, busy)
}

/// Busy percentage between two snapshots of the same CPU, in `[0, 100]`.
pub fn calculate_busy(t1: &TimesStat, t2: &TimesStat) -> f64 {
    let (t1_all, t1_busy) = all_busy(t1);
    let (t2_all, t2_busy) = all_busy(t2);

    // Counter reset or no work done.
    if t2_busy <= t1_busy {
        return 0.0;
    }
    // Busy time grew without elapsed total time.
    if t2_all <= t1_all {
        return 100.0;
    }
    ((t2_busy - t1_busy) / (t2_all - t1_all) * 100.0).clamp(0.0, 100.0)
}

/// Pairs snapshots by position. Both sequences must come from the same mode.
pub fn calculate_all_busy(t1: &[TimesStat], t2: &[TimesStat]) -> Result<Vec<f64>> {
    if t1.len() != t2.len() {
        return Err(CpuError::ShapeMismatch {
            previous: t1.len(),
            current: t2.len(),
        });
    }
    Ok(t1
        .iter()
        .zip(t2)
        .map(|(a, b)| calculate_busy(a, b))
        .collect())
}

/// Sleeps for `interval` unless `cancel` fires first.
pub async fn sleep(interval: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(CpuError::Cancelled),
        _ = tokio::time::sleep(interval) => Ok(()),
    }
}

#[derive(Debug, Default)]
struct LastSamples {
    aggregate: Option<Vec<TimesStat>>,
    per_cpu: Option<Vec<TimesStat>>,
}

impl LastSamples {
    fn slot(&mut self, per_cpu: bool) -> &mut Option<Vec<TimesStat>> {
        if per_cpu {
            &mut self.per_cpu
        } else {
            &mut self.aggregate
        }
    }
}

/// Most recent aggregate and per-core samples, one slot each.
#[derive(Debug, Default)]
pub struct LastSampleCache {
    inner: Mutex<LastSamples>,
}

impl LastSampleCache {
    /// A cache with no baseline; the first since-last-call request fails
    /// with [`CpuError::NoBaseline`].
    pub fn empty() -> Self {
        Self::default()
    }

    /// A cache seeded with one sample of each mode. An empty sample is still
    /// stored as the baseline.
    pub fn primed(sampler: &dyn Sampler) -> Self {
        let cache = Self::empty();
        {
            let mut last = cache.lock();
            last.aggregate = Some(sampler.times(false));
            last.per_cpu = Some(sampler.times(true));
        }
        cache
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LastSamples> {
        // Slots are replaced whole, so a poisoned guard still holds a valid sample.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes a new sample, diffs it against the stored one and stores it,
    /// all under one lock so concurrent callers see consecutive baselines.
    pub fn advance<F>(&self, per_cpu: bool, sample: F) -> Result<Vec<f64>>
    where
        F: FnOnce() -> Vec<TimesStat>,
    {
        let mut last = self.lock();
        let current = sample();
        let slot = last.slot(per_cpu);
        let result = match slot.as_deref() {
            Some(previous) => calculate_all_busy(previous, &current),
            None => Err(CpuError::NoBaseline { per_cpu }),
        };
        *slot = Some(current);
        result
    }

    /// Returns a copy of the stored sample for the mode.
    pub fn last(&self, per_cpu: bool) -> Option<Vec<TimesStat>> {
        self.lock().slot(per_cpu).clone()
    }
}

/// CPU percentage engine bound to one sampler and one last-sample cache.
pub struct CpuPercent {
    sampler: Arc<dyn Sampler>,
    last: LastSampleCache,
}

impl CpuPercent {
    /// Creates an engine whose since-last-call baseline is taken now.
    pub fn new(sampler: Arc<dyn Sampler>) -> Self {
        let last = LastSampleCache::primed(sampler.as_ref());
        Self { sampler, last }
    }

    /// Creates an engine with an explicit cache.
    pub fn with_cache(sampler: Arc<dyn Sampler>, last: LastSampleCache) -> Self {
        Self { sampler, last }
    }

    pub fn sampler(&self) -> &Arc<dyn Sampler> {
        &self.sampler
    }

    /// Current aggregate or per-core snapshot.
    pub fn times(&self, per_cpu: bool) -> Vec<TimesStat> {
        self.sampler.times(per_cpu)
    }

    /// Busy percentage per element of the chosen mode.
    ///
    /// A zero `interval` compares against the previous call; otherwise the
    /// call sleeps for `interval` and compares the samples around the sleep.
    #[instrument(skip(self, cancel))]
    pub async fn percent(
        &self,
        interval: Duration,
        per_cpu: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<f64>> {
        if interval.is_zero() {
            return self.percent_since_last_call(per_cpu);
        }

        let t1 = self.sampler.times(per_cpu);
        sleep(interval, cancel).await?;
        let t2 = self.sampler.times(per_cpu);

        debug!(cpus = t2.len(), "Sampled CPU times across interval");
        calculate_all_busy(&t1, &t2)
    }

    /// Aggregate busy percentage.
    pub async fn percent_total(&self, interval: Duration, cancel: &CancellationToken) -> Result<f64> {
        let rv = self.percent(interval, false, cancel).await?;
        rv.first().copied().ok_or(CpuError::NoData)
    }

    /// Since-last-call mode without the async wrapper.
    pub fn percent_since_last_call(&self, per_cpu: bool) -> Result<Vec<f64>> {
        self.last.advance(per_cpu, || self.sampler.times(per_cpu))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{HostPaths, HostRoot};
    use crate::sampler::{LinuxSampler, ProcessStat};
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn ts(busy: f64, idle: f64) -> TimesStat {
        TimesStat {
            cpu: "cpu-total".to_string(),
            user: busy,
            idle,
            ..TimesStat::default()
        }
    }

    /// Hands out scripted samples in order, repeating the last one.
    struct Scripted {
        samples: Mutex<VecDeque<Vec<TimesStat>>>,
    }

    impl Scripted {
        fn new(samples: Vec<Vec<TimesStat>>) -> Arc<Self> {
            Arc::new(Self {
                samples: Mutex::new(samples.into()),
            })
        }
    }

    impl Sampler for Scripted {
        fn times(&self, _per_cpu: bool) -> Vec<TimesStat> {
            let mut q = self.samples.lock().unwrap();
            if q.len() > 1 {
                q.pop_front().unwrap()
            } else {
                q.front().cloned().unwrap_or_default()
            }
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

    /// Every sample adds one busy and one idle second.
    struct Ticking {
        n: AtomicU64,
    }

    impl Sampler for Ticking {
        fn times(&self, _per_cpu: bool) -> Vec<TimesStat> {
            let n = self.n.fetch_add(1, Ordering::SeqCst) as f64;
            vec![ts(n, n)]
        }

        fn process_stat(&self, _pid: i32, _tid: Option<i32>) -> Result<ProcessStat> {
            Ok(ProcessStat::default())
        }

        fn allowed_cpus(&self, _pid: i32) -> Result<usize> {
            Ok(1)
        }
    }

    #[test]
    fn test_busy_percentage() {
        assert_eq!(calculate_busy(&ts(10.0, 10.0), &ts(15.0, 15.0)), 50.0);
        assert_eq!(calculate_busy(&ts(10.0, 10.0), &ts(20.0, 10.0)), 100.0);
        let p = calculate_busy(&ts(0.0, 0.0), &ts(1.0, 3.0));
        assert!((p - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_busy_regression_is_zero() {
        assert_eq!(calculate_busy(&ts(10.0, 10.0), &ts(10.0, 20.0)), 0.0);
        // Counter reset: everything went backwards.
        assert_eq!(calculate_busy(&ts(500.0, 500.0), &ts(1.0, 1.0)), 0.0);
    }

    #[test]
    fn test_degenerate_total_saturates() {
        // Busy grew while total shrank: idle went backwards.
        assert_eq!(calculate_busy(&ts(10.0, 10.0), &ts(12.0, 5.0)), 100.0);
        // Busy grew, total unchanged.
        assert_eq!(calculate_busy(&ts(10.0, 10.0), &ts(12.0, 8.0)), 100.0);
    }

    #[test]
    fn test_clamp_invariant() {
        let values = [0.0, 0.5, 1.0, 3.0, 10.0, 250.0];
        for &b1 in &values {
            for &i1 in &values {
                for &b2 in &values {
                    for &i2 in &values {
                        let p = calculate_busy(&ts(b1, i1), &ts(b2, i2));
                        assert!((0.0..=100.0).contains(&p), "{b1} {i1} {b2} {i2} -> {p}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_iowait_counts_as_idle() {
        let a = TimesStat {
            iowait: 0.0,
            ..ts(0.0, 0.0)
        };
        let b = TimesStat {
            iowait: 2.0,
            ..ts(2.0, 0.0)
        };
        assert_eq!(calculate_busy(&a, &b), 50.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_guest_time_not_double_counted() {
        // Guest time is folded into user by the kernel.
        let a = ts(0.0, 0.0);
        let b = TimesStat {
            guest: 1.0,
            guest_nice: 1.0,
            ..ts(2.0, 2.0)
        };
        assert_eq!(calculate_busy(&a, &b), 50.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let one = vec![ts(1.0, 1.0)];
        let two = vec![ts(1.0, 1.0), ts(2.0, 2.0)];
        assert!(matches!(
            calculate_all_busy(&one, &two),
            Err(CpuError::ShapeMismatch {
                previous: 1,
                current: 2
            })
        ));
        assert!(matches!(
            calculate_all_busy(&two, &one),
            Err(CpuError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_since_last_call_uses_previous_sample() {
        let sampler = Scripted::new(vec![
            vec![ts(0.0, 0.0)],
            vec![ts(0.0, 0.0)],
            vec![ts(1.0, 1.0)],
            vec![ts(4.0, 1.0)],
        ]);
        // Priming consumes the first two samples (aggregate, per-cpu).
        let engine = CpuPercent::new(sampler);
        assert_eq!(engine.percent_since_last_call(false).unwrap(), vec![50.0]);
        assert_eq!(engine.percent_since_last_call(false).unwrap(), vec![100.0]);
        // Repeated final sample: nothing changed.
        assert_eq!(engine.percent_since_last_call(false).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_modes_tracked_independently() {
        let sampler = Scripted::new(vec![vec![ts(0.0, 0.0)], vec![ts(0.0, 0.0)], vec![ts(1.0, 1.0)]]);
        let engine = CpuPercent::new(sampler);
        assert_eq!(engine.percent_since_last_call(true).unwrap(), vec![50.0]);
        // Aggregate slot still holds its own primed baseline.
        assert_eq!(engine.percent_since_last_call(false).unwrap(), vec![50.0]);
    }

    #[test]
    fn test_no_baseline() {
        let sampler = Scripted::new(vec![vec![ts(1.0, 1.0)]]);
        let engine = CpuPercent::with_cache(sampler, LastSampleCache::empty());
        assert!(matches!(
            engine.percent_since_last_call(true),
            Err(CpuError::NoBaseline { per_cpu: true })
        ));
        // The failed call still stored a baseline.
        assert_eq!(engine.percent_since_last_call(true).unwrap(), vec![0.0]);
        assert!(engine.last.last(false).is_none());
    }

    #[test]
    fn test_concurrent_callers_never_share_a_baseline() {
        let sampler = Arc::new(Ticking {
            n: AtomicU64::new(0),
        });
        let engine = CpuPercent::new(sampler);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        let p = engine.percent_since_last_call(false).unwrap();
                        // Consecutive samples differ by exactly one busy and
                        // one idle second.
                        assert_eq!(p, vec![50.0]);
                    }
                });
            }
        });
    }

    #[test]
    fn test_static_fixture_reads_zero() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("stat"),
            "cpu 400 0 200 1600 20 0 0\ncpu0 200 0 100 800 10 0 0\ncpu1 200 0 100 800 10 0 0\nintr 1\n",
        )
        .unwrap();
        let paths = HostPaths::default().with_root(HostRoot::Proc, dir.path().to_string_lossy());
        let engine = CpuPercent::new(Arc::new(LinuxSampler::new(paths).with_clock_ticks(100)));

        engine.percent_since_last_call(true).unwrap();
        assert_eq!(engine.percent_since_last_call(true).unwrap(), vec![0.0, 0.0]);
        assert_eq!(engine.percent_since_last_call(false).unwrap(), vec![0.0]);
    }

    #[tokio::test]
    async fn test_interval_mode() {
        let sampler = Scripted::new(vec![vec![ts(0.0, 0.0)], vec![ts(0.0, 0.0)], vec![ts(0.0, 0.0)], vec![ts(3.0, 1.0)]]);
        let engine = CpuPercent::new(sampler);
        let cancel = CancellationToken::new();
        let p = engine
            .percent_total(Duration::from_millis(10), &cancel)
            .await
            .unwrap();
        assert_eq!(p, 75.0);
        // Interval mode left the cache alone.
        assert_eq!(engine.last.last(false).unwrap(), vec![ts(0.0, 0.0)]);
    }

    #[tokio::test]
    async fn test_interval_mode_cancelled() {
        let sampler = Scripted::new(vec![vec![ts(0.0, 0.0)]]);
        let engine = CpuPercent::new(sampler);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = engine.percent(Duration::from_secs(3600), true, &cancel).await;
        assert!(matches!(res, Err(CpuError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_during_sleep() {
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            child.cancel();
        });
        let res = sleep(Duration::from_secs(3600), &cancel).await;
        assert!(matches!(res, Err(CpuError::Cancelled)));
    }

    #[tokio::test]
    async fn test_total_without_data() {
        let sampler = Scripted::new(vec![Vec::new()]);
        let engine = CpuPercent::new(sampler);
        let cancel = CancellationToken::new();
        assert!(matches!(
            engine.percent_total(Duration::ZERO, &cancel).await,
            Err(CpuError::NoData)
        ));
    }
}
