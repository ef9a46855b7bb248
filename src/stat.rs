//! Counter records and their parsers.
//!
//! Two kernel formats are decoded here:
//! - a `cpu`/`cpuN` line of `/proc/stat`
//! - a `/proc/<pid>/stat` (or `/proc/<pid>/task/<tid>/stat`) record
//!
//! Parsing is pure: callers supply clock ticks so the same code serves real
//! hosts and fixtures.

use serde::{Deserialize, Serialize};

use crate::error::{CpuError, Result};

/// Clock ticks per second assumed when `sysconf(_SC_CLK_TCK)` is unavailable.
pub const DEFAULT_CLOCK_TICKS: u64 = 100;

/// CPU time accounting for the whole machine, one core, or one process.
/// All values are seconds since boot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesStat {
    pub cpu: String,
    pub user: f64,
    pub system: f64,
    pub idle: f64,
    pub nice: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
    pub guest: f64,
    pub guest_nice: f64,
}

impl TimesStat {
    /// Sum of every state, guest time included.
    pub fn total(&self) -> f64 {
        self.user
            + self.system
            + self.idle
            + self.nice
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
            + self.guest
            + self.guest_nice
    }
}

/// Page fault counters of a process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFaultsStat {
    pub minor_faults: u64,
    pub major_faults: u64,
    pub child_minor_faults: u64,
    pub child_major_faults: u64,
}

/// Reads clock ticks per second from the OS, falling back to 100.
pub fn clock_ticks() -> u64 {
    // SAFETY: sysconf has no preconditions.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as u64
    } else {
        DEFAULT_CLOCK_TICKS
    }
}

fn parse_f64(fields: &[&str], idx: usize, what: &str) -> Result<f64> {
    fields[idx]
        .parse::<f64>()
        .map_err(|e| CpuError::malformed(format!("{what} {:?}: {e}", fields[idx])))
}

/// Parses one `cpu` line of the aggregate counter file.
///
/// Format: `cpu[N] user nice system idle iowait irq softirq [steal [guest [guest_nice]]]`
pub fn parse_stat_line(line: &str, ticks: f64) -> Result<TimesStat> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    if fields.len() < 8 {
        return Err(CpuError::malformed(format!(
            "stat line has {} fields, expected at least 8",
            fields.len()
        )));
    }
    if !fields[0].starts_with("cpu") {
        return Err(CpuError::malformed(format!(
            "stat line label {:?} is not a cpu",
            fields[0]
        )));
    }

    let cpu = if fields[0] == "cpu" {
        "cpu-total".to_string()
    } else {
        fields[0].to_string()
    };

    let mut ct = TimesStat {
        cpu,
        user: parse_f64(&fields, 1, "user")? / ticks,
        nice: parse_f64(&fields, 2, "nice")? / ticks,
        system: parse_f64(&fields, 3, "system")? / ticks,
        idle: parse_f64(&fields, 4, "idle")? / ticks,
        iowait: parse_f64(&fields, 5, "iowait")? / ticks,
        irq: parse_f64(&fields, 6, "irq")? / ticks,
        softirq: parse_f64(&fields, 7, "softirq")? / ticks,
        ..TimesStat::default()
    };

    // Linux >= 2.6.11
    if fields.len() > 8 {
        ct.steal = parse_f64(&fields, 8, "steal")? / ticks;
    }
    // Linux >= 2.6.24
    if fields.len() > 9 {
        ct.guest = parse_f64(&fields, 9, "guest")? / ticks;
    }
    // Linux >= 3.2.0
    if fields.len() > 10 {
        ct.guest_nice = parse_f64(&fields, 10, "guest_nice")? / ticks;
    }

    Ok(ct)
}

/// Raw tick and id values decoded from a process stat record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcStatRecord {
    pub pid: i32,
    pub name: String,
    pub ppid: i32,
    pub terminal: u64,
    pub utime_ticks: u64,
    pub stime_ticks: u64,
    pub blkio_ticks: u64,
    pub start_ticks: u64,
    pub rt_priority: u32,
    pub page_faults: PageFaultsStat,
}

/// Splits a process stat record into 1-based fields as documented in
/// `proc(5)`. Index 0 is unused, 1 is the pid, 2 the bare name.
///
/// The name is taken between the first `(` and the last `)` so names that
/// contain spaces or parentheses do not shift the numeric fields.
pub fn split_proc_stat(content: &str) -> Result<Vec<&str>> {
    let name_start = content
        .find('(')
        .ok_or_else(|| CpuError::malformed("process stat has no '('"))?;
    let name_end = content
        .rfind(')')
        .ok_or_else(|| CpuError::malformed("process stat has no ')'"))?;
    if name_end < name_start {
        return Err(CpuError::malformed("process stat name is not enclosed"));
    }

    let pid = content[..name_start].trim();
    let name = &content[name_start + 1..name_end];
    let rest = content[name_end + 1..].split_whitespace();

    let mut fields = Vec::with_capacity(56);
    fields.push("");
    fields.push(pid);
    fields.push(name);
    fields.extend(rest);
    Ok(fields)
}

fn field<'a>(fields: &[&'a str], idx: usize, what: &str) -> Result<&'a str> {
    fields
        .get(idx)
        .copied()
        .ok_or_else(|| CpuError::malformed(format!("process stat is missing field {idx} ({what})")))
}

fn parse_field<T>(fields: &[&str], idx: usize, what: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = field(fields, idx, what)?;
    raw.parse::<T>()
        .map_err(|e| CpuError::malformed(format!("process stat field {idx} ({what}) {raw:?}: {e}")))
}

/// Decodes a process stat record. Every required field must be present and
/// numeric; only the block-IO delay (field 42) is optional.
pub fn parse_proc_stat(content: &str) -> Result<ProcStatRecord> {
    let fields = split_proc_stat(content)?;

    let pid = parse_field::<i32>(&fields, 1, "pid")?;
    let ppid = parse_field::<i32>(&fields, 4, "ppid")?;
    let terminal = parse_field::<u64>(&fields, 7, "tty_nr")?;

    let minor_faults = parse_field::<u64>(&fields, 10, "minflt")?;
    let child_minor_faults = parse_field::<u64>(&fields, 11, "cminflt")?;
    let major_faults = parse_field::<u64>(&fields, 12, "majflt")?;
    let child_major_faults = parse_field::<u64>(&fields, 13, "cmajflt")?;

    let utime_ticks = parse_field::<u64>(&fields, 14, "utime")?;
    let stime_ticks = parse_field::<u64>(&fields, 15, "stime")?;

    let priority = parse_field::<i64>(&fields, 18, "priority")?;
    // Real-time tasks report priority as -rt_priority - 1.
    let rt_priority = if priority < 0 {
        (-priority - 1) as u32
    } else {
        0
    };

    let start_ticks = parse_field::<u64>(&fields, 22, "starttime")?;

    // delayacct_blkio_ticks; missing on old kernels and some containers.
    let blkio_ticks = fields
        .get(42)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(ProcStatRecord {
        pid,
        name: fields[2].to_string(),
        ppid,
        terminal,
        utime_ticks,
        stime_ticks,
        blkio_ticks,
        start_ticks,
        rt_priority,
        page_faults: PageFaultsStat {
            minor_faults,
            major_faults,
            child_minor_faults,
            child_major_faults,
        },
    })
}

impl ProcStatRecord {
    /// Process CPU times as a single `cpu` record.
    pub fn cpu_times(&self, ticks: f64) -> TimesStat {
        TimesStat {
            cpu: "cpu".to_string(),
            user: self.utime_ticks as f64 / ticks,
            system: self.stime_ticks as f64 / ticks,
            iowait: self.blkio_ticks as f64 / ticks,
            ..TimesStat::default()
        }
    }

    /// Creation time in epoch milliseconds. Whole seconds only, matching
    /// the resolution of the boot time.
    pub fn create_time_millis(&self, ticks: u64, boot_time: u64) -> i64 {
        let secs = self.start_ticks / ticks.max(1) + boot_time;
        (secs * 1000) as i64
    }
}
