//! Host facts the samplers depend on: boot time, virtualization identity and
//! OS release.
//!
//! Boot time and virtualization identity do not change while a process runs,
//! so both are memoized for the life of a [`HostInfo`]. Lookups are advisory
//! and degrade to best-effort values instead of failing the caller.

use once_cell::sync::OnceCell;
use serde::Serialize;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::env::HostPaths;
use crate::error::{CpuError, Result};
use crate::fsutil::{path_exists, read_file, read_line_with_prefix, read_lines};

/// Hypervisor or container system and this host's role in it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Virtualization {
    /// e.g. `kvm`, `xen`, `docker`, `lxc`; empty when bare metal or unknown.
    pub system: String,
    /// `guest`, `host` or empty.
    pub role: String,
}

impl Virtualization {
    fn set(&mut self, system: &str, role: &str) {
        self.system = system.to_string();
        self.role = role.to_string();
    }

    /// Containers whose `/proc/stat` btime belongs to the host.
    pub fn uses_uptime_for_boot_time(&self) -> bool {
        self.role == "guest" && (self.system == "lxc" || self.system == "docker")
    }
}

/// Boot time memo. Zero means "not computed yet"; racing writers all store
/// the same value so the last store wins harmlessly.
#[derive(Debug, Default)]
pub struct BootTimeCache {
    secs: AtomicU64,
}

impl BootTimeCache {
    pub fn get(&self) -> Option<u64> {
        match self.secs.load(Ordering::Acquire) {
            0 => None,
            t => Some(t),
        }
    }

    pub fn store(&self, secs: u64) {
        self.secs.store(secs, Ordering::Release);
    }
}

/// Host lookups bound to one set of root paths.
#[derive(Debug, Default)]
pub struct HostInfo {
    paths: HostPaths,
    boot_time: BootTimeCache,
    virtualization: OnceCell<Virtualization>,
}

impl HostInfo {
    pub fn new(paths: HostPaths) -> Self {
        Self {
            paths,
            boot_time: BootTimeCache::default(),
            virtualization: OnceCell::new(),
        }
    }

    pub fn paths(&self) -> &HostPaths {
        &self.paths
    }

    /// Seconds since the epoch at which the host booted.
    ///
    /// With `use_cache` the first successful lookup is memoized and reused.
    /// lxc and docker guests read `uptime`, everything else the `btime` line
    /// of `stat`. Permission errors fall back to `sysinfo(2)`.
    pub fn boot_time(&self, use_cache: bool) -> Result<u64> {
        if use_cache {
            if let Some(t) = self.boot_time.get() {
                return Ok(t);
            }
        }

        let t = if self.virtualization().uses_uptime_for_boot_time() {
            self.boot_time_from_uptime()?
        } else {
            self.boot_time_from_stat()?
        };

        if use_cache {
            self.boot_time.store(t);
        }
        Ok(t)
    }

    fn boot_time_from_stat(&self) -> Result<u64> {
        let path = self.paths.proc(&["stat"]);
        let line = match read_line_with_prefix(&path, "btime") {
            Ok(line) => line,
            Err(e) => return fallback_on_permission(e),
        };
        let line = line.ok_or_else(|| CpuError::malformed("could not find btime"))?;

        let f: Vec<&str> = line.split_whitespace().collect();
        if f.len() != 2 {
            return Err(CpuError::malformed(format!("wrong btime format: {line:?}")));
        }
        f[1].parse::<u64>()
            .map_err(|e| CpuError::malformed(format!("btime {:?}: {e}", f[1])))
    }

    fn boot_time_from_uptime(&self) -> Result<u64> {
        let path = self.paths.proc(&["uptime"]);
        let lines = match read_lines(&path) {
            Ok(lines) => lines,
            Err(e) => return fallback_on_permission(e),
        };
        if lines.len() != 1 {
            return Err(CpuError::malformed("wrong uptime format"));
        }
        let first = lines[0]
            .split_whitespace()
            .next()
            .ok_or_else(|| CpuError::malformed("empty uptime"))?;
        let uptime = first
            .parse::<f64>()
            .map_err(|e| CpuError::malformed(format!("uptime {first:?}: {e}")))?;
        Ok((now_secs_f64() - uptime) as u64)
    }

    /// Detects the hypervisor or container runtime. Computed once; every
    /// later call returns the first verdict.
    pub fn virtualization(&self) -> Virtualization {
        self.virtualization
            .get_or_init(|| {
                let v = self.detect_virtualization();
                debug!(system = %v.system, role = %v.role, "Virtualization detected");
                v
            })
            .clone()
    }

    fn detect_virtualization(&self) -> Virtualization {
        let mut v = Virtualization::default();

        let xen = self.paths.proc(&["xen"]);
        if path_exists(&xen) {
            // Assume guest unless the control domain capability is present.
            v.set("xen", "guest");
            if let Ok(lines) = read_lines(&xen.join("capabilities")) {
                if any_line_contains(&lines, "control_d") {
                    v.role = "host".to_string();
                }
            }
        }

        if let Ok(lines) = read_lines(&self.paths.proc(&["modules"])) {
            if any_line_contains(&lines, "kvm") {
                v.set("kvm", "host");
            } else if any_line_contains(&lines, "hv_util") {
                v.set("hyperv", "guest");
            } else if any_line_contains(&lines, "vboxdrv") {
                v.set("vbox", "host");
            } else if any_line_contains(&lines, "vboxguest") {
                v.set("vbox", "guest");
            } else if any_line_contains(&lines, "vmware") {
                v.set("vmware", "guest");
            }
        }

        if let Ok(lines) = read_lines(&self.paths.proc(&["cpuinfo"])) {
            if any_line_contains(&lines, "QEMU Virtual CPU")
                || any_line_contains(&lines, "Common KVM processor")
                || any_line_contains(&lines, "Common 32-bit KVM processor")
            {
                v.set("kvm", "guest");
            }
        }

        if let Ok(lines) = read_lines(&self.paths.proc(&["bus", "pci", "devices"])) {
            if any_line_contains(&lines, "virtio-pci") {
                v.role = "guest".to_string();
            }
        }

        if path_exists(&self.paths.proc(&["bc", "0"])) {
            v.set("openvz", "host");
        } else if path_exists(&self.paths.proc(&["vz"])) {
            v.set("openvz", "guest");
        }

        // dmidecode would need root.
        if let Ok(lines) = read_lines(&self.paths.proc(&["self", "status"])) {
            if any_line_contains(&lines, "s_context:") || any_line_contains(&lines, "VxID:") {
                v.system = "linux-vserver".to_string();
            }
        }

        if let Ok(environ) = read_file(&self.paths.proc(&["1", "environ"])) {
            if environ.contains("container=lxc") {
                v.set("lxc", "guest");
            }
        }

        if let Ok(lines) = read_lines(&self.paths.proc(&["self", "cgroup"])) {
            if any_line_contains(&lines, "lxc") {
                v.set("lxc", "guest");
            } else if any_line_contains(&lines, "docker") {
                v.set("docker", "guest");
            } else if any_line_contains(&lines, "machine-rkt") {
                v.set("rkt", "guest");
            } else if path_exists(&self.paths.root(&["usr", "bin", "lxc-version"])) {
                v.set("lxc", "host");
            }
        }

        if path_exists(&self.paths.etc(&["os-release"])) {
            let (platform, _) = self.os_release();
            if platform == "coreos" {
                v.set("rkt", "host");
            }
        }

        if path_exists(&self.paths.root(&[".dockerenv"])) {
            v.set("docker", "guest");
        }

        v
    }

    /// Returns `(platform, version)` from the `ID` and `VERSION_ID` keys of
    /// `os-release`. A missing file yields empty strings.
    pub fn os_release(&self) -> (String, String) {
        let lines = match read_lines(&self.paths.etc(&["os-release"])) {
            Ok(lines) => lines,
            Err(e) => {
                debug!("os-release unavailable: {}", e);
                return (String::new(), String::new());
            }
        };
        parse_os_release(&lines)
    }
}

fn parse_os_release(lines: &[String]) -> (String, String) {
    let mut platform = String::new();
    let mut version = String::new();

    for line in lines {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "ID" => platform = trim_quotes(value).to_string(),
            "VERSION_ID" => version = trim_quotes(value).to_string(),
            _ => {}
        }
    }

    if platform == "amzn" {
        platform = "amazon".to_string();
    }
    (platform, version)
}

fn trim_quotes(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn any_line_contains(lines: &[String], needle: &str) -> bool {
    lines.iter().any(|l| l.contains(needle))
}

fn now_secs_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn fallback_on_permission(err: CpuError) -> Result<u64> {
    match err {
        CpuError::Unreadable { ref source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
            warn!("{}; deriving boot time from sysinfo uptime", err);
            boot_time_from_sysinfo()
        }
        other => Err(other),
    }
}

#[cfg(target_os = "linux")]
fn boot_time_from_sysinfo() -> Result<u64> {
    // SAFETY: sysinfo only writes into the provided struct.
    let mut info: libc::sysinfo = unsafe { std::mem::zeroed() };
    if unsafe { libc::sysinfo(&mut info) } != 0 {
        return Err(CpuError::last_os_error("sysinfo"));
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(now.saturating_sub(info.uptime as u64))
}

#[cfg(not(target_os = "linux"))]
fn boot_time_from_sysinfo() -> Result<u64> {
    Err(CpuError::Syscall {
        call: "sysinfo",
        source: io::Error::from(io::ErrorKind::Unsupported),
    })
}
