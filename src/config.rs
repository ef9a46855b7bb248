//! Configuration file support.
//!
//! Configuration is read from YAML, JSON or TOML (chosen by file extension).
//! Every field is optional; CLI flags override file values, file values
//! override built-in defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::env::{HostPaths, HostRoot};

pub const DEFAULT_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_SAMPLES: u64 = 1;

/// Default locations searched when no config path is given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "/etc/cpuproc/cpuproc.yaml",
    "/etc/cpuproc/cpuproc.yml",
    "/etc/cpuproc/cpuproc.json",
    "/etc/cpuproc/cpuproc.toml",
    "./cpuproc.yaml",
    "./cpuproc.yml",
    "./cpuproc.json",
    "./cpuproc.toml",
];

const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Effective configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Host roots
    #[serde(alias = "host-proc")]
    pub proc_root: Option<String>,
    #[serde(alias = "host-etc")]
    pub etc_root: Option<String>,
    #[serde(alias = "host-root")]
    pub host_root: Option<String>,

    // Sampling
    #[serde(alias = "interval-ms")]
    pub interval_ms: Option<u64>,
    pub samples: Option<u64>,
    #[serde(alias = "boot-time-cache")]
    pub boot_time_cache: Option<bool>,
    #[serde(alias = "clock-ticks")]
    pub clock_ticks: Option<u64>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proc_root: None,
            etc_root: None,
            host_root: None,
            interval_ms: Some(DEFAULT_INTERVAL_MS),
            samples: Some(DEFAULT_SAMPLES),
            boot_time_cache: Some(true),
            clock_ticks: None,
            log_level: Some("info".to_string()),
        }
    }
}

impl Config {
    /// Root overrides for the path resolver.
    pub fn host_paths(&self) -> HostPaths {
        let mut paths = HostPaths::default();
        if let Some(v) = &self.proc_root {
            paths = paths.with_root(HostRoot::Proc, v.clone());
        }
        if let Some(v) = &self.etc_root {
            paths = paths.with_root(HostRoot::Etc, v.clone());
        }
        if let Some(v) = &self.host_root {
            paths = paths.with_root(HostRoot::Root, v.clone());
        }
        paths
    }
}

/// Loads configuration from `path`, or from the first existing default
/// location. No file means defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match DEFAULT_CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
            Some(p) => PathBuf::from(p),
            None => return Ok(Config::default()),
        },
    };

    if !path.exists() {
        anyhow::bail!("config file not found: {}", path.display());
    }

    let content = fs::read_to_string(&path)?;
    let config = parse_config(&content, path.extension().and_then(|s| s.to_str()))?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Parses configuration text; the extension picks the format, YAML default.
pub fn parse_config(content: &str, extension: Option<&str>) -> anyhow::Result<Config> {
    let config = match extension {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        _ => serde_yaml::from_str(content)?,
    };
    Ok(config)
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.clock_ticks == Some(0) {
        anyhow::bail!("clock_ticks must be greater than 0");
    }
    if cfg.samples == Some(0) {
        anyhow::bail!("samples must be greater than 0");
    }

    for (name, value) in [
        ("proc_root", &cfg.proc_root),
        ("etc_root", &cfg.etc_root),
        ("host_root", &cfg.host_root),
    ] {
        if matches!(value.as_deref(), Some(v) if v.trim().is_empty()) {
            anyhow::bail!("{name} must not be empty");
        }
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log_level '{}', expected one of {}",
                level,
                LOG_LEVELS.join(", ")
            );
        }
    }

    Ok(())
}
