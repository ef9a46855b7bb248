//! CLI arguments and subcommands for cpuproc.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Output format for sampled data
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "cpuproc",
    about = "Host and per-process CPU utilization from /proc counters",
    long_about = "Host and per-process CPU utilization from /proc counters.\n\n\
                  Samples the kernel's CPU time counters, diffs successive snapshots \
                  and reports busy percentages for the whole host, each core, or a \
                  single process normalized by its CPU affinity.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Proc filesystem root (overrides HOST_PROC)
    #[arg(long)]
    pub proc_root: Option<String>,

    /// Etc directory root (overrides HOST_ETC)
    #[arg(long)]
    pub etc_root: Option<String>,

    /// Filesystem root (overrides HOST_ROOT)
    #[arg(long)]
    pub host_root: Option<String>,

    /// Clock ticks per second (default: sysconf)
    #[arg(long)]
    pub clock_ticks: Option<u64>,

    /// Re-read boot time on every process sample
    #[arg(long)]
    pub no_boot_time_cache: bool,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print total CPU busy percent
    Total {
        /// Sampling interval in ms (0 = since last call)
        #[arg(short = 'i', long)]
        interval_ms: Option<u64>,

        /// Number of samples to print
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },

    /// Print busy percent of every core
    PerCpu {
        /// Sampling interval in ms (0 = since last call)
        #[arg(short = 'i', long)]
        interval_ms: Option<u64>,

        /// Number of samples to print
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },

    /// Dump raw CPU time counters
    Times {
        /// Per-core counters instead of the aggregate
        #[arg(long)]
        per_cpu: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Sample a process and print its normalized CPU percent
    Process {
        /// Process id (default: this process)
        #[arg(short = 'p', long)]
        pid: Option<i32>,

        /// Sample a thread of the process instead
        #[arg(long)]
        tid: Option<i32>,

        /// Number of samples to print
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// Pause between samples in ms
        #[arg(short = 'i', long)]
        interval_ms: Option<u64>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show boot time, virtualization and OS release
    Host {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Validate that the counter files are readable
    Check,

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },
}
