//! CLI command implementations for cpuproc.
//!
//! This module provides implementations for all CLI subcommands:
//! - `total` / `per-cpu`: busy percentages
//! - `times`: raw counters
//! - `process`: per-process sampling
//! - `host`: boot time, virtualization, OS release
//! - `check`: system validation
//! - `config`: configuration file generation

pub mod check;
pub mod config;
pub mod host;
pub mod process;
pub mod sample;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use host::command_host;
pub use process::command_process;
pub use sample::{command_percent, command_times};

use serde::Serialize;

use crate::cli::OutputFormat;

/// Serializes `value` for the json and yaml output formats.
pub(crate) fn render<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<Option<String>> {
    Ok(match format {
        OutputFormat::Text => None,
        OutputFormat::Json => Some(serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => Some(serde_yaml::to_string(value)?),
    })
}
