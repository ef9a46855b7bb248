//! Error types for CPU sampling and percentage computation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by samplers, the percentage engine and process handles.
#[derive(Debug, Error)]
pub enum CpuError {
    /// A counter line or process record could not be decoded.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Two snapshot sequences of different length were diffed.
    #[error("received two CPU counts: {previous} != {current}")]
    ShapeMismatch { previous: usize, current: usize },

    /// Since-last-call mode was used before any baseline was stored.
    #[error("no baseline sample stored for {} times", mode_name(.per_cpu))]
    NoBaseline { per_cpu: bool },

    /// The file backing a sample is missing or not readable.
    #[error("failed to read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An interval sleep was interrupted before it completed.
    #[error("sampling cancelled")]
    Cancelled,

    /// A sample that must contain at least one element came back empty.
    #[error("no CPU times available")]
    NoData,

    /// The affinity mask of a process contains no CPU.
    #[error("process {pid} has an empty CPU affinity set")]
    NoAllowedCpus { pid: i32 },

    /// A libc call failed.
    #[error("{call} failed: {source}")]
    Syscall {
        call: &'static str,
        #[source]
        source: io::Error,
    },
}

impl CpuError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        CpuError::MalformedInput(msg.into())
    }

    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CpuError::Unreadable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn last_os_error(call: &'static str) -> Self {
        CpuError::Syscall {
            call,
            source: io::Error::last_os_error(),
        }
    }
}

fn mode_name(per_cpu: &bool) -> &'static str {
    if *per_cpu {
        "per-cpu"
    } else {
        "aggregate"
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CpuError>;
