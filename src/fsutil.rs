//! Line-oriented readers for pseudo-files.
//!
//! All readers map open and read failures to [`CpuError::Unreadable`] so the
//! caller can decide whether the failure is soft (aggregate sampling, boot
//! time) or fatal (per-process sampling).

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{CpuError, Result};

/// Most /proc text files fit comfortably in one page.
const READ_BUFFER: usize = 4 * 1024;

pub fn path_exists(path: &Path) -> bool {
    fs::metadata(path).is_ok()
}

/// Reads a whole file as a string.
pub fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| CpuError::unreadable(path, e))
}

/// Reads every line of `path`, trailing newlines stripped.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    read_lines_offset_n(path, 0, None)
}

/// Reads at most `n` lines starting at line `offset` (0-based).
/// `n = None` reads to the end of the file.
pub fn read_lines_offset_n(path: &Path, offset: usize, n: Option<usize>) -> Result<Vec<String>> {
    let file = fs::File::open(path).map_err(|e| CpuError::unreadable(path, e))?;
    let reader = BufReader::with_capacity(READ_BUFFER, file);

    let mut out = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        if let Some(n) = n {
            if i >= offset + n {
                break;
            }
        }
        let line = line.map_err(|e| CpuError::unreadable(path, e))?;
        if i < offset {
            continue;
        }
        out.push(line);
    }
    Ok(out)
}

/// Returns the first line starting with `prefix`, or `None` when no line
/// matches.
pub fn read_line_with_prefix(path: &Path, prefix: &str) -> Result<Option<String>> {
    let file = fs::File::open(path).map_err(|e| CpuError::unreadable(path, e))?;
    let reader = BufReader::with_capacity(READ_BUFFER, file);

    for line in reader.lines() {
        let line = line.map_err(|e| CpuError::unreadable(path, e))?;
        if line.starts_with(prefix) {
            return Ok(Some(line));
        }
    }
    Ok(None)
}
