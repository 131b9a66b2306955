#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Default path to the kernel memory counters.
const MEMINFO_PATH: &str = "/proc/meminfo";

#[derive(Debug, thiserror::Error)]
pub enum MemoryReadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {detail}")]
    Parse { path: String, detail: String },
}

/// Point-in-time read of host memory counters. Never mutated after capture.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MemorySnapshot {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub used_percent: f64,
}

pub trait MemoryProbe {
    fn snapshot(&self) -> Result<MemorySnapshot, MemoryReadError>;
}

/// Reads snapshots from a `/proc/meminfo`-formatted file.
#[derive(Clone, Debug)]
pub struct ProcMemoryProbe {
    path: PathBuf,
}

impl Default for ProcMemoryProbe {
    fn default() -> Self {
        Self {
            path: MEMINFO_PATH.into(),
        }
    }
}

impl ProcMemoryProbe {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MemoryProbe for ProcMemoryProbe {
    fn snapshot(&self) -> Result<MemorySnapshot, MemoryReadError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| MemoryReadError::Io {
            path: self.path.display().to_string(),
            source: e,
        })?;
        parse_meminfo(&content, &self.path)
    }
}

/// Parses `/proc/meminfo`-formatted content (values in kB).
///
/// `used` follows the classic accounting `total - free - buffers - cached`.
/// `available` prefers the kernel's `MemAvailable` estimate and falls back to
/// `free + buffers + cached` on kernels that do not report it.
pub fn parse_meminfo(content: &str, path: &Path) -> Result<MemorySnapshot, MemoryReadError> {
    let mut total = None;
    let mut free = None;
    let mut buffers = 0u64;
    let mut cached = 0u64;
    let mut available = None;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        match key {
            "MemTotal:" => total = Some(parse_kb(value, path)?),
            "MemFree:" => free = Some(parse_kb(value, path)?),
            "Buffers:" => buffers = parse_kb(value, path)?,
            "Cached:" => cached = parse_kb(value, path)?,
            "MemAvailable:" => available = Some(parse_kb(value, path)?),
            _ => {}
        }
    }

    let total = total.ok_or_else(|| missing_field("MemTotal", path))?;
    let free = free.ok_or_else(|| missing_field("MemFree", path))?;

    let reclaimable = free.saturating_add(buffers).saturating_add(cached);
    let used = total.saturating_sub(reclaimable);
    let available = available.unwrap_or(reclaimable);
    let used_percent = if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    };

    Ok(MemorySnapshot {
        total,
        used,
        available,
        used_percent,
    })
}

fn parse_kb(value: &str, path: &Path) -> Result<u64, MemoryReadError> {
    value
        .parse::<u64>()
        .map(|kb| kb.saturating_mul(1024))
        .map_err(|_| MemoryReadError::Parse {
            path: path.display().to_string(),
            detail: format!("expected integer kB value, got '{value}'"),
        })
}

fn missing_field(field: &str, path: &Path) -> MemoryReadError {
    MemoryReadError::Parse {
        path: path.display().to_string(),
        detail: format!("{field} not found"),
    }
}
