#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use anyhow::{bail, Result as AnyResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::probe::MemorySnapshot;

/// Share of the raw target left unallocated when no explicit mercy is given.
pub const DEFAULT_MERCY_PERCENT: f64 = 3.0;

/// Formula used to derive the raw allocation target from a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    TotalMinusUsed,
    AvailableMemory,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::TotalMinusUsed => f.write_str("TOTAL_MINUS_USED"),
            Strategy::AvailableMemory => f.write_str("AVAILABLE_MEMORY"),
        }
    }
}

impl FromStr for Strategy {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> AnyResult<Self> {
        match s {
            "TOTAL_MINUS_USED" => Ok(Self::TotalMinusUsed),
            "AVAILABLE_MEMORY" => Ok(Self::AvailableMemory),
            other => bail!(format!("unsupported strategy: {other}")),
        }
    }
}

/// Memory deliberately left unallocated, absolute or relative to the raw target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum MercySpec {
    Bytes(u64),
    Percent(f64),
}

impl Default for MercySpec {
    fn default() -> Self {
        Self::Percent(DEFAULT_MERCY_PERCENT)
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTargetError {
    #[error("used memory {used} B exceeds total {total} B")]
    UsedExceedsTotal { total: u64, used: u64 },
    #[error("mercy {mercy} B is not below the raw target {raw} B")]
    MercyExceedsRaw { raw: u64, mercy: u64 },
    #[error("target {target} B exceeds total memory {total} B")]
    ExceedsTotal { target: u64, total: u64 },
}

/// The allocation decision, computed once at startup and immutable thereafter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AllocationPlan {
    pub strategy: Strategy,
    pub mercy_bytes: u64,
    pub target_bytes: u64,
}

impl AllocationPlan {
    /// Derives the target from a snapshot, a strategy, and a mercy margin.
    ///
    /// Subtractions are checked: a mercy at or above the raw target and a
    /// `used` above `total` are hard errors, never unsigned wraps. For a
    /// percentage mercy the target is `round(raw * (1 - pct/100))` and the
    /// mercy is whatever remains of `raw`.
    pub fn compute(
        snapshot: &MemorySnapshot,
        strategy: Strategy,
        mercy: MercySpec,
    ) -> Result<Self, InvalidTargetError> {
        let raw = match strategy {
            Strategy::TotalMinusUsed => snapshot.total.checked_sub(snapshot.used).ok_or(
                InvalidTargetError::UsedExceedsTotal {
                    total: snapshot.total,
                    used: snapshot.used,
                },
            )?,
            Strategy::AvailableMemory => snapshot.available,
        };

        let (mercy_bytes, target_bytes) = match mercy {
            MercySpec::Bytes(bytes) => {
                if bytes >= raw {
                    return Err(InvalidTargetError::MercyExceedsRaw { raw, mercy: bytes });
                }
                (bytes, raw - bytes)
            }
            MercySpec::Percent(pct) => {
                let target = ((raw as f64 * (1.0 - pct / 100.0)).round() as u64).min(raw);
                let mercy_bytes = raw - target;
                if mercy_bytes >= raw {
                    return Err(InvalidTargetError::MercyExceedsRaw {
                        raw,
                        mercy: mercy_bytes,
                    });
                }
                (mercy_bytes, target)
            }
        };

        if target_bytes > snapshot.total {
            return Err(InvalidTargetError::ExceedsTotal {
                target: target_bytes,
                total: snapshot.total,
            });
        }

        Ok(Self {
            strategy,
            mercy_bytes,
            target_bytes,
        })
    }

    /// Plan for an operator-supplied size, bypassing the formula.
    pub fn explicit(
        snapshot: &MemorySnapshot,
        strategy: Strategy,
        target_bytes: u64,
    ) -> Result<Self, InvalidTargetError> {
        if target_bytes > snapshot.total {
            return Err(InvalidTargetError::ExceedsTotal {
                target: target_bytes,
                total: snapshot.total,
            });
        }
        Ok(Self {
            strategy,
            mercy_bytes: 0,
            target_bytes,
        })
    }
}

/// Lifecycle of a pressure run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Idle,
    Probing,
    PlanReady,
    Running,
    SignalReceived,
    Cancelling,
    Touching,
    Terminated,
    Aborted,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RunPhase::Idle => "IDLE",
            RunPhase::Probing => "PROBING",
            RunPhase::PlanReady => "PLAN_READY",
            RunPhase::Running => "RUNNING",
            RunPhase::SignalReceived => "SIGNAL_RECEIVED",
            RunPhase::Cancelling => "CANCELLING",
            RunPhase::Touching => "TOUCHING",
            RunPhase::Terminated => "TERMINATED",
            RunPhase::Aborted => "ABORTED",
        };
        f.write_str(label)
    }
}

/// Shared, append-only record of phase transitions.
#[derive(Clone)]
pub struct RunState {
    phases: Arc<Mutex<Vec<RunPhase>>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            phases: Arc::new(Mutex::new(vec![RunPhase::Idle])),
        }
    }
}

impl RunState {
    pub fn advance(&self, phase: RunPhase) {
        info!(%phase, "phase");
        self.phases.lock().push(phase);
    }

    pub fn current(&self) -> RunPhase {
        self.phases.lock().last().copied().unwrap_or(RunPhase::Idle)
    }

    pub fn history(&self) -> Vec<RunPhase> {
        self.phases.lock().clone()
    }
}
