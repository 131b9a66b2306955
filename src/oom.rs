#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Per-process badness control file, keyed by pid via the `self` symlink.
pub const OOM_SCORE_ADJ_PATH: &str = "/proc/self/oom_score_adj";

/// Highest accepted badness score.
pub const MAX_KILL_SCORE: u16 = 1000;

/// Default request: make this process the preferred OOM-kill victim.
pub const PREFERRED_VICTIM_SCORE: u16 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum PriorityAdjustError {
    #[error("score {0} is outside 0..=1000")]
    InvalidScore(u16),
    #[error("failed to write oom score to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Capability for adjusting this process's OOM-kill ranking.
pub trait PriorityPort {
    fn set_kill_priority(&self, score: u16) -> Result<(), PriorityAdjustError>;
}

/// Writes the score to the host's priority-control surface.
#[derive(Clone, Debug)]
pub struct OomScoreAdjPort {
    path: PathBuf,
}

impl Default for OomScoreAdjPort {
    fn default() -> Self {
        Self {
            path: OOM_SCORE_ADJ_PATH.into(),
        }
    }
}

impl OomScoreAdjPort {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PriorityPort for OomScoreAdjPort {
    fn set_kill_priority(&self, score: u16) -> Result<(), PriorityAdjustError> {
        if score > MAX_KILL_SCORE {
            return Err(PriorityAdjustError::InvalidScore(score));
        }
        let write_err = |source| PriorityAdjustError::Write {
            path: self.path.display().to_string(),
            source,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(write_err)?;
        file.write_all(score.to_string().as_bytes())
            .map_err(write_err)
    }
}

/// Whether and how hard to request kill priority.
#[derive(Clone, Copy, Debug)]
pub struct OomConfig {
    pub score: u16,
    /// Refuse to run when the adjustment fails instead of degrading.
    pub strict: bool,
}

impl Default for OomConfig {
    fn default() -> Self {
        Self {
            score: PREFERRED_VICTIM_SCORE,
            strict: false,
        }
    }
}
