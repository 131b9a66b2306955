#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use std::collections::TryReserveError;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

/// Value written into every ballast byte to force page commitment.
pub const FILL_SENTINEL: u8 = b'A';
/// Value written into the first byte by the final shutdown touch.
pub const TOUCH_SENTINEL: u8 = b'B';

const DEFAULT_CHUNK_BYTES: usize = 1 << 30;
const DEFAULT_PAUSE: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum BallastError {
    #[error("host refused to commit {requested} bytes: {source}")]
    CommitRefused {
        requested: u64,
        #[source]
        source: TryReserveError,
    },
    #[error("target of {0} bytes does not fit the address space")]
    TargetTooLarge(u64),
}

/// Pacing of the physical fill.
#[derive(Clone, Debug)]
pub struct AllocatorConfig {
    pub chunk_bytes: usize,
    pub pause: Duration,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            pause: DEFAULT_PAUSE,
        }
    }
}

/// The fully committed pressure buffer. Only ever constructed complete.
#[derive(Debug)]
pub struct Ballast {
    bytes: Vec<u8>,
}

impl Ballast {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Writes the touch sentinel into the first byte, proving the allocation
    /// is live. Returns `false` for an empty ballast.
    pub fn touch(&mut self) -> bool {
        if let Some(first) = self.bytes.first_mut() {
            *first = TOUCH_SENTINEL;
            true
        } else {
            false
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Commits `target_bytes` of real memory, writing the sentinel into every
/// byte so the OS cannot leave the reservation virtual.
///
/// The fill is paced: after each chunk the task sleeps, keeping the climb
/// observable instead of starving the host in one burst. The host refusing
/// the reservation is reported as `CommitRefused`, not a panic.
pub async fn allocate_and_pin(
    target_bytes: u64,
    config: &AllocatorConfig,
) -> Result<Ballast, BallastError> {
    let len = usize::try_from(target_bytes).map_err(|_| BallastError::TargetTooLarge(target_bytes))?;

    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(len)
        .map_err(|source| BallastError::CommitRefused {
            requested: target_bytes,
            source,
        })?;
    bytes.resize(len, 0);

    let chunk_bytes = config.chunk_bytes.max(1);
    info!(bytes = target_bytes, chunk_bytes, "filling ballast");
    for (index, chunk) in bytes.chunks_mut(chunk_bytes).enumerate() {
        if index > 0 {
            sleep(config.pause).await;
        }
        chunk.fill(FILL_SENTINEL);
        debug!(chunk = index, "chunk pinned");
    }

    Ok(Ballast { bytes })
}
