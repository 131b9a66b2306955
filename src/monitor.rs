#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use tokio::sync::watch;
use tokio::time::{interval_at, Duration, Instant};
use tracing::{debug, error};

use crate::probe::{MemoryProbe, MemorySnapshot};

/// Periodically probes memory and feeds each snapshot to `emit` until
/// cancelled.
///
/// The first emission happens one full interval after start, never
/// immediately. Cancellation shares the select with the timer, so the loop
/// never blocks past the next tick. A probe failure stops the monitor only;
/// it is purely observational and must not take the run down with it.
pub async fn watch_memory<P, F>(
    probe: P,
    interval: Duration,
    mut cancelled: watch::Receiver<bool>,
    mut emit: F,
) where
    P: MemoryProbe,
    F: FnMut(&MemorySnapshot),
{
    let mut ticker = interval_at(Instant::now() + interval, interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => match probe.snapshot() {
                Ok(snapshot) => emit(&snapshot),
                Err(e) => {
                    error!(error = %e, "memory probe failed, monitor stopping");
                    return;
                }
            },
            _ = cancelled.changed() => {
                debug!("monitor cancelled");
                return;
            }
        }
    }
}
