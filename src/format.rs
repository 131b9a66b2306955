#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use serde_json::json;

use crate::domain::AllocationPlan;
use crate::probe::MemorySnapshot;

/// Ordered unit table for human-readable sizes.
pub const SIZES: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

/// Scales `value` down by `base` until it fits the next unit. Whole numbers
/// for bytes and kilobytes, two decimals above that.
pub fn format_size(mut value: f64, base: f64) -> String {
    let mut unit = 0;
    while value >= base && unit < SIZES.len() - 1 {
        value /= base;
        unit += 1;
    }
    if unit > 1 {
        format!("{value:.2} {}", SIZES[unit])
    } else {
        format!("{value:.0} {}", SIZES[unit])
    }
}

pub fn format_bytes(bytes: u64) -> String {
    format_size(bytes as f64, 1024.0)
}

/// Writes the plan report and monitor lines to stdout, as text or JSON.
/// Lifecycle logging stays on the tracing side; this is the measurement
/// stream.
#[derive(Clone, Debug)]
pub struct Reporter {
    json: bool,
}

impl Reporter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn report_plan(&self, snapshot: &MemorySnapshot, plan: &AllocationPlan) {
        let pid = std::process::id();
        if self.json {
            println!(
                "{}",
                json!({
                    "event": "plan",
                    "pid": pid,
                    "strategy": plan.strategy,
                    "mercy_bytes": plan.mercy_bytes,
                    "target_bytes": plan.target_bytes,
                    "snapshot": snapshot,
                })
            );
        } else {
            self.report_snapshot(snapshot);
            println!(
                "PID: {pid}, allocating <{}> {} (mercy {})",
                plan.strategy,
                format_bytes(plan.target_bytes),
                format_bytes(plan.mercy_bytes),
            );
        }
    }

    pub fn report_snapshot(&self, snapshot: &MemorySnapshot) {
        if self.json {
            println!("{}", json!({"event": "snapshot", "snapshot": snapshot}));
        } else {
            let stamp = chrono::Local::now().format("%H:%M:%S");
            println!(
                "[{stamp}] Total: {}, Used: {} ({:.2}%), Available: {}",
                format_bytes(snapshot.total),
                format_bytes(snapshot.used),
                snapshot.used_percent,
                format_bytes(snapshot.available),
            );
        }
    }
}
