#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use clap::Parser;
use std::time::Duration;

use crate::ballast::AllocatorConfig;
use crate::domain::{MercySpec, Strategy};
use crate::oom::OomConfig;
use crate::service::RunConfig;

const MIB: u64 = 1024 * 1024;

/// Command-line surface of the agent.
#[derive(Clone, Debug, Parser)]
#[command(
    name = "memballast",
    about = "Commits a computed share of host memory to create controlled memory pressure",
    version
)]
pub struct Cli {
    /// Target the kernel's MemAvailable estimate instead of total minus used
    #[arg(long)]
    pub mem_available: bool,

    /// Allocate exactly this many MiB instead of the computed target
    #[arg(long, value_name = "MIB")]
    pub size_mib: Option<u64>,

    /// Leave exactly this many bytes unallocated instead of the 3% default
    #[arg(long, value_name = "BYTES")]
    pub mercy_bytes: Option<u64>,

    /// Seconds between monitor reports
    #[arg(long, default_value_t = 20)]
    pub interval_secs: u64,

    /// OOM badness score to request (0 = never kill, 1000 = always kill)
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u16).range(..=1000))]
    pub oom_score: u16,

    /// Leave the OOM score adjustment untouched
    #[arg(long)]
    pub no_oom_adjust: bool,

    /// Refuse to run if the OOM score adjustment fails
    #[arg(long)]
    pub strict_oom: bool,

    /// Emit the plan report and monitor lines as JSON objects
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn into_config(self) -> RunConfig {
        let strategy = if self.mem_available {
            Strategy::AvailableMemory
        } else {
            Strategy::TotalMinusUsed
        };
        let mercy = self.mercy_bytes.map_or_else(MercySpec::default, MercySpec::Bytes);
        let oom = (!self.no_oom_adjust).then_some(OomConfig {
            score: self.oom_score,
            strict: self.strict_oom,
        });
        RunConfig {
            strategy,
            mercy,
            size_override_bytes: self.size_mib.map(|mib| mib.saturating_mul(MIB)),
            interval: Duration::from_secs(self.interval_secs),
            oom,
            allocator: AllocatorConfig::default(),
            json: self.json,
        }
    }
}
