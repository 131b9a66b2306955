#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

pub mod ballast;
pub mod cli;
pub mod domain;
pub mod format;
pub mod monitor;
pub mod oom;
pub mod probe;
pub mod service;

pub use ballast::{allocate_and_pin, AllocatorConfig, Ballast, BallastError, FILL_SENTINEL, TOUCH_SENTINEL};
pub use cli::Cli;
pub use domain::{AllocationPlan, InvalidTargetError, MercySpec, RunPhase, RunState, Strategy};
pub use format::{format_bytes, format_size, Reporter, SIZES};
pub use monitor::watch_memory;
pub use oom::{OomConfig, OomScoreAdjPort, PriorityAdjustError, PriorityPort};
pub use probe::{MemoryProbe, MemoryReadError, MemorySnapshot, ProcMemoryProbe};
pub use service::{PressureRunner, RunConfig, RunOutcome, RunReport};
