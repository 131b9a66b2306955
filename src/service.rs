#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use anyhow::Context;
use std::backtrace::Backtrace;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

use crate::ballast::{allocate_and_pin, AllocatorConfig, Ballast};
use crate::domain::{AllocationPlan, MercySpec, RunPhase, RunState, Strategy};
use crate::format::Reporter;
use crate::monitor::watch_memory;
use crate::oom::{OomConfig, PriorityPort};
use crate::probe::MemoryProbe;

/// Everything a run needs, assembled by the CLI layer and frozen.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub strategy: Strategy,
    pub mercy: MercySpec,
    pub size_override_bytes: Option<u64>,
    pub interval: Duration,
    pub oom: Option<OomConfig>,
    pub allocator: AllocatorConfig,
    pub json: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::TotalMinusUsed,
            mercy: MercySpec::default(),
            size_override_bytes: None,
            interval: Duration::from_secs(20),
            oom: Some(OomConfig::default()),
            allocator: AllocatorConfig::default(),
            json: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Signal arrived after the ballast handoff; the final touch ran.
    CleanTouch,
    /// Signal arrived before the handoff; the touch was skipped.
    DegradedNoBallast,
    /// The host refused to commit the target. Intended terminal state.
    CommitRefused,
}

#[derive(Debug)]
pub struct RunReport {
    pub signal: Option<String>,
    pub touched: bool,
    pub outcome: RunOutcome,
    pub target_bytes: u64,
}

/// Drives one pressure run end to end: probe, plan, priority, allocator and
/// monitor tasks, then the shutdown sequence.
pub struct PressureRunner<P, O> {
    config: RunConfig,
    probe: P,
    priority: O,
    state: RunState,
    reporter: Reporter,
}

impl<P, O> PressureRunner<P, O>
where
    P: MemoryProbe + Clone + Send + Sync + 'static,
    O: PriorityPort,
{
    pub fn new(config: RunConfig, probe: P, priority: O) -> Self {
        let reporter = Reporter::new(config.json);
        Self {
            config,
            probe,
            priority,
            state: RunState::default(),
            reporter,
        }
    }

    /// Shared phase handle, for observers and tests.
    pub fn state(&self) -> RunState {
        self.state.clone()
    }

    /// Runs until `shutdown` resolves with the received signal's name, then
    /// performs the shutdown sequence and reports what happened.
    pub async fn run(self, shutdown: impl Future<Output = String>) -> anyhow::Result<RunReport> {
        let Self {
            config,
            probe,
            priority,
            state,
            reporter,
        } = self;

        state.advance(RunPhase::Probing);
        let snapshot = match probe.snapshot().context("read memory snapshot") {
            Ok(snapshot) => snapshot,
            Err(e) => {
                state.advance(RunPhase::Aborted);
                return Err(e);
            }
        };

        let plan = match config.size_override_bytes {
            Some(bytes) => AllocationPlan::explicit(&snapshot, config.strategy, bytes),
            None => AllocationPlan::compute(&snapshot, config.strategy, config.mercy),
        };
        let plan = match plan.context("compute allocation target") {
            Ok(plan) => plan,
            Err(e) => {
                state.advance(RunPhase::Aborted);
                return Err(e);
            }
        };
        state.advance(RunPhase::PlanReady);
        reporter.report_plan(&snapshot, &plan);

        if let Some(oom) = config.oom {
            match priority.set_kill_priority(oom.score) {
                Ok(()) => info!(score = oom.score, "oom kill priority set"),
                Err(e) if oom.strict => {
                    state.advance(RunPhase::Aborted);
                    return Err(anyhow::Error::new(e).context("set oom kill priority"));
                }
                Err(e) => warn!(error = %e, "oom kill priority not set, continuing"),
            }
        }

        state.advance(RunPhase::Running);
        let target_bytes = plan.target_bytes;
        let (ballast_tx, mut ballast_rx) = oneshot::channel();
        let allocator_config = config.allocator.clone();
        tokio::spawn(async move {
            let result = allocate_and_pin(target_bytes, &allocator_config).await;
            // Receiver gone means the run is already over.
            let _ = ballast_tx.send(result);
        });

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let monitor_probe = probe.clone();
        let monitor_reporter = reporter.clone();
        let monitor = tokio::spawn(watch_memory(
            monitor_probe,
            config.interval,
            cancel_rx,
            move |snapshot| monitor_reporter.report_snapshot(snapshot),
        ));

        tokio::pin!(shutdown);
        let mut ballast: Option<Ballast> = None;
        let mut allocator_settled = false;
        let signal = loop {
            tokio::select! {
                published = &mut ballast_rx, if !allocator_settled => {
                    allocator_settled = true;
                    match published {
                        Ok(Ok(pinned)) => {
                            info!(bytes = pinned.len(), "ballast pinned");
                            ballast = Some(pinned);
                        }
                        Ok(Err(e)) => {
                            info!(error = %e, "memory commitment refused by host");
                            state.advance(RunPhase::Cancelling);
                            let _ = cancel_tx.send(true);
                            let _ = monitor.await;
                            state.advance(RunPhase::Terminated);
                            return Ok(RunReport {
                                signal: None,
                                touched: false,
                                outcome: RunOutcome::CommitRefused,
                                target_bytes,
                            });
                        }
                        Err(_) => warn!("allocator task ended without publishing"),
                    }
                }
                signal = &mut shutdown => break signal,
            }
        };

        state.advance(RunPhase::SignalReceived);
        info!(signal = %signal, "termination signal received");
        info!(backtrace = %Backtrace::force_capture(), "shutdown call stack");

        state.advance(RunPhase::Cancelling);
        let _ = cancel_tx.send(true);
        let _ = monitor.await;

        let (outcome, touched) = if let Some(pinned) = ballast.as_mut() {
            state.advance(RunPhase::Touching);
            let touched = pinned.touch();
            info!(touched, bytes = pinned.len(), "final ballast touch");
            (RunOutcome::CleanTouch, touched)
        } else {
            warn!("signal arrived before ballast publish, skipping final touch");
            (RunOutcome::DegradedNoBallast, false)
        };

        state.advance(RunPhase::Terminated);
        Ok(RunReport {
            signal: Some(signal),
            touched,
            outcome,
            target_bytes,
        })
    }
}
