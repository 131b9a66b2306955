#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use memballast::{
    AllocatorConfig, MemoryProbe, MemoryReadError, MemorySnapshot, MercySpec, OomConfig,
    PressureRunner, PriorityAdjustError, PriorityPort, RunConfig, RunOutcome, RunPhase, Strategy,
};
use std::time::Duration;
use tokio::sync::oneshot;

const GIB: u64 = 1 << 30;

#[derive(Clone)]
struct FixedProbe(MemorySnapshot);

impl MemoryProbe for FixedProbe {
    fn snapshot(&self) -> Result<MemorySnapshot, MemoryReadError> {
        Ok(self.0)
    }
}

#[derive(Clone)]
struct BrokenProbe;

impl MemoryProbe for BrokenProbe {
    fn snapshot(&self) -> Result<MemorySnapshot, MemoryReadError> {
        Err(MemoryReadError::Parse {
            path: "/proc/meminfo".into(),
            detail: "unreadable".into(),
        })
    }
}

struct NoopPort;

impl PriorityPort for NoopPort {
    fn set_kill_priority(&self, _score: u16) -> Result<(), PriorityAdjustError> {
        Ok(())
    }
}

struct FailingPort;

impl PriorityPort for FailingPort {
    fn set_kill_priority(&self, _score: u16) -> Result<(), PriorityAdjustError> {
        Err(PriorityAdjustError::Write {
            path: "/proc/self/oom_score_adj".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        })
    }
}

fn snap() -> MemorySnapshot {
    MemorySnapshot {
        total: 8 * GIB,
        used: 2 * GIB,
        available: 5 * GIB,
        used_percent: 25.0,
    }
}

fn small_target_config() -> RunConfig {
    RunConfig {
        size_override_bytes: Some(1 << 20),
        interval: Duration::from_secs(3600),
        allocator: AllocatorConfig {
            chunk_bytes: 1 << 16,
            pause: Duration::from_millis(1),
        },
        ..RunConfig::default()
    }
}

#[tokio::test]
async fn signal_after_handoff_triggers_final_touch() {
    let runner = PressureRunner::new(small_target_config(), FixedProbe(snap()), NoopPort);
    let state = runner.state();
    let (signal_tx, signal_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(runner.run(async move {
        let _ = signal_rx.await;
        "SIGTERM".to_string()
    }));

    // 1 MiB in 64 KiB chunks finishes well within this window.
    tokio::time::sleep(Duration::from_millis(300)).await;
    signal_tx.send(()).expect("signal");

    let report = run.await.expect("join").expect("run");
    assert_eq!(report.outcome, RunOutcome::CleanTouch);
    assert!(report.touched);
    assert_eq!(report.signal.as_deref(), Some("SIGTERM"));
    assert_eq!(report.target_bytes, 1 << 20);

    let history = state.history();
    assert_eq!(history.last(), Some(&RunPhase::Terminated));
    assert!(history
        .windows(2)
        .any(|pair| pair == [RunPhase::Touching, RunPhase::Terminated]));
}

#[tokio::test]
async fn signal_before_handoff_degrades_without_touch() {
    let config = RunConfig {
        allocator: AllocatorConfig {
            chunk_bytes: 1 << 10,
            pause: Duration::from_secs(10),
        },
        ..small_target_config()
    };
    let runner = PressureRunner::new(config, FixedProbe(snap()), NoopPort);
    let state = runner.state();

    // Signal already pending when the run starts.
    let (signal_tx, signal_rx) = oneshot::channel::<()>();
    signal_tx.send(()).expect("signal");
    let report = runner
        .run(async move {
            let _ = signal_rx.await;
            "SIGINT".to_string()
        })
        .await
        .expect("run");

    assert_eq!(report.outcome, RunOutcome::DegradedNoBallast);
    assert!(!report.touched);
    let history = state.history();
    assert!(!history.contains(&RunPhase::Touching));
    assert_eq!(history.last(), Some(&RunPhase::Terminated));
}

#[tokio::test]
async fn refused_commitment_is_a_valid_terminal_state() {
    let probe = FixedProbe(MemorySnapshot {
        total: 1 << 62,
        used: 0,
        available: 1 << 61,
        used_percent: 0.0,
    });
    let config = RunConfig {
        strategy: Strategy::AvailableMemory,
        mercy: MercySpec::Bytes(0),
        interval: Duration::from_secs(3600),
        ..RunConfig::default()
    };
    let runner = PressureRunner::new(config, probe, NoopPort);
    let state = runner.state();

    let report = runner
        .run(std::future::pending::<String>())
        .await
        .expect("run");
    assert_eq!(report.outcome, RunOutcome::CommitRefused);
    assert_eq!(report.signal, None);
    assert!(!report.touched);
    assert_eq!(state.current(), RunPhase::Terminated);
}

#[tokio::test]
async fn probe_failure_aborts_before_allocation() {
    let runner = PressureRunner::new(RunConfig::default(), BrokenProbe, NoopPort);
    let state = runner.state();
    let err = runner.run(std::future::pending::<String>()).await;
    assert!(err.is_err());
    assert_eq!(state.current(), RunPhase::Aborted);
}

#[tokio::test]
async fn oversized_mercy_aborts_before_allocation() {
    let config = RunConfig {
        mercy: MercySpec::Bytes(u64::MAX),
        ..RunConfig::default()
    };
    let runner = PressureRunner::new(config, FixedProbe(snap()), NoopPort);
    let state = runner.state();
    let err = runner.run(std::future::pending::<String>()).await;
    assert!(err.is_err());
    assert_eq!(state.current(), RunPhase::Aborted);
}

#[tokio::test]
async fn strict_priority_failure_aborts() {
    let config = RunConfig {
        oom: Some(OomConfig {
            score: 1000,
            strict: true,
        }),
        ..small_target_config()
    };
    let runner = PressureRunner::new(config, FixedProbe(snap()), FailingPort);
    let state = runner.state();
    let err = runner.run(std::future::pending::<String>()).await;
    assert!(err.is_err());
    assert_eq!(state.current(), RunPhase::Aborted);
}

#[tokio::test]
async fn lenient_priority_failure_degrades_and_runs() {
    let config = RunConfig {
        oom: Some(OomConfig {
            score: 1000,
            strict: false,
        }),
        ..small_target_config()
    };
    let runner = PressureRunner::new(config, FixedProbe(snap()), FailingPort);
    let state = runner.state();

    let (signal_tx, signal_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(runner.run(async move {
        let _ = signal_rx.await;
        "SIGTERM".to_string()
    }));
    tokio::time::sleep(Duration::from_millis(300)).await;
    signal_tx.send(()).expect("signal");

    let report = run.await.expect("join").expect("run");
    assert_eq!(report.outcome, RunOutcome::CleanTouch);
    assert!(state.history().contains(&RunPhase::Running));
}
