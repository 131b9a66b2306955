#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use anyhow::Result;
use clap::Parser;
use memballast::{Cli, OomScoreAdjPort, PressureRunner, ProcMemoryProbe};
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Cli::parse().into_config();

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let shutdown = async move {
        tokio::select! {
            _ = interrupt.recv() => "SIGINT".to_string(),
            _ = terminate.recv() => "SIGTERM".to_string(),
        }
    };

    let runner = PressureRunner::new(config, ProcMemoryProbe::default(), OomScoreAdjPort::default());
    let report = runner.run(shutdown).await?;
    info!(
        signal = ?report.signal,
        touched = report.touched,
        outcome = ?report.outcome,
        "run complete"
    );
    Ok(())
}
