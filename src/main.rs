mod blackboard; // brings `blackboard.rs` in as `crate::blackboard`
mod bus; // brings `bus.rs` in as `crate::bus`
mod config; // brings `config.rs` in as `crate::config`
mod link; // brings `link.rs` in as `crate::link`
mod mission; // brings `mission.rs` in as `crate::mission`

use blackboard::{Blackboard, raise_fault, record_report, snapshot};
use bus::Topic;
use config::Settings;

use anyhow::Context;
use rover_navigation::{StateReport, TaskControl};
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

const STATUS_CAPACITY: usize = 64;
const HEARTBEAT: Duration = Duration::from_secs(1);
/// A running mission that stays silent this long is flagged on the blackboard.
const STALL_AFTER: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Arena rover starting.");
    let settings = Settings::load().context("loading settings")?;
    info!(
        mode = ?settings.rover.mode,
        height = settings.arena.height,
        width = settings.arena.width,
        "settings loaded"
    );

    let bb: Blackboard = Arc::default();
    let status: Topic<StateReport> = Topic::new(STATUS_CAPACITY);
    let control = TaskControl::new();

    let monitor = tokio::spawn(monitor(bb.clone(), status.subscribe()));

    tokio::spawn({
        let control = control.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("Ctrl-C received, cancelling the mission.");
                    control.cancel();
                }
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
        }
    });

    let mission = tokio::task::spawn_blocking(move || mission::run(&settings, control, status));
    let outcome = mission.await.context("mission task panicked")?;
    monitor.abort();

    let board = snapshot(&bb);
    match outcome {
        Ok(summary) => {
            info!(
                termination = %summary.exploration.termination,
                explored = summary.exploration.explored_pct,
                labels = summary.labels_recorded,
                reports = board.reports_seen,
                "Mission finished: {}",
                summary.final_state.status
            );
            if let Some(route) = summary.route {
                info!(route = %route.concat(), "fastest path");
            }
            for fault in &board.faults {
                warn!(fault, "fault raised during the mission");
            }
            Ok(())
        }
        Err(e) => {
            error!("Mission failed: {:?}", e);
            Err(e)
        }
    }
}

/// Drains status reports into the blackboard and flags a silent mission.
async fn monitor(bb: Blackboard, mut status_rx: broadcast::Receiver<Arc<StateReport>>) {
    info!("Status monitor started.");
    let mut tick = tokio::time::interval(HEARTBEAT);
    loop {
        tokio::select! {
            received = status_rx.recv() => match received {
                Ok(report) => {
                    info!(x = report.x, y = report.y, heading = %report.heading, explored = report.explored_pct, "{}", report.status);
                    record_report(&bb, &report);
                }
                Err(RecvError::Lagged(missed)) => warn!(missed, "status monitor fell behind"),
                Err(RecvError::Closed) => {
                    info!("Status feed closed.");
                    break;
                }
            },
            _ = tick.tick() => {
                let age = snapshot(&bb).last_report_ts.elapsed();
                if age > STALL_AFTER {
                    warn!(?age, "No status report from the mission.");
                    raise_fault(&bb, "status feed stalled");
                }
            }
        }
    }
}
