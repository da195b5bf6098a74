//! The periodic probe cycle and how it reacts to each outcome.
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod supervisor;

use crate::notifications::format::{self, ReportFormat};
use crate::notifications::{Notification, NotificationService};
use crate::probe::{CleanupStatus, Probe, ProbeMode, ProbeOutcome};
use crate::registry::{Registry, Target};

pub use supervisor::Supervisor;

/// What every monitor task shares.
pub struct MonitorContext {
    pub registry: Arc<Registry>,
    pub probe: Arc<Probe>,
    pub notifier: NotificationService,
    pub format: ReportFormat,
}

/// Runs one cycle for `host`. Returns the interval to sleep before the next
/// one, or `None` once the target is no longer registered.
pub async fn run_cycle(ctx: &MonitorContext, host: &str) -> Option<u64> {
    // Re-read every cycle; interval and workload may have changed.
    let target = ctx.registry.get(host).await?;
    debug!(host = %host, name = %target.name, "Starting probe cycle.");

    let outcome = ctx.probe.probe(&target, ProbeMode::Scheduled).await;
    for notification in reaction(&ctx.format, &target, &outcome) {
        ctx.notifier.dispatch(notification).await;
    }

    debug!(host = %host, interval_secs = target.interval_secs, "Probe cycle finished.");
    Some(target.interval_secs)
}

/// The notifications one outcome produces.
///
/// Alerts ignore `notifications_enabled`; only the routine report honours it.
pub fn reaction(fmt: &ReportFormat, target: &Target, outcome: &ProbeOutcome) -> Vec<Notification> {
    let mut out = Vec::new();
    match outcome {
        ProbeOutcome::Unreachable { detail } => {
            warn!(host = %target.host, error = %detail, "Server unreachable.");
            out.push(Notification::critical(format::unreachable(target, detail)));
        }
        ProbeOutcome::WorkloadDown(report) => {
            let workload = report.workload.as_ref().map(|w| w.name.as_str()).unwrap_or_default();
            warn!(host = %target.host, workload = %workload, "Container is not running.");
            out.push(Notification::critical(format::workload_down(target, workload)));
        }
        ProbeOutcome::Healthy(report) => {
            info!(host = %target.host, "Server healthy.");
            if target.notifications_enabled {
                out.push(Notification::routine(fmt.status(target, report)));
            }
        }
    }

    if let ProbeOutcome::Healthy(report) | ProbeOutcome::WorkloadDown(report) = outcome {
        if let Some(CleanupStatus::Failed(detail)) = &report.cleanup {
            out.push(Notification::warning(format::cleanup_failed(target, detail)));
        }
    }
    out
}

/// Cycles until the target disappears from the registry.
pub async fn monitor_loop(ctx: Arc<MonitorContext>, host: String) {
    info!(host = %host, "Monitoring started.");
    while let Some(interval_secs) = run_cycle(&ctx, &host).await {
        tokio::time::sleep(Duration::from_secs(interval_secs)).await;
    }
    info!(host = %host, "Server no longer registered, monitoring ended.");
}
