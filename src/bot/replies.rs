//! Replies shared by both command surfaces.
use crate::notifications::format::{self, escape};
use crate::probe::{ON_DEMAND_LOG_LINES, ProbeMode, ProbeOutcome};
use crate::registry::Target;
use crate::state::AppState;

/// On-demand status of one target. Never prunes.
pub async fn status(state: &AppState, target: &Target) -> String {
    match state.probe.probe(target, ProbeMode::OnDemand).await {
        ProbeOutcome::Healthy(report) => state.format.status(target, &report),
        ProbeOutcome::WorkloadDown(report) => {
            let workload = report.workload.as_ref().map(|w| w.name.as_str()).unwrap_or_default();
            format!(
                "{}\n\n{}",
                format::workload_down(target, workload),
                state.format.status(target, &report)
            )
        }
        ProbeOutcome::Unreachable { detail } => format::offline(target, &detail),
    }
}

/// The last lines of `workload`, or of the target's configured workload.
pub async fn logs(state: &AppState, target: &Target, workload: Option<&str>) -> String {
    let Some(workload) = workload.or(target.workload.as_deref()) else {
        return format!(
            "No container set for {}. Use /sc &lt;name&gt; &lt;container&gt; or pass one.",
            escape(&target.name)
        );
    };
    if let Err(e) = crate::registry::validate_workload(workload) {
        return escape(&e.to_string());
    }
    match state
        .probe
        .fetch_logs(&target.host, workload, ON_DEMAND_LOG_LINES)
        .await
    {
        Ok(text) => format::logs(workload, &text),
        Err(e) => format!("Failed to fetch logs: {}", format::sanitize(&e.to_string())),
    }
}

pub async fn output(state: &AppState, target: &Target) -> String {
    match state.probe.list_output(&target.host).await {
        Ok(listing) => state.format.output_listing(&listing),
        Err(e) => format!("Failed to run ls: {}", format::sanitize(&e.to_string())),
    }
}

pub async fn prune(state: &AppState, target: &Target) -> String {
    match state.probe.cleanup(&target.host).await {
        Ok(report) => state.format.cleanup(target, &report),
        Err(e) => format::cleanup_failed(target, &e.to_string()),
    }
}
