use std::sync::Arc;

use crate::monitor::Supervisor;
use crate::notifications::format::ReportFormat;
use crate::probe::Probe;
use crate::registry::Registry;

/// Shared state handed to every command handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub probe: Arc<Probe>,
    pub supervisor: Arc<Supervisor>,
    pub format: ReportFormat,
}

impl AppState {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        let ctx = supervisor.context().clone();
        Self {
            registry: ctx.registry.clone(),
            probe: ctx.probe.clone(),
            format: ctx.format.clone(),
            supervisor,
        }
    }

    pub fn help(&self) -> String {
        let settings = self.probe.settings();
        crate::notifications::format::help(
            &settings.volume,
            &settings.output_dir,
            settings.cleanup_threshold_gib,
        )
    }

    pub fn legacy_help(&self) -> String {
        let settings = self.probe.settings();
        crate::notifications::format::legacy_help(
            &settings.volume,
            &settings.output_dir,
            settings.cleanup_threshold_gib,
        )
    }
}
