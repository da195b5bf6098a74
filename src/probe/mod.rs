//! Read-only diagnostics against one monitored host.
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod cleanup;
pub mod disk;
pub mod executor;

use crate::registry::Target;
use cleanup::{KEEP_GENERATIONS, select_for_removal};
use disk::{DiskUsage, parse_available_gib, parse_df};
use executor::{CommandOutput, RemoteExecutor, TransportError, shell_quote};

/// Log lines included in a routine report.
pub const ROUTINE_LOG_LINES: u32 = 20;
/// Log lines fetched by an explicit log request.
pub const ON_DEMAND_LOG_LINES: u32 = 2000;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("`{command}` failed: {detail}")]
    Command { command: String, detail: String },
}

#[derive(Error, Debug)]
pub enum CleanupError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Could not determine free space on {volume}: {detail}")]
    UnknownFreeSpace { volume: String, detail: String },
    #[error("Could not list {dir}: {detail}")]
    ListFailed { dir: String, detail: String },
    #[error("Could not remove old output folders: {0}")]
    RemoveFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub available_gib: u64,
    /// Empty when free space was above the threshold or nothing was stale.
    pub removed: Vec<String>,
    pub triggered: bool,
}

/// Cleanup result as it appears in a scheduled cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStatus {
    Skipped { available_gib: u64 },
    Pruned { available_gib: u64, removed: Vec<String> },
    Failed(String),
}

impl From<CleanupReport> for CleanupStatus {
    fn from(report: CleanupReport) -> Self {
        if report.triggered {
            CleanupStatus::Pruned {
                available_gib: report.available_gib,
                removed: report.removed,
            }
        } else {
            CleanupStatus::Skipped {
                available_gib: report.available_gib,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadStatus {
    pub name: String,
    pub running: bool,
    pub log_tail: String,
}

/// Everything one successful probe collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub uptime: String,
    pub workloads: String,
    pub disk: DiskUsage,
    pub workload: Option<WorkloadStatus>,
    /// `None` for on-demand probes.
    pub cleanup: Option<CleanupStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy(ProbeReport),
    /// The configured workload is not among the running ones.
    WorkloadDown(ProbeReport),
    Unreachable { detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Periodic cycle: includes the conditional cleanup.
    Scheduled,
    /// Manual status request: read-only.
    OnDemand,
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub volume: String,
    pub output_dir: String,
    pub cleanup_threshold_gib: u64,
}

pub struct Probe {
    executor: Arc<dyn RemoteExecutor>,
    settings: ProbeSettings,
}

impl Probe {
    pub fn new(executor: Arc<dyn RemoteExecutor>, settings: ProbeSettings) -> Self {
        Self { executor, settings }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    async fn run(&self, host: &str, command: &str) -> Result<CommandOutput, TransportError> {
        self.executor.run(host, command).await
    }

    /// Runs the diagnostic sequence against `target`. Any transport failure
    /// turns the whole probe into `Unreachable`.
    pub async fn probe(&self, target: &Target, mode: ProbeMode) -> ProbeOutcome {
        match self.collect(target, mode).await {
            Ok(report) => {
                let down = report.workload.as_ref().is_some_and(|w| !w.running);
                if down {
                    ProbeOutcome::WorkloadDown(report)
                } else {
                    ProbeOutcome::Healthy(report)
                }
            }
            Err(e) => ProbeOutcome::Unreachable {
                detail: e.to_string(),
            },
        }
    }

    async fn collect(&self, target: &Target, mode: ProbeMode) -> Result<ProbeReport, TransportError> {
        let host = target.host.as_str();

        let uptime = self.run(host, "uptime").await?.stdout.trim().to_string();
        let workloads = self.run(host, "docker ps").await?.stdout;
        let disk = parse_df(&self.run(host, "df -h").await?.stdout, &self.settings.volume);

        let cleanup = match mode {
            ProbeMode::OnDemand => None,
            ProbeMode::Scheduled => Some(match self.cleanup(host).await {
                Ok(report) => report.into(),
                Err(CleanupError::Transport(e)) => return Err(e),
                Err(e) => {
                    warn!(host = %host, error = %e, "Cleanup failed.");
                    CleanupStatus::Failed(e.to_string())
                }
            }),
        };

        let workload = match &target.workload {
            Some(name) => Some(self.workload_status(host, name).await?),
            None => None,
        };

        debug!(host = %host, "Probe collected.");
        Ok(ProbeReport {
            uptime,
            workloads,
            disk,
            workload,
            cleanup,
        })
    }

    async fn workload_status(&self, host: &str, name: &str) -> Result<WorkloadStatus, TransportError> {
        let names = self
            .run(host, "docker ps --format '{{.Names}}'")
            .await?
            .stdout;
        let running = names.lines().any(|line| line.trim() == name);
        let log_tail = self
            .run(host, &logs_command(name, ROUTINE_LOG_LINES))
            .await?
            .stdout;
        Ok(WorkloadStatus {
            name: name.to_string(),
            running,
            log_tail,
        })
    }

    /// The last `lines` log lines of `workload`, stdout and stderr merged.
    pub async fn fetch_logs(&self, host: &str, workload: &str, lines: u32) -> Result<String, ProbeError> {
        let command = logs_command(workload, lines);
        let output = self.run(host, &command).await?;
        if !output.success() {
            return Err(ProbeError::Command {
                command,
                detail: output.failure_detail(),
            });
        }
        Ok(output.stdout)
    }

    /// Long listing of the output directory.
    pub async fn list_output(&self, host: &str) -> Result<String, ProbeError> {
        let command = format!("ls -lh {}", shell_quote(&self.settings.output_dir));
        let output = self.run(host, &command).await?;
        if !output.success() {
            return Err(ProbeError::Command {
                command,
                detail: output.failure_detail(),
            });
        }
        Ok(output.stdout)
    }

    /// Deletes stale step directories when free space on the monitored
    /// volume is below the threshold.
    pub async fn cleanup(&self, host: &str) -> Result<CleanupReport, CleanupError> {
        let volume = &self.settings.volume;
        let df = self.run(host, &format!("df -BG {}", shell_quote(volume))).await?;
        let available_gib =
            parse_available_gib(&df.stdout, volume).ok_or_else(|| CleanupError::UnknownFreeSpace {
                volume: volume.clone(),
                detail: df.failure_detail(),
            })?;

        if available_gib >= self.settings.cleanup_threshold_gib {
            return Ok(CleanupReport {
                available_gib,
                removed: Vec::new(),
                triggered: false,
            });
        }

        let dir = shell_quote(&self.settings.output_dir);
        let listing = self
            .run(
                host,
                &format!("find {dir} -mindepth 1 -maxdepth 1 -type d -printf '%f\\n'"),
            )
            .await?;
        if !listing.success() {
            return Err(CleanupError::ListFailed {
                dir: self.settings.output_dir.clone(),
                detail: listing.failure_detail(),
            });
        }

        let removed = select_for_removal(listing.stdout.lines().map(str::trim), KEEP_GENERATIONS);
        if !removed.is_empty() {
            let quoted: Vec<String> = removed.iter().map(|d| shell_quote(d)).collect();
            let result = self
                .run(host, &format!("cd {dir} && rm -rf -- {}", quoted.join(" ")))
                .await?;
            if !result.success() {
                return Err(CleanupError::RemoveFailed(result.failure_detail()));
            }
            info!(host = %host, available_gib, removed = ?removed, "Pruned old output folders.");
        }

        Ok(CleanupReport {
            available_gib,
            removed,
            triggered: true,
        })
    }
}

fn logs_command(workload: &str, lines: u32) -> String {
    format!("docker logs --tail {lines} {} 2>&1", shell_quote(workload))
}
