//! Target registry: the single owner of every monitored host's configuration.
//!
//! All mutations go through one async mutex and are persisted as a whole
//! snapshot before they become visible in memory.
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

pub mod store;

use store::{SettingsStore, StoreError};

/// Lower bound for a target's poll interval.
pub const MIN_INTERVAL_SECS: u64 = 10;

/// One monitored host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub name: String,
    pub workload: Option<String>,
    pub interval_secs: u64,
    /// Suppresses only the routine report, never alerts.
    pub notifications_enabled: bool,
}

impl Target {
    pub fn new(host: &str, name: &str, interval_secs: u64) -> Self {
        Self {
            host: host.to_string(),
            name: name.to_string(),
            workload: None,
            interval_secs,
            notifications_enabled: true,
        }
    }
}

/// Everything a settings document holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub targets: Vec<Target>,
    /// Host of the implicit target of the single-target command surface.
    pub active: Option<String>,
}

impl RegistrySnapshot {
    fn position(&self, host: &str) -> Option<usize> {
        self.targets.iter().position(|t| t.host == host)
    }

    fn target_mut(&mut self, host: &str) -> Result<&mut Target, RegistryError> {
        self.targets
            .iter_mut()
            .find(|t| t.host == host)
            .ok_or_else(|| RegistryError::NotFound(host.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{0} is already registered")]
    AlreadyExists(String),
    #[error("The name '{0}' is already used by another server")]
    NameTaken(String),
    #[error("No server named '{0}' found")]
    NotFound(String),
    #[error("The interval must be at least {min} seconds (got {seconds})")]
    InvalidInterval { seconds: u64, min: u64 },
    #[error("'{0}' is not a valid host address")]
    InvalidHost(String),
    #[error("'{0}' is not a valid container name")]
    InvalidWorkload(String),
    #[error("Failed to persist settings: {0}")]
    Store(#[from] StoreError),
}

pub struct Registry {
    state: Mutex<RegistrySnapshot>,
    store: Arc<dyn SettingsStore>,
    default_interval_secs: u64,
}

impl Registry {
    /// Loads the persisted snapshot and writes it back once, so a missing
    /// settings file is created and an unwritable path fails at start-up.
    pub fn open(
        store: Box<dyn SettingsStore>,
        default_interval_secs: u64,
    ) -> Result<Self, StoreError> {
        let snapshot = store.load()?;
        store.save(&snapshot)?;
        info!(targets = snapshot.targets.len(), "Loaded server registry.");
        Ok(Self {
            state: Mutex::new(snapshot),
            store: Arc::from(store),
            default_interval_secs: default_interval_secs.max(MIN_INTERVAL_SECS),
        })
    }

    /// Applies `f` to a copy of the current snapshot, persists the copy and
    /// only then swaps it in.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut RegistrySnapshot) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        // File writes and fsync block, so they run off the runtime threads
        // while the lock keeps other mutations queued.
        let store = self.store.clone();
        let snapshot = next.clone();
        tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        *guard = next;
        Ok(out)
    }

    pub async fn register(&self, host: &str, name: &str) -> Result<Target, RegistryError> {
        validate_host(host)?;
        let target = Target::new(host, name, self.default_interval_secs);
        let created = self
            .mutate(|snapshot| {
                if snapshot.position(host).is_some() {
                    return Err(RegistryError::AlreadyExists(host.to_string()));
                }
                if snapshot.targets.iter().any(|t| t.name == name) {
                    return Err(RegistryError::NameTaken(name.to_string()));
                }
                snapshot.targets.push(target.clone());
                Ok(target)
            })
            .await?;
        info!(host = %created.host, name = %created.name, "Registered server.");
        Ok(created)
    }

    /// Unregisters the target with the given display name.
    pub async fn remove(&self, name: &str) -> Result<Target, RegistryError> {
        let removed = self
            .mutate(|snapshot| {
                let index = snapshot
                    .targets
                    .iter()
                    .position(|t| t.name == name)
                    .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
                let removed = snapshot.targets.remove(index);
                if snapshot.active.as_deref() == Some(removed.host.as_str()) {
                    snapshot.active = None;
                }
                Ok(removed)
            })
            .await?;
        info!(host = %removed.host, name = %removed.name, "Removed server.");
        Ok(removed)
    }

    pub async fn find_by_name(&self, name: &str) -> Option<Target> {
        self.state
            .lock()
            .await
            .targets
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }

    pub async fn resolve(&self, name: &str) -> Result<Target, RegistryError> {
        self.find_by_name(name)
            .await
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub async fn get(&self, host: &str) -> Option<Target> {
        self.state
            .lock()
            .await
            .targets
            .iter()
            .find(|t| t.host == host)
            .cloned()
    }

    pub async fn set_interval(&self, host: &str, seconds: u64) -> Result<Target, RegistryError> {
        if seconds < MIN_INTERVAL_SECS {
            return Err(RegistryError::InvalidInterval {
                seconds,
                min: MIN_INTERVAL_SECS,
            });
        }
        self.mutate(|snapshot| {
            let target = snapshot.target_mut(host)?;
            target.interval_secs = seconds;
            Ok(target.clone())
        })
        .await
    }

    pub async fn set_workload(&self, host: &str, workload: &str) -> Result<Target, RegistryError> {
        validate_workload(workload)?;
        self.mutate(|snapshot| {
            let target = snapshot.target_mut(host)?;
            target.workload = Some(workload.to_string());
            Ok(target.clone())
        })
        .await
    }

    pub async fn set_notifications_enabled(
        &self,
        host: &str,
        enabled: bool,
    ) -> Result<Target, RegistryError> {
        self.mutate(|snapshot| {
            let target = snapshot.target_mut(host)?;
            target.notifications_enabled = enabled;
            Ok(target.clone())
        })
        .await
    }

    /// Snapshot of all targets in registration order.
    pub async fn list(&self) -> Vec<Target> {
        self.state.lock().await.targets.clone()
    }

    pub async fn active(&self) -> Option<Target> {
        let guard = self.state.lock().await;
        let host = guard.active.as_deref()?;
        guard.targets.iter().find(|t| t.host == host).cloned()
    }

    /// Makes `host` the active target, registering it under its own address
    /// when it is not known yet. Returns the target and the previously
    /// active host, if it differs.
    pub async fn activate(&self, host: &str) -> Result<(Target, Option<String>), RegistryError> {
        validate_host(host)?;
        let default_interval_secs = self.default_interval_secs;
        self.mutate(|snapshot| {
            let index = match snapshot.position(host) {
                Some(index) => index,
                None => {
                    if snapshot.targets.iter().any(|t| t.name == host) {
                        return Err(RegistryError::NameTaken(host.to_string()));
                    }
                    snapshot
                        .targets
                        .push(Target::new(host, host, default_interval_secs));
                    snapshot.targets.len() - 1
                }
            };
            // The single-target layout shares one interval and flag, so the
            // incoming target inherits them whether it is new or known.
            if let Some(previous) = snapshot
                .active
                .as_deref()
                .and_then(|h| snapshot.targets.iter().find(|t| t.host == h))
            {
                let (interval_secs, notifications_enabled) =
                    (previous.interval_secs, previous.notifications_enabled);
                let target = &mut snapshot.targets[index];
                target.interval_secs = interval_secs;
                target.notifications_enabled = notifications_enabled;
            }
            let target = snapshot.targets[index].clone();
            let previous = snapshot.active.replace(host.to_string());
            Ok((target, previous.filter(|p| p != host)))
        })
        .await
    }
}

fn validate_host(host: &str) -> Result<(), RegistryError> {
    let valid = !host.is_empty()
        && !host.starts_with('-')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidHost(host.to_string()))
    }
}

pub fn validate_workload(workload: &str) -> Result<(), RegistryError> {
    let mut chars = workload.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidWorkload(workload.to_string()))
    }
}
