//! JSON settings documents behind the registry.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use super::{RegistrySnapshot, Target};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Settings file {path} is not valid: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Settings write did not complete: {0}")]
    Task(String),
}

/// A persistence backend for the whole registry snapshot.
pub trait SettingsStore: Send + Sync {
    /// Returns an empty snapshot when the document does not exist yet.
    fn load(&self) -> Result<RegistrySnapshot, StoreError>;
    fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), StoreError>;
}

fn read_document<T>(path: &Path) -> Result<Option<T>, StoreError>
where
    T: for<'de> Deserialize<'de>,
{
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = ?path, "Settings file does not exist yet.");
            return Ok(None);
        }
        Err(source) => {
            return Err(StoreError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| StoreError::Parse {
            path: path.display().to_string(),
            source,
        })
}

/// Serializes `document` into a sibling temp file and renames it over `path`.
fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<(), StoreError> {
    let io_err = |source: io::Error| StoreError::Io {
        path: path.display().to_string(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    serde_json::to_writer_pretty(&mut temp, document).map_err(|e| io_err(e.into()))?;
    temp.write_all(b"\n").map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Decodes every value of an ordered JSON object, skipping malformed entries.
fn decode_entries<T>(map: Map<String, Value>, path: &Path) -> Vec<(String, T)>
where
    T: for<'de> Deserialize<'de>,
{
    map.into_iter()
        .filter_map(|(host, value)| match serde_json::from_value::<T>(value) {
            Ok(entry) => Some((host, entry)),
            Err(e) => {
                warn!(path = ?path, host = %host, error = %e, "Skipping malformed settings entry.");
                None
            }
        })
        .collect()
}

// --- Multi-server document ---

#[derive(Serialize, Deserialize, Default)]
struct ServersDocument {
    #[serde(default)]
    servers: Map<String, Value>,
    /// Historical global fallback interval.
    #[serde(default, skip_serializing)]
    interval: Option<u64>,
    /// Historical location of per-host containers.
    #[serde(default, skip_serializing)]
    ips: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Default)]
struct ServerEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    periodic_running: Option<bool>,
}

#[derive(Serialize, Deserialize, Default)]
struct IpEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    container: Option<String>,
}

/// `{ "servers": { "<host>": { "name", "container", "interval", "periodic_running" } } }`
pub struct MultiServerStore {
    path: PathBuf,
    default_interval_secs: u64,
}

impl MultiServerStore {
    pub fn new(path: impl Into<PathBuf>, default_interval_secs: u64) -> Self {
        Self {
            path: path.into(),
            default_interval_secs,
        }
    }
}

impl SettingsStore for MultiServerStore {
    fn load(&self) -> Result<RegistrySnapshot, StoreError> {
        let Some(document) = read_document::<ServersDocument>(&self.path)? else {
            return Ok(RegistrySnapshot::default());
        };
        let legacy_containers: Vec<(String, IpEntry)> = decode_entries(document.ips, &self.path);
        let fallback_interval = document.interval.unwrap_or(self.default_interval_secs);

        let targets = decode_entries::<ServerEntry>(document.servers, &self.path)
            .into_iter()
            .map(|(host, entry)| {
                let workload = entry.container.or_else(|| {
                    legacy_containers
                        .iter()
                        .find(|(h, _)| *h == host)
                        .and_then(|(_, ip)| ip.container.clone())
                });
                Target {
                    name: entry.name.unwrap_or_else(|| host.clone()),
                    workload,
                    interval_secs: entry.interval.unwrap_or(fallback_interval),
                    notifications_enabled: entry.periodic_running.unwrap_or(true),
                    host,
                }
            })
            .collect();

        Ok(RegistrySnapshot {
            targets,
            active: None,
        })
    }

    fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), StoreError> {
        let mut servers = Map::new();
        for target in &snapshot.targets {
            let entry = ServerEntry {
                name: Some(target.name.clone()),
                container: target.workload.clone(),
                interval: Some(target.interval_secs),
                periodic_running: Some(target.notifications_enabled),
            };
            let value = serde_json::to_value(entry).map_err(|e| StoreError::Io {
                path: self.path.display().to_string(),
                source: e.into(),
            })?;
            servers.insert(target.host.clone(), value);
        }
        write_document(
            &self.path,
            &ServersDocument {
                servers,
                ..Default::default()
            },
        )
    }
}

// --- Legacy single-target document ---

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize)]
struct LegacyDocument {
    #[serde(default = "default_true")]
    periodic_running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interval: Option<u64>,
    #[serde(default)]
    ips: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    active_ip: Option<String>,
}

/// `{ "periodic_running", "interval", "ips": { "<host>": { "container" } }, "active_ip" }`
///
/// Interval and notification flag are global in this layout; every target
/// shares the values of the active one.
pub struct LegacyStore {
    path: PathBuf,
    default_interval_secs: u64,
}

impl LegacyStore {
    pub fn new(path: impl Into<PathBuf>, default_interval_secs: u64) -> Self {
        Self {
            path: path.into(),
            default_interval_secs,
        }
    }
}

impl SettingsStore for LegacyStore {
    fn load(&self) -> Result<RegistrySnapshot, StoreError> {
        let Some(document) = read_document::<LegacyDocument>(&self.path)? else {
            return Ok(RegistrySnapshot::default());
        };
        let interval_secs = document.interval.unwrap_or(self.default_interval_secs);
        let make_target = |host: String, workload: Option<String>| Target {
            name: host.clone(),
            host,
            workload,
            interval_secs,
            notifications_enabled: document.periodic_running,
        };

        let mut targets: Vec<Target> = decode_entries::<IpEntry>(document.ips, &self.path)
            .into_iter()
            .map(|(host, entry)| make_target(host, entry.container))
            .collect();
        if let Some(active) = &document.active_ip {
            if !targets.iter().any(|t| &t.host == active) {
                targets.push(make_target(active.clone(), None));
            }
        }

        Ok(RegistrySnapshot {
            targets,
            active: document.active_ip,
        })
    }

    fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), StoreError> {
        let governing = snapshot
            .active
            .as_deref()
            .and_then(|host| snapshot.targets.iter().find(|t| t.host == host))
            .or_else(|| snapshot.targets.first());

        let mut ips = Map::new();
        for target in &snapshot.targets {
            let value = serde_json::to_value(IpEntry {
                container: target.workload.clone(),
            })
            .map_err(|e| StoreError::Io {
                path: self.path.display().to_string(),
                source: e.into(),
            })?;
            ips.insert(target.host.clone(), value);
        }

        write_document(
            &self.path,
            &LegacyDocument {
                periodic_running: governing.is_none_or(|t| t.notifications_enabled),
                interval: Some(governing.map_or(self.default_interval_secs, |t| t.interval_secs)),
                ips,
                active_ip: snapshot.active.clone(),
            },
        )
    }
}

/// Copies every target from one backend into another. Returns the number of
/// targets written.
pub fn migrate(from: &dyn SettingsStore, to: &dyn SettingsStore) -> Result<usize, StoreError> {
    let snapshot = from.load()?;
    to.save(&snapshot)?;
    Ok(snapshot.targets.len())
}
