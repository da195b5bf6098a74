use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::registry::MIN_INTERVAL_SECS;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Which on-disk settings document (and matching command surface) is in use.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SettingsLayout {
    /// `{ "servers": { "<host>": {...} } }`, many targets addressed by name.
    #[default]
    Multi,
    /// `{ "ips": {...}, "active_ip": ... }`, one implicit active target.
    Legacy,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: String,
    pub telegram_chat_id: i64,
    pub ssh_username: String,
    pub private_key_path: String,
    pub settings_file: String,
    pub settings_layout: SettingsLayout,
    pub default_interval_secs: u64,
    pub monitored_volume: String,
    pub output_dir: String,
    pub cleanup_threshold_gib: u64,
    pub disk_warn_percent: u8,
    pub connect_timeout_secs: u64,
    pub log_dir: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
pub(crate) struct PartialBotConfig {
    telegram_token: Option<String>,
    telegram_chat_id: Option<i64>,
    ssh_username: Option<String>,
    private_key_path: Option<String>,
    settings_file: Option<String>,
    settings_layout: Option<SettingsLayout>,
    default_interval_secs: Option<u64>,
    monitored_volume: Option<String>,
    output_dir: Option<String>,
    cleanup_threshold_gib: Option<u64>,
    disk_warn_percent: Option<u8>,
    connect_timeout_secs: Option<u64>,
    log_dir: Option<String>,
}

fn default_settings_file() -> String {
    "settings.json".to_string()
}

fn default_monitored_volume() -> String {
    "/dev/vdb".to_string()
}

fn default_output_dir() -> String {
    "/mnt/output".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_CLEANUP_THRESHOLD_GIB: u64 = 20;
pub const DEFAULT_DISK_WARN_PERCENT: u8 = 80;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

impl BotConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path_str) => read_file_config(Path::new(path_str))?,
            None => PartialBotConfig::default(),
        };

        // 2. Load from environment variables
        let env_config: PartialBotConfig = envy::from_env::<PartialBotConfig>()?;

        // 3. Merge: environment overrides file
        Self::merge(env_config, file_config)
    }

    pub(crate) fn merge(
        env_config: PartialBotConfig,
        file_config: PartialBotConfig,
    ) -> Result<Self, ConfigError> {
        let default_interval_secs = env_config
            .default_interval_secs
            .or(file_config.default_interval_secs)
            .unwrap_or(DEFAULT_INTERVAL_SECS)
            .max(MIN_INTERVAL_SECS);

        Ok(BotConfig {
            telegram_token: env_config
                .telegram_token
                .or(file_config.telegram_token)
                .ok_or(ConfigError::Missing("TELEGRAM_TOKEN"))?,
            telegram_chat_id: env_config
                .telegram_chat_id
                .or(file_config.telegram_chat_id)
                .ok_or(ConfigError::Missing("TELEGRAM_CHAT_ID"))?,
            ssh_username: env_config
                .ssh_username
                .or(file_config.ssh_username)
                .ok_or(ConfigError::Missing("SSH_USERNAME"))?,
            private_key_path: env_config
                .private_key_path
                .or(file_config.private_key_path)
                .ok_or(ConfigError::Missing("PRIVATE_KEY_PATH"))?,
            settings_file: env_config
                .settings_file
                .or(file_config.settings_file)
                .unwrap_or_else(default_settings_file),
            settings_layout: env_config
                .settings_layout
                .or(file_config.settings_layout)
                .unwrap_or_default(),
            default_interval_secs,
            monitored_volume: env_config
                .monitored_volume
                .or(file_config.monitored_volume)
                .unwrap_or_else(default_monitored_volume),
            output_dir: env_config
                .output_dir
                .or(file_config.output_dir)
                .unwrap_or_else(default_output_dir),
            cleanup_threshold_gib: env_config
                .cleanup_threshold_gib
                .or(file_config.cleanup_threshold_gib)
                .unwrap_or(DEFAULT_CLEANUP_THRESHOLD_GIB),
            disk_warn_percent: env_config
                .disk_warn_percent
                .or(file_config.disk_warn_percent)
                .unwrap_or(DEFAULT_DISK_WARN_PERCENT),
            connect_timeout_secs: env_config
                .connect_timeout_secs
                .or(file_config.connect_timeout_secs)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
        })
    }
}

fn read_file_config(path: &Path) -> Result<PartialBotConfig, ConfigError> {
    if !path.exists() {
        return Ok(PartialBotConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn required_file_config() -> PartialBotConfig {
        toml::from_str(
            r#"
            telegram_token = "file-token"
            telegram_chat_id = 42
            ssh_username = "ops"
            private_key_path = "/keys/id_ed25519"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_fill_optional_keys() {
        let config = BotConfig::merge(PartialBotConfig::default(), required_file_config()).unwrap();

        assert_eq!(config.telegram_token, "file-token");
        assert_eq!(config.telegram_chat_id, 42);
        assert_eq!(config.settings_file, "settings.json");
        assert_eq!(config.settings_layout, SettingsLayout::Multi);
        assert_eq!(config.default_interval_secs, 60);
        assert_eq!(config.monitored_volume, "/dev/vdb");
        assert_eq!(config.output_dir, "/mnt/output");
        assert_eq!(config.cleanup_threshold_gib, 20);
        assert_eq!(config.disk_warn_percent, 80);
        assert_eq!(config.connect_timeout_secs, 5);
    }

    #[test]
    fn test_env_overrides_file() {
        let env_config = PartialBotConfig {
            telegram_token: Some("env-token".to_string()),
            settings_layout: Some(SettingsLayout::Legacy),
            ..Default::default()
        };
        let config = BotConfig::merge(env_config, required_file_config()).unwrap();

        assert_eq!(config.telegram_token, "env-token");
        assert_eq!(config.ssh_username, "ops");
        assert_eq!(config.settings_layout, SettingsLayout::Legacy);
    }

    #[test]
    fn test_missing_required_key() {
        let result = BotConfig::merge(PartialBotConfig::default(), PartialBotConfig::default());
        assert!(matches!(result, Err(ConfigError::Missing("TELEGRAM_TOKEN"))));
    }

    #[test]
    fn test_default_interval_never_below_minimum() {
        let mut file_config = required_file_config();
        file_config.default_interval_secs = Some(3);
        let config = BotConfig::merge(PartialBotConfig::default(), file_config).unwrap();
        assert_eq!(config.default_interval_secs, MIN_INTERVAL_SECS);
    }

    #[test]
    fn test_read_file_config_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "settings_layout = \"legacy\"\nlog_dir = \"/var/log/uptimebot\"").unwrap();

        let partial = read_file_config(file.path()).unwrap();
        assert_eq!(partial.settings_layout, Some(SettingsLayout::Legacy));
        assert_eq!(partial.log_dir.as_deref(), Some("/var/log/uptimebot"));
    }

    #[test]
    fn test_missing_file_is_empty_layer() {
        let partial = read_file_config(Path::new("/nonexistent/uptimebot.toml")).unwrap();
        assert!(partial.telegram_token.is_none());
    }
}
