//! Bot configuration loaded from YAML

use crate::media_only::ProbeFailurePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Default location of the config file
pub const CONFIG_FILE: &str = "config/moderation.yaml";
/// Environment variable that overrides [`CONFIG_FILE`]
pub const CONFIG_ENV: &str = "MODERATION_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for one moderated guild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// The guild whose members are moderated
    pub guild_id: u64,
    /// Where moderation records are persisted
    pub data_file: PathBuf,
    pub expiry_check_interval_secs: u64,
    pub alert_channel_id: Option<u64>,
    pub changelog_channel_id: Option<u64>,
    /// Role granted to muted members
    pub mute_role_id: Option<u64>,
    pub probe_failure_policy: ProbeFailurePolicy,
    pub probe_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            guild_id: 0,
            data_file: PathBuf::from("data/moderation.yaml"),
            expiry_check_interval_secs: 60,
            alert_channel_id: None,
            changelog_channel_id: None,
            mute_role_id: None,
            probe_failure_policy: ProbeFailurePolicy::Abort,
            probe_timeout_secs: 10,
        }
    }
}

impl BotConfig {
    /// Load the config from `$MODERATION_CONFIG` or [`CONFIG_FILE`]
    ///
    /// # Errors
    /// See [`BotConfig::load_from`]
    pub async fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).map_or_else(|_| PathBuf::from(CONFIG_FILE), PathBuf::from);
        Self::load_from(path).await
    }

    /// Load and validate the config at `path`. A missing file yields the
    /// defaults, which still have to pass validation.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or the result
    /// is invalid
    pub async fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                info!("Loaded config from {}", path.display());
                serde_yaml::from_str::<Self>(&content).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns `Invalid` for a missing guild id or a zero interval/timeout
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.guild_id == 0 {
            return Err(ConfigError::Invalid("guild_id must be set".to_string()));
        }
        if self.expiry_check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "expiry_check_interval_secs must be positive".to_string(),
            ));
        }
        if self.probe_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "probe_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn expiry_check_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_check_interval_secs)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("moderation.yaml");
        tokio::fs::write(
            &path,
            "guild_id: 42\nmute_role_id: 7\nprobe_failure_policy: skip\n",
        )
        .await
        .unwrap();

        let config = BotConfig::load_from(&path).await.unwrap();
        assert_eq!(config.guild_id, 42);
        assert_eq!(config.mute_role_id, Some(7));
        assert_eq!(config.probe_failure_policy, ProbeFailurePolicy::Skip);
        assert_eq!(config.expiry_check_interval_secs, 60);
        assert_eq!(config.data_file, PathBuf::from("data/moderation.yaml"));
    }

    #[tokio::test]
    async fn test_missing_file_needs_guild() {
        let dir = tempdir().unwrap();
        let result = BotConfig::load_from(dir.path().join("absent.yaml")).await;
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_bad_yaml_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("moderation.yaml");
        tokio::fs::write(&path, "guild_id: [not a number").await.unwrap();

        assert!(matches!(
            BotConfig::load_from(&path).await,
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_validate() {
        let mut config = BotConfig {
            guild_id: 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        config.expiry_check_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
