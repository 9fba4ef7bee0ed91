//! Engine configuration
//!
//! Every section is optional in the file and falls back to defaults, so
//! an absent or empty config is always valid. Paths left unset resolve
//! against the engine's working directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bndl_errors::{ConfigError, Result};
use bndl_fileops::RetryPolicy;
use bndl_net::NetConfig;
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Top level configuration for one [`Engine`](crate::Engine)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub registration: RegistrationConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub restore_point: RestorePointConfig,
}

/// Payload store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Store directory; defaults to `<working dir>/cache`
    pub dir: Option<PathBuf>,
    /// Keep payloads after a successful apply unless the plan says otherwise
    #[serde(default)]
    pub keep_payloads: bool,
}

/// Session registration configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Registration directory; defaults to `<working dir>/session`
    pub dir: Option<PathBuf>,
}

/// Retry policy for file operations and payload acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_wait_ms")]
    pub wait_ms: u64,
}

/// Download client configuration, in whole seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    /// Overrides the built-in user agent when set
    pub user_agent: Option<String>,
}

/// Restore point behavior around registration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestorePointConfig {
    /// Ask the attached system services for a restore point before apply
    #[serde(default)]
    pub enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            wait_ms: default_retry_wait_ms(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            retry_count: default_retry_count(),
            retry_delay: default_retry_delay(),
            user_agent: None,
        }
    }
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_wait_ms() -> u64 {
    250
}

fn default_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1
}

impl EngineConfig {
    /// Load from `path` when given, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, parsed, or holds
    /// an invalid value.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path).await,
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, parsed, or holds
    /// an invalid value.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.network.timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.timeout".to_string(),
                message: "must be at least 1 second".to_string(),
            }
            .into());
        }
        if self.network.connect_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.connect_timeout".to_string(),
                message: "must be at least 1 second".to_string(),
            }
            .into());
        }
        Ok(())
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.attempts, Duration::from_millis(self.retry.wait_ms))
    }

    #[must_use]
    pub fn net_config(&self) -> NetConfig {
        let defaults = NetConfig::default();
        NetConfig {
            timeout: Duration::from_secs(self.network.timeout),
            connect_timeout: Duration::from_secs(self.network.connect_timeout),
            retry_count: self.network.retry_count,
            retry_delay: Duration::from_secs(self.network.retry_delay),
            user_agent: self
                .network
                .user_agent
                .clone()
                .unwrap_or(defaults.user_agent),
        }
    }

    #[must_use]
    pub fn cache_dir(&self, working_dir: &Path) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| working_dir.join("cache"))
    }

    #[must_use]
    pub fn registration_dir(&self, working_dir: &Path) -> PathBuf {
        self.registration
            .dir
            .clone()
            .unwrap_or_else(|| working_dir.join("session"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bndl_errors::Error;

    #[test]
    fn defaults_are_usable() {
        let config = EngineConfig::default();
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.retry_policy().max_runs(), 4);
        assert_eq!(config.net_config().timeout, Duration::from_secs(300));
        assert!(!config.cache.keep_payloads);
        assert!(!config.restore_point.enabled);
    }

    #[test]
    fn partial_file_fills_missing_sections() {
        let config: EngineConfig = toml::from_str(
            r#"
            [retry]
            attempts = 1
            wait_ms = 10

            [cache]
            keep_payloads = true
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.attempts, 1);
        assert_eq!(config.retry.wait_ms, 10);
        assert!(config.cache.keep_payloads);
        // Untouched sections keep their defaults.
        assert_eq!(config.network.timeout, 300);
        assert!(config.registration.dir.is_none());
    }

    #[test]
    fn directories_resolve_against_working_dir() {
        let config: EngineConfig = toml::from_str(
            r#"
            [cache]
            dir = "/var/lib/bndl/store"
            "#,
        )
        .unwrap();
        let root = Path::new("/opt/suite");
        assert_eq!(
            config.cache_dir(root),
            PathBuf::from("/var/lib/bndl/store")
        );
        assert_eq!(config.registration_dir(root), root.join("session"));
    }

    #[tokio::test]
    async fn missing_file_is_reported_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load_from_file(&dir.path().join("absent.toml"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn zero_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bndl.toml");
        tokio::fs::write(&path, "[network]\ntimeout = 0\n").await.unwrap();
        let err = EngineConfig::load_from_file(&path).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn load_without_a_path_uses_defaults() {
        let config = EngineConfig::load(None).await.unwrap();
        assert_eq!(config.retry.wait_ms, 250);
    }
}
