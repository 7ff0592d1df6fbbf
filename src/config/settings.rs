//! Configuration settings.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub acp: AcpConfig,
    pub cache: CacheConfig,
    pub consent: ConsentConfig,
    pub profile: ProfileConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadFile)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations or use defaults.
    pub fn load() -> Result<Self> {
        let config_paths = [
            PathBuf::from("pod-access.toml"),
            dirs::config_dir()
                .map(|p| p.join("pod-access/config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.is_file() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("acp.policies_container", &self.acp.policies_container),
            ("acp.legacy_policies_container", &self.acp.legacy_policies_container),
        ] {
            if value.is_empty() || !value.ends_with('/') {
                return Err(
                    ConfigError::Invalid(format!("{} must be a container path ending in '/'", field))
                        .into(),
                );
            }
        }

        if self.profile.concurrency == 0 {
            return Err(ConfigError::Invalid("profile.concurrency must be > 0".to_string()).into());
        }
        if self.profile.timeout_ms == 0 {
            return Err(ConfigError::Invalid("profile.timeout_ms must be > 0".to_string()).into());
        }

        Ok(())
    }
}

/// Where ACP policies live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyStorageMode {
    /// Policies are stored in the resource's ACR.
    Inline,
    /// Policies are stored in a shared policies container.
    External,
}

/// ACP strategy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcpConfig {
    pub policy_storage: PolicyStorageMode,
    /// Container, relative to the pod root, holding external policy files.
    pub policies_container: String,
    /// Older container name, read when the current one has no policy file.
    pub legacy_policies_container: String,
}

impl Default for AcpConfig {
    fn default() -> Self {
        Self {
            policy_storage: PolicyStorageMode::Inline,
            policies_container: "pb_policies/".to_string(),
            legacy_policies_container: "policies/".to_string(),
        }
    }
}

/// Permission cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching
    pub enabled: bool,
    /// Maximum number of cached resources
    pub max_entries: u64,
    /// TTL for cached entries in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            ttl_secs: 300,
        }
    }
}

/// Access-grant merge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    /// Merge access grants into permission listings.
    pub enabled: bool,
    /// Drop grants past their `expirationDate` before verification.
    pub check_expiration: bool,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_expiration: true,
        }
    }
}

/// Profile lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Maximum profile fetches in flight at once.
    pub concurrency: usize,
    /// Milliseconds to wait for one profile before labelling by WebID.
    pub timeout_ms: u64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout_ms: 2000,
        }
    }
}
