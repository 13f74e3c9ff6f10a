//! Cache Configuration
//!
//! Per-cache settings, loadable from YAML:
//!
//! ```yaml
//! cache_mode: repl_sync
//! use_lazy_deserialization: true
//! force_return_values: false
//! sync_repl_timeout_ms: 15000
//! cluster_loader:
//!   remote_call_timeout_ms: 5000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How writes propagate to other members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// No replication
    #[default]
    Local,
    /// Replicate and wait for every member
    ReplSync,
    /// Replicate without waiting
    ReplAsync,
}

impl CacheMode {
    pub fn is_clustered(&self) -> bool {
        !matches!(self, CacheMode::Local)
    }

    pub fn is_synchronous(&self) -> bool {
        matches!(self, CacheMode::ReplSync)
    }
}

impl std::fmt::Display for CacheMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheMode::Local => write!(f, "local"),
            CacheMode::ReplSync => write!(f, "repl_sync"),
            CacheMode::ReplAsync => write!(f, "repl_async"),
        }
    }
}

/// Cluster cache loader settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterLoaderConfig {
    /// How long a clustered get waits for a valid response
    pub remote_call_timeout_ms: u64,
}

impl ClusterLoaderConfig {
    pub fn remote_call_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_call_timeout_ms)
    }
}

impl Default for ClusterLoaderConfig {
    fn default() -> Self {
        Self {
            remote_call_timeout_ms: 5_000,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Replication mode
    pub cache_mode: CacheMode,
    /// Store keys and values as marshalled values
    pub use_lazy_deserialization: bool,
    /// Load missing keys before writes so the previous value can be returned
    pub force_return_values: bool,
    /// Deadline for synchronous replication
    pub sync_repl_timeout_ms: u64,
    /// Fetch local misses from other members
    pub cluster_loader: Option<ClusterLoaderConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_mode: CacheMode::Local,
            use_lazy_deserialization: false,
            force_return_values: false,
            sync_repl_timeout_ms: 15_000,
            cluster_loader: None,
        }
    }
}

impl CacheConfig {
    /// A replicated configuration with defaults for everything else
    pub fn replicated(mode: CacheMode) -> Self {
        Self {
            cache_mode: mode,
            ..Self::default()
        }
    }

    pub fn with_lazy_deserialization(mut self, enabled: bool) -> Self {
        self.use_lazy_deserialization = enabled;
        self
    }

    pub fn with_force_return_values(mut self, enabled: bool) -> Self {
        self.force_return_values = enabled;
        self
    }

    pub fn with_cluster_loader(mut self, remote_call_timeout_ms: u64) -> Self {
        self.cluster_loader = Some(ClusterLoaderConfig { remote_call_timeout_ms });
        self
    }

    pub fn sync_repl_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_repl_timeout_ms)
    }

    /// Reject combinations that cannot work
    pub fn validate(&self) -> Result<()> {
        if let Some(loader) = &self.cluster_loader {
            if !self.cache_mode.is_clustered() {
                return Err(Error::Config(
                    "cluster_loader requires a replicated cache_mode".into(),
                ));
            }
            if loader.remote_call_timeout_ms == 0 {
                return Err(Error::Config(
                    "cluster_loader.remote_call_timeout_ms must be positive".into(),
                ));
            }
        }
        if self.cache_mode.is_synchronous() && self.sync_repl_timeout_ms == 0 {
            return Err(Error::Config("sync_repl_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: CacheConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }
}
