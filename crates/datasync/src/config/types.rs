//! Configuration type definitions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sync::SyncJob;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Connection parameters keyed by logical database name.
    pub datasources: BTreeMap<String, DbConnectionParams>,

    /// Sync behavior configuration.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Named sync jobs runnable from the CLI.
    #[serde(default)]
    pub jobs: Vec<SyncJob>,
}

impl Config {
    /// Look up a configured job by name.
    pub fn job(&self, name: &str) -> Option<&SyncJob> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

/// Connection parameters for one logical database.
#[derive(Clone, Serialize, Deserialize)]
pub struct DbConnectionParams {
    /// Driver identifier (postgres, mysql, mssql and their aliases).
    pub driver: String,

    /// Connection URL in the driver's native format.
    pub url: String,

    /// Username. Overrides any user embedded in the URL.
    pub username: String,

    /// Password. Overrides any password embedded in the URL.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// SSL mode (PostgreSQL only): disable, require, verify-ca, verify-full.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_mode: Option<String>,

    /// Pool tuning.
    #[serde(default)]
    pub pool: PoolSettings,
}

impl DbConnectionParams {
    /// Create parameters with default pool settings.
    pub fn new(
        driver: impl Into<String>,
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            driver: driver.into(),
            url: url.into(),
            username: username.into(),
            password: password.into(),
            ssl_mode: None,
            pool: PoolSettings::default(),
        }
    }
}

impl fmt::Debug for DbConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConnectionParams")
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Connection pool tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Maximum pooled connections (default: 10).
    #[serde(default = "default_max_size")]
    pub max_size: u32,

    /// Seconds to wait for a connection before failing (default: 30).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Sync behavior configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Rows per insert batch (default: 500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Default rows per insert batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

// Default value functions for serde
fn default_max_size() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
