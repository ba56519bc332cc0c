//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::store::{default_db_path, StoreConfig, DEFAULT_BUSY_TIMEOUT_MS};

/// Default port for the knowledge server.
pub const DEFAULT_PORT: u16 = 8000;

/// Default number of entries returned by `/retrieve`.
pub const DEFAULT_LIMIT: usize = 10;

/// Configuration for the knowledge server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Location of the `SQLite` database file.
    pub db_path: PathBuf,
    /// Result count used when a query gives no `limit`.
    pub default_limit: usize,
    /// Whether to enable permissive CORS.
    pub cors_permissive: bool,
    /// Busy timeout for the database connection.
    pub busy_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            db_path: default_db_path(),
            default_limit: DEFAULT_LIMIT,
            cors_permissive: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Get the configured address as a string.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Store settings derived from this configuration.
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: Some(self.db_path.clone()),
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }
}
