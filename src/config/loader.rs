//! Configuration file loader with environment overrides.

use std::path::{Path, PathBuf};

use super::types::ServerConfig;

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .agent-knowledge.toml
        search_paths.push(PathBuf::from(".agent-knowledge.toml"));

        // 2. User config directory: ~/.config/agent-knowledge/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("agent-knowledge").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a config loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load configuration from the first available file, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(&self) -> Result<ServerConfig, ConfigError> {
        for path in &self.search_paths {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading config file");
                return Self::load_from_path(path);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(ServerConfig::default())
    }

    /// Load configuration, then apply `HOST`, `PORT`, `DB_PATH` and
    /// `DEFAULT_LIMIT` from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be parsed or an environment
    /// variable holds an invalid value.
    pub fn load_with_env(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = self.load()?;
        apply_env(&mut config, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &Path) -> Result<ServerConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut config: ServerConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.db_path = expand_home(&config.db_path);
        Ok(config)
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the first config file that exists.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.exists()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply environment overrides using `lookup` to read variables.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnv`] if `PORT` or `DEFAULT_LIMIT` is not a
/// valid number.
pub fn apply_env(
    config: &mut ServerConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(host) = lookup("HOST") {
        config.host = host;
    }
    if let Some(port) = lookup("PORT") {
        config.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
            var: "PORT",
            value: port,
        })?;
    }
    if let Some(path) = lookup("DB_PATH") {
        config.db_path = expand_home(Path::new(&path));
    }
    if let Some(limit) = lookup("DEFAULT_LIMIT") {
        config.default_limit = match limit.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(ConfigError::InvalidEnv {
                    var: "DEFAULT_LIMIT",
                    value: limit,
                })
            }
        };
    }
    Ok(())
}

/// Expand a leading `~/` to the home directory.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}
