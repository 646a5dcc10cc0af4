//! Configuration types for the lineage system.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineageConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Sync configuration.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Resolver configuration.
    #[serde(default)]
    pub resolver: ResolverConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Enable WAL mode (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            wal_mode: true,
            busy_timeout_ms: 30000,
        }
    }
}

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Coalescing window for in-place document updates, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Project used when a command does not name one.
    #[serde(default)]
    pub default_project: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            default_project: None,
        }
    }
}

/// Resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Hard limit on hops followed by a single resolution.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { max_depth: 256 }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_busy_timeout() -> u32 {
    30000
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_max_depth() -> usize {
    256
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("script-lineage")
        .join("lineage.db")
}

impl LineageConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::LineageError::Config {
                message: format!("Failed to parse config: {}", e),
            }
        })?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> crate::error::Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("script-lineage").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("script-lineage.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LineageConfig::default();
        assert_eq!(config.sync.debounce_ms, 500);
        assert_eq!(config.resolver.max_depth, 256);
        assert!(config.database.wal_mode);
    }

    #[test]
    fn test_partial_toml() {
        let config: LineageConfig = toml::from_str(
            r#"
            [sync]
            default_project = "p1"
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.default_project.as_deref(), Some("p1"));
        assert_eq!(config.sync.debounce_ms, 500);
        assert_eq!(config.database.busy_timeout_ms, 30000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[resolver]\nmax_depth = 8\n").unwrap();

        let config = LineageConfig::load(&path).unwrap();
        assert_eq!(config.resolver.max_depth, 8);

        std::fs::write(&path, "[resolver\n").unwrap();
        let err = LineageConfig::load(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }
}
