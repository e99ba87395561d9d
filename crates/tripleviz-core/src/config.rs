//! Configuration management for tripleviz.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`TRIPLEVIZ__` prefix, `__` section separator)
//! 2. Config file (`tripleviz.toml`, prefix overridable)
//! 3. Defaults

use serde::Deserialize;

use crate::error::{Result, TriplevizError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriplevizConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Where and how the triple store keeps its data.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file. In-memory when unset.
    #[serde(default)]
    pub path: Option<String>,

    /// How long a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    /// Configuration for a throwaway in-memory store.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Configuration for a file-backed store at `path`.
    pub fn at_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// What the visibility query engine does with text it cannot classify.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UnrecognizedQueryPolicy {
    /// Treat the query as "select all" and log a warning.
    #[default]
    SelectAll,
    /// Surface an `UnsupportedQueryShape` error.
    Reject,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub unrecognized: UnrecognizedQueryPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub json: bool,

    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: default_log_level(),
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl TriplevizConfig {
    /// Load configuration from `{file_prefix}.toml` (optional) and the environment.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = ::config::Config::builder()
            .add_source(::config::File::with_name(file_prefix).required(false))
            .add_source(
                ::config::Environment::with_prefix("TRIPLEVIZ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: TriplevizConfig = cfg.try_deserialize()?;
        loaded.validate()?;

        tracing::debug!(
            file_prefix,
            store_path = ?loaded.store.path,
            unrecognized = ?loaded.query.unrecognized,
            "Configuration loaded"
        );
        Ok(loaded)
    }

    /// Reject values the store cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.store.busy_timeout_ms == 0 {
            return Err(TriplevizError::InvalidConfig {
                key: "store.busy_timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(path) = &self.store.path {
            if path.trim().is_empty() {
                return Err(TriplevizError::InvalidConfig {
                    key: "store.path".to_string(),
                    reason: "must not be blank; omit it for an in-memory store".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TriplevizConfig::default();
        assert_eq!(config.store.path, None);
        assert_eq!(config.store.busy_timeout_ms, 5_000);
        assert_eq!(config.query.unrecognized, UnrecognizedQueryPolicy::SelectAll);
        assert!(!config.log.json);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tripleviz.toml");
        std::fs::write(
            &file,
            r#"
[store]
path = "graphs.db"
busy_timeout_ms = 250

[query]
unrecognized = "reject"

[log]
json = true
"#,
        )
        .unwrap();

        let prefix = dir.path().join("tripleviz");
        let config = TriplevizConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.store.path.as_deref(), Some("graphs.db"));
        assert_eq!(config.store.busy_timeout_ms, 250);
        assert_eq!(config.query.unrecognized, UnrecognizedQueryPolicy::Reject);
        assert!(config.log.json);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("absent");
        let config = TriplevizConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.store.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_zero_busy_timeout_rejected() {
        let mut config = TriplevizConfig::default();
        config.store.busy_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(TriplevizError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_store_config_constructors() {
        assert_eq!(StoreConfig::in_memory().path, None);
        assert_eq!(
            StoreConfig::at_path("/tmp/g.db").path.as_deref(),
            Some("/tmp/g.db")
        );
    }
}
