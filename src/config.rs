//! Application configuration.
//!
//! [`StockroomConfig::load`] reads `config/config.toml` (optional) and then
//! `STOCKROOM__*` environment variables, e.g. `STOCKROOM__DATABASE__URL` or
//! `STOCKROOM__SERVER__BACKEND=memory`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use crate::pool::config::DatabaseConfig;

const CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "STOCKROOM";

/// Which store implementation backs the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Postgres,
    /// Process-local state, lost on exit. Demo and test use only.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            backend: Backend::default(),
            max_body_bytes: default_max_body_bytes(),
            run_migrations: default_run_migrations(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_run_migrations() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StockroomConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl StockroomConfig {
    /// Load configuration from `config/config.toml`, falling back to env vars.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when neither the file nor the environment yields
    /// a configuration that deserializes.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!("failed to load {CONFIG_FILE}, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        Self::from_config(&settings)
    }

    /// Deserialize from an already-built [`Config`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a section has the wrong shape.
    pub fn from_config(settings: &Config) -> Result<Self, ConfigError> {
        settings.clone().try_deserialize::<StockroomConfig>().map_err(|e| {
            ConfigError::Message(format!(
                "Stockroom configuration could not be loaded from file or environment: {}",
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_defaults_when_sections_missing() {
        let settings = Config::builder().build().unwrap();
        let cfg = StockroomConfig::from_config(&settings).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:8000");
        assert_eq!(cfg.server.backend, Backend::Postgres);
        assert!(cfg.server.run_migrations);
        assert_eq!(cfg.database.max_connections, 10);
        assert_eq!(cfg.database.pool_timeout_seconds, 30);
    }

    #[test]
    fn test_toml_overrides() {
        let toml = r#"
            [database]
            url = "postgres://app:secret@db:5432/stockroom"
            max_connections = 4

            [server]
            bind = "0.0.0.0:9000"
            backend = "memory"
            run_migrations = false
        "#;
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        let cfg = StockroomConfig::from_config(&settings).unwrap();
        assert_eq!(cfg.database.url, "postgres://app:secret@db:5432/stockroom");
        assert_eq!(cfg.database.max_connections, 4);
        assert_eq!(cfg.database.pool_timeout_seconds, 30);
        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
        assert_eq!(cfg.server.backend, Backend::Memory);
        assert!(!cfg.server.run_migrations);
    }
}
