//! Configuration loading
//!
//! Sources, lowest precedence first: built-in defaults, `blockflow.toml`
//! (or the file named by `BLOCKFLOW_CONFIG_PATH` / `--config`), then
//! `BLOCKFLOW_*` environment variables. A `.env` file is loaded first if
//! present. Nested keys use a double underscore, e.g.
//! `BLOCKFLOW_ENGINE__MAX_STEPS_PER_PUMP=500`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::RestartPolicy;

const DEFAULT_CONFIG_FILE: &str = "blockflow.toml";
const CONFIG_PATH_ENV: &str = "BLOCKFLOW_CONFIG_PATH";
const ENV_PREFIX: &str = "BLOCKFLOW";

/// Settings every flowchart scheduler is built with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Commands a block may enter per pump before yielding to the next tick
    pub max_steps_per_pump: usize,
    pub restart_policy: RestartPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps_per_pump: 10_000,
            restart_policy: RestartPolicy::Ignore,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Interval of the CLI frame loop
    pub tick_interval_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub host: HostConfig,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: Option<String>,
}

impl Config {
    /// Load from the default sources
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder layering explicit overrides on top of file and environment
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    max_steps_per_pump: Option<usize>,
    restart_policy: Option<RestartPolicy>,
    skip_env: bool,
}

impl ConfigBuilder {
    /// Read this file instead of searching; it must exist
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn max_steps_per_pump(mut self, steps: usize) -> Self {
        self.max_steps_per_pump = Some(steps);
        self
    }

    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = Some(policy);
        self
    }

    /// Ignore `.env` and `BLOCKFLOW_*` variables
    pub fn without_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    pub fn build(self) -> Result<Config> {
        if !self.skip_env {
            dotenvy::dotenv().ok();
        }

        let defaults = Config::default();
        let mut builder = ::config::Config::builder()
            .set_default(
                "engine.max_steps_per_pump",
                defaults.engine.max_steps_per_pump as i64,
            )?
            .set_default("engine.restart_policy", "ignore")?
            .set_default("host.tick_interval_ms", defaults.host.tick_interval_ms as i64)?;

        let explicit = self.config_path.clone().or_else(|| {
            if self.skip_env {
                None
            } else {
                std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from)
            }
        });
        builder = match explicit {
            Some(path) => builder.add_source(::config::File::from(path).required(true)),
            None => builder
                .add_source(::config::File::from(PathBuf::from(DEFAULT_CONFIG_FILE)).required(false)),
        };

        if !self.skip_env {
            builder = builder.add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        if let Some(steps) = self.max_steps_per_pump {
            builder = builder.set_override("engine.max_steps_per_pump", steps as i64)?;
        }
        if let Some(policy) = self.restart_policy {
            let policy = match policy {
                RestartPolicy::Ignore => "ignore",
                RestartPolicy::Restart => "restart",
            };
            builder = builder.set_override("engine.restart_policy", policy)?;
        }

        let config: Config = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if config.engine.max_steps_per_pump == 0 {
            bail!("engine.max_steps_per_pump must be at least 1");
        }
        if config.host.tick_interval_ms == 0 {
            bail!("host.tick_interval_ms must be at least 1");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("blockflow-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = Config::builder().without_env().build().unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.host.tick_interval_ms, 50);
        assert_eq!(config.log_filter, None);
    }

    #[test]
    fn test_file_values() {
        let path = write_temp(
            r#"
log_filter = "blockflow_core=debug"

[engine]
max_steps_per_pump = 64
restart_policy = "restart"
"#,
        );
        let config = Config::builder()
            .without_env()
            .config_path(Some(path.clone()))
            .build()
            .unwrap();
        std::fs::remove_file(path).ok();

        assert_eq!(config.engine.max_steps_per_pump, 64);
        assert_eq!(config.engine.restart_policy, RestartPolicy::Restart);
        assert_eq!(config.log_filter.as_deref(), Some("blockflow_core=debug"));
    }

    #[test]
    fn test_overrides_win() {
        let path = write_temp("[engine]\nmax_steps_per_pump = 64\n");
        let config = Config::builder()
            .without_env()
            .config_path(Some(path.clone()))
            .max_steps_per_pump(7)
            .build()
            .unwrap();
        std::fs::remove_file(path).ok();
        assert_eq!(config.engine.max_steps_per_pump, 7);
    }

    #[test]
    fn test_zero_budget_rejected() {
        let result = Config::builder()
            .without_env()
            .max_steps_per_pump(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = Config::builder()
            .without_env()
            .config_path(Some(PathBuf::from("/nonexistent/blockflow.toml")))
            .build();
        assert!(result.is_err());
    }
}
