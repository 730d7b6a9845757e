// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Agent configuration.
//!
//! Values are merged in priority order:
//! 1. Defaults
//! 2. YAML file (`config/config.yaml` unless `LOGAGENT_CONFIG` points elsewhere)
//! 3. Environment variables prefixed with `LOGAGENT_`, `__` separating nested
//!    keys (e.g. `LOGAGENT_KAFKA__TOPIC=web_log`)
//!
//! ```yaml
//! kafka:
//!   address: 127.0.0.1:9092
//!   topic: web_log
//!   chan_size: 100
//! logs:
//!   collect_path: ./logs/app.log
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pipeline::PipelineConfig;
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::tail::TailConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";
pub const CONFIG_PATH_ENV: &str = "LOGAGENT_CONFIG";
const ENV_PREFIX: &str = "LOGAGENT_";
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Broker address, or a comma separated list of them.
    pub address: String,
    pub topic: String,
    /// Queue capacity between the read loop and the sender. Zero means default.
    pub chan_size: usize,
    pub message_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9092".to_string(),
            topic: String::new(),
            chan_size: DEFAULT_QUEUE_CAPACITY,
            message_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// File to tail.
    pub collect_path: PathBuf,
    pub poll_interval_ms: u64,
    pub reopen_backoff_ms: u64,
    pub must_exist: bool,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            collect_path: PathBuf::new(),
            poll_interval_ms: 250,
            reopen_backoff_ms: 1000,
            must_exist: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub kafka: KafkaConfig,
    pub logs: CollectConfig,
    pub log_level: String,
    /// Directory of the daily agent log file. Empty disables file logging.
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kafka: KafkaConfig::default(),
            logs: CollectConfig::default(),
            log_level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Loads the file named by `LOGAGENT_CONFIG`, or the default path.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::from_file(&path)
    }

    /// Loads defaults, then `path` if it exists, then the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        config.log_level = config.log_level.to_lowercase();
        if config.kafka.chan_size == 0 {
            config.kafka.chan_size = DEFAULT_QUEUE_CAPACITY;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kafka.address.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "kafka.address cannot be empty".to_string(),
            ));
        }

        if self.kafka.topic.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "kafka.topic cannot be empty".to_string(),
            ));
        }

        if self.logs.collect_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "logs.collect_path cannot be empty".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            topic: self.kafka.topic.clone(),
            queue_capacity: self.kafka.chan_size,
            reopen_backoff: Duration::from_millis(self.logs.reopen_backoff_ms),
        }
    }

    pub fn tail_config(&self) -> TailConfig {
        TailConfig {
            must_exist: self.logs.must_exist,
            poll_interval: Duration::from_millis(self.logs.poll_interval_ms),
            ..TailConfig::default()
        }
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.kafka.message_timeout_ms)
    }
}
