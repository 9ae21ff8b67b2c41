//! Node configuration.
//!
//! Every section is optional in the TOML file; missing fields fall back to defaults.
//! `validate` runs after parsing and rejects values the runtime cannot honour.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::membership::{NeighborPolicy, NodeRole};
use crate::partition::validate_partition_count;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevastatorConfig {
    pub cluster: ClusterConfig,
    pub storage: StorageConfig,
    pub timer: TimerConfig,
    pub engine: EngineConfig,
    pub executor: ExecutorConfig,
    pub admin: AdminConfig,
}

impl DevastatorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cluster.validate()?;
        self.storage.validate()?;
        self.timer.validate()?;
        self.engine.validate()?;
        self.executor.validate()?;
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

/// Membership and placement settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub cluster_name: String,
    pub instance_name: String,
    pub host_name: String,
    pub role: NodeRole,
    /// Power of two in `[1, 8192]`.
    pub partition_count: u32,
    /// Backups per partition, excluding the primary.
    pub backup_nums: usize,
    pub neighbor_policy: NeighborPolicy,
    /// Buffered view-change events per subscriber.
    pub view_changed_queue_size: usize,
    /// Raw node attributes (`zone`, `rack`, `host_group`, `weight`, anything else).
    pub attributes: BTreeMap<String, String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_name: "devastator".to_string(),
            instance_name: "node-1".to_string(),
            host_name: "localhost".to_string(),
            role: NodeRole::Worker,
            partition_count: 1024,
            backup_nums: 1,
            neighbor_policy: NeighborPolicy::None,
            view_changed_queue_size: 64,
            attributes: BTreeMap::new(),
        }
    }
}

impl ClusterConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_name.trim().is_empty() {
            return Err(invalid("cluster.cluster_name must not be empty"));
        }
        if self.instance_name.trim().is_empty() {
            return Err(invalid("cluster.instance_name must not be empty"));
        }
        if self.view_changed_queue_size == 0 {
            return Err(invalid("cluster.view_changed_queue_size must be at least 1"));
        }
        validate_partition_count(self.partition_count)?;
        Ok(())
    }
}

/// Embedded key-value store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub persist_data_path: PathBuf,
    /// Named column families opened alongside `default`.
    pub column_families: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            persist_data_path: PathBuf::from("data/devastator"),
            column_families: Vec::new(),
        }
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.persist_data_path.as_os_str().is_empty() {
            return Err(invalid("storage.persist_data_path must not be empty"));
        }
        let mut seen = HashSet::new();
        for name in &self.column_families {
            if name.trim().is_empty() {
                return Err(invalid("storage.column_families contains an empty name"));
            }
            if !seen.insert(name.as_str()) {
                return Err(invalid(format!("storage.column_families lists '{name}' twice")));
            }
        }
        Ok(())
    }
}

/// Hashed wheel timer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    #[serde(with = "humantime_serde")]
    pub tick_duration: Duration,
    /// Bucket count, a power of two.
    pub wheel_size: usize,
    /// Threads running expired tasks.
    pub worker_threads: usize,
    /// Capacity of the submission queue.
    pub max_pending: usize,
    /// Expired tasks waiting for a worker before new ones are rejected.
    pub execution_queue_size: usize,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(1),
            wheel_size: 512,
            worker_threads: 4,
            max_pending: 65_536,
            execution_queue_size: 4096,
        }
    }
}

impl TimerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_duration.is_zero() {
            return Err(invalid("timer.tick_duration must be greater than zero"));
        }
        if !self.wheel_size.is_power_of_two() {
            return Err(invalid(format!(
                "timer.wheel_size must be a power of two, got {}",
                self.wheel_size
            )));
        }
        if self.worker_threads == 0 {
            return Err(invalid("timer.worker_threads must be at least 1"));
        }
        if self.max_pending == 0 || self.execution_queue_size == 0 {
            return Err(invalid("timer queue sizes must be at least 1"));
        }
        Ok(())
    }
}

/// Message pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Idle messages kept for reuse.
    pub message_pool_size: usize,
    /// Idle encode buffers kept for reuse.
    pub buffer_pool_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            message_pool_size: 1024,
            buffer_pool_size: 256,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.message_pool_size == 0 || self.buffer_pool_size == 0 {
            return Err(invalid("engine pool sizes must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedExecutorConfig {
    pub name: String,
    pub threads: usize,
}

/// Named job executors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Executor used for jobs that do not name one.
    pub default_executor: String,
    pub executors: Vec<NamedExecutorConfig>,
    /// Jobs queued per executor before submissions are refused.
    pub message_queue_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_executor: "default".to_string(),
            executors: vec![NamedExecutorConfig {
                name: "default".to_string(),
                threads: 4,
            }],
            message_queue_size: 1024,
        }
    }
}

impl ExecutorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.message_queue_size == 0 {
            return Err(invalid("executor.message_queue_size must be at least 1"));
        }
        let mut seen = HashSet::new();
        for executor in &self.executors {
            if executor.name.trim().is_empty() {
                return Err(invalid("executor names must not be empty"));
            }
            if executor.threads == 0 {
                return Err(invalid(format!(
                    "executor '{}' needs at least 1 thread",
                    executor.name
                )));
            }
            if !seen.insert(executor.name.as_str()) {
                return Err(invalid(format!("executor '{}' is declared twice", executor.name)));
            }
        }
        if !seen.contains(self.default_executor.as_str()) {
            return Err(invalid(format!(
                "default executor '{}' is not declared",
                self.default_executor
            )));
        }
        Ok(())
    }
}

/// Read-only HTTP inspection endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub bind: SocketAddr,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: SocketAddr::from(([127, 0, 0, 1], 7070)),
        }
    }
}
