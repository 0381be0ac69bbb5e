//! Configuration loading and management
//!
//! The service reads a single YAML file whose path is given by the
//! `CONFIG_PATH` environment variable:
//!
//! ```yaml
//! env: local
//! database:
//!   host: localhost
//!   port: 5432
//!   user: orders
//!   password: secret
//!   name: orders
//! http_server:
//!   address: 0.0.0.0:8080
//!   timeout_secs: 4
//! kafka:
//!   brokers: [localhost:9092]
//!   topic: orders
//!   group_id: orderflow
//! ```
//!
//! Everything except the database credentials and the kafka subscription has
//! a default. The `database` and `kafka` sections are only required by the
//! backends that use them.

use crate::consumer::RetryPolicy;
use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the configuration file path
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Deployment environment, selects the log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Human-readable logs at debug level
    #[default]
    Local,
    /// JSON logs at debug level
    Dev,
    /// JSON logs at info level
    Prod,
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub env: Environment,

    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub http_server: HttpServerConfig,

    #[serde(default)]
    pub kafka: Option<KafkaConfig>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub consumer: ConsumerConfig,
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Grace period for in-flight requests on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

/// Kafka subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Interval of the expired-entry sweep
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

/// Ingestion retry and shutdown settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Delay after a failed write
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Enables exponential backoff capped at this delay
    #[serde(default)]
    pub max_retry_delay_ms: Option<u64>,
    /// Retry forever when unset
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// How long to wait for the consumer to stop
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    4
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

fn default_session_timeout_ms() -> u64 {
    6000
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_cleanup_interval_secs() -> u64 {
    600
}

fn default_retry_delay_ms() -> u64 {
    3000
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            timeout_secs: default_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: None,
            max_attempts: None,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load the file named by `CONFIG_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ConfigError::MissingEnv {
                name: CONFIG_PATH_ENV.to_string(),
            })?;
        Self::from_yaml_file(&path)
    }

    /// Load and validate configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.to_string(),
            },
            _ => ConfigError::Parse {
                file: Some(path.to_string()),
                message: e.to_string(),
            },
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            file: Some(path.to_string()),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(database) = &self.database {
            require("user", &database.user, "database")?;
            require("name", &database.name, "database")?;
            require("host", &database.host, "database")?;
            positive("max_connections", database.max_connections as u64, "database")?;
        }

        if let Some(kafka) = &self.kafka {
            if kafka.brokers.iter().all(|b| b.trim().is_empty()) {
                return Err(ConfigError::MissingField {
                    field: "brokers".to_string(),
                    context: "kafka".to_string(),
                });
            }
            require("topic", &kafka.topic, "kafka")?;
            require("group_id", &kafka.group_id, "kafka")?;
        }

        require("address", &self.http_server.address, "http_server")?;
        positive("timeout_secs", self.http_server.timeout_secs, "http_server")?;
        positive("default_ttl_secs", self.cache.default_ttl_secs, "cache")?;
        positive("cleanup_interval_secs", self.cache.cleanup_interval_secs, "cache")?;

        if let Some(max) = self.consumer.max_retry_delay_ms
            && max < self.consumer.retry_delay_ms
        {
            return Err(ConfigError::InvalidValue {
                field: "consumer.max_retry_delay_ms".to_string(),
                value: max.to_string(),
                message: "must not be lower than retry_delay_ms".to_string(),
            });
        }
        if self.consumer.max_attempts == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "consumer.max_attempts".to_string(),
                value: "0".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

fn require(field: &str, value: &str, context: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: field.to_string(),
            context: context.to_string(),
        });
    }
    Ok(())
}

fn positive(field: &str, value: u64, context: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field: format!("{}.{}", context, field),
            value: "0".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

impl DatabaseConfig {
    /// `postgres://` connection URL
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl HttpServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl ConsumerConfig {
    /// Retry policy for failed writes
    pub fn retry_policy(&self) -> RetryPolicy {
        let delay = Duration::from_millis(self.retry_delay_ms);
        let policy = match self.max_retry_delay_ms {
            Some(max) => RetryPolicy::exponential(delay, Duration::from_millis(max)),
            None => RetryPolicy::fixed(delay),
        };
        match self.max_attempts {
            Some(attempts) => policy.with_max_attempts(attempts),
            None => policy,
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
