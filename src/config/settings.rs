//! Server-level settings
//!
//! Settings that describe the process rather than a pipeline: the listening
//! port, logging, and the externally supplied worker list used by distributed
//! stages.
//!
//! # Main Types
//!
//! - [`ServerConfig`] - Root of `server.toml`
//! - [`LoggingConfig`] - Log filter and optional rolling log directory
//! - [`DistributionConfig`] - Worker addresses and connection timeout
//! - [`WorkerAddress`] - `host:port` of one remote worker

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port a server listens on
pub const DEFAULT_PORT: u16 = 9002;

/// Default timeout for opening a worker session in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Default log filter when neither `RUST_LOG` nor the config sets one
pub const DEFAULT_LOG_FILTER: &str = "info,reconstream=debug";

/// Root configuration for a reconstream server process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port accepting client and distributor sessions
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub distribution: DistributionConfig,

    /// Stream validated at startup by `reconstream check`
    #[serde(default)]
    pub stream: Option<StreamConfig>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            logging: LoggingConfig::default(),
            distribution: DistributionConfig::default(),
            stream: None,
        }
    }
}

impl ServerConfig {
    /// Load a server config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StreamError::Configuration(format!("Failed to read server config {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content).map_err(|e| e.with_context(format!("{:?}", path)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            StreamError::Configuration(format!("Failed to parse server config: {}", e))
        })
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Log file name prefix inside `directory`
    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_log_prefix() -> String {
    "reconstream.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            directory: None,
            file_prefix: default_log_prefix(),
        }
    }
}

/// Address of a remote worker process
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerAddress {
    pub host: String,
    pub port: u16,
}

impl WorkerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for WorkerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Worker list and connection policy for distributed stages.
///
/// The worker list stands in for service discovery: it is supplied by the
/// operator and injected into the loader, never read from global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    #[serde(default)]
    pub workers: Vec<WorkerAddress>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            workers: Vec::new(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl DistributionConfig {
    pub fn new(workers: Vec<WorkerAddress>) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
