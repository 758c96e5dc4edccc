//! Configuration module for reconstream
//!
//! This module holds the immutable, parsed description of a pipeline:
//! - [`StreamConfig`] - ordered list of node configs under a key
//! - [`NodeConfig`] - tagged variant per stage kind
//! - [`WorkerConfig`] - the reduced config a distributed stage sends to workers
//! - [`Properties`] - user-supplied string properties with typed lookups
//!
//! Stream configs are written in TOML:
//!
//! ```toml
//! key = "pipeline"
//!
//! [[nodes]]
//! type = "gadget"
//! classname = "ImageFftGadget"
//!
//! [[nodes]]
//! type = "distributed"
//! name = "distributed_magnitude"
//! distributor = { classname = "RoundRobinDistributor", properties = { channels = 2 } }
//! stream = { key = "remote", nodes = [{ type = "gadget", classname = "MagnitudeGadget" }] }
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default number of messages a pure distributed stage keeps in flight
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

// ==================== Properties ====================

/// User-supplied properties of a gadget or plugin.
///
/// Values may be written as strings, numbers or booleans; lookups parse the
/// textual form into the requested type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, Value>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Raw textual value of `key`
    pub fn raw(&self, key: &str) -> Option<String> {
        self.0.get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Parse `key` as `T`; `Ok(None)` when absent
    pub fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some(raw) = self.raw(key) else {
            return Ok(None);
        };
        raw.parse::<T>().map(Some).map_err(|e| {
            StreamError::Configuration(format!("Invalid value {:?} for property {}: {}", raw, key, e))
        })
    }

    /// Parse `key` as `T`, falling back to `default` when absent
    pub fn get_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.get(key)?.unwrap_or(default))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ==================== Plugin references ====================

/// A gadget node: a single stage implementation resolved by class name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GadgetConfig {
    /// Diagnostic name; defaults to the class name
    #[serde(default)]
    pub name: Option<String>,
    pub classname: String,
    /// Library the class is exported from
    #[serde(default)]
    pub dll: String,
    #[serde(default)]
    pub properties: Properties,
}

impl GadgetConfig {
    pub fn new(classname: impl Into<String>) -> Self {
        Self {
            name: None,
            classname: classname.into(),
            dll: String::new(),
            properties: Properties::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Name used in diagnostics and error paths
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.classname)
    }
}

/// Reference to a distributor, branch or merge implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub classname: String,
    #[serde(default)]
    pub dll: String,
    #[serde(default)]
    pub properties: Properties,
}

impl PluginConfig {
    pub fn new(classname: impl Into<String>) -> Self {
        Self {
            classname: classname.into(),
            dll: String::new(),
            properties: Properties::new(),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }
}

/// Reader plugin; `slot` overrides the frame id it is registered for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    pub classname: String,
    #[serde(default)]
    pub dll: String,
    #[serde(default)]
    pub slot: Option<u16>,
}

/// Writer plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterConfig {
    pub classname: String,
    #[serde(default)]
    pub dll: String,
}

// ==================== Node variants ====================

/// One stage of a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
    Gadget(GadgetConfig),
    Parallel(ParallelConfig),
    External(ExternalConfig),
    Distributed(DistributedConfig),
    ParallelProcess(ParallelProcessConfig),
    PureDistributed(PureDistributedConfig),
}

impl NodeConfig {
    /// Name used in diagnostics and error paths
    pub fn name(&self) -> &str {
        match self {
            NodeConfig::Gadget(c) => c.name(),
            NodeConfig::Parallel(c) => &c.key,
            NodeConfig::External(c) => &c.name,
            NodeConfig::Distributed(c) => &c.name,
            NodeConfig::ParallelProcess(c) => &c.name,
            NodeConfig::PureDistributed(c) => &c.name,
        }
    }
}

/// A linear pipeline of stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub key: String,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

impl StreamConfig {
    pub fn new(key: impl Into<String>, nodes: Vec<NodeConfig>) -> Self {
        Self {
            key: key.into(),
            nodes,
        }
    }

    /// Load a stream config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StreamError::Configuration(format!("Failed to read stream config {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content).map_err(|e| e.with_context(format!("{:?}", path)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            StreamError::Configuration(format!("Failed to parse stream config: {}", e))
        })
    }
}

/// Branch input across named sub-streams and merge their outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelConfig {
    pub key: String,
    pub branch: PluginConfig,
    pub merge: PluginConfig,
    pub streams: Vec<StreamConfig>,
}

/// Connect to an already running external module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalConnect {
    pub address: String,
    pub port: u16,
}

/// Start an external module that connects back.
///
/// The child receives the port to connect to in `RECONSTREAM_PORT` and as the
/// final command line argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalExecute {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// A stage run by a process outside this server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalConfig {
    pub name: String,
    #[serde(default)]
    pub connect: Option<ExternalConnect>,
    #[serde(default)]
    pub execute: Option<ExternalExecute>,
    #[serde(default)]
    pub readers: Vec<ReaderConfig>,
    #[serde(default)]
    pub writers: Vec<WriterConfig>,
    /// Sent to the external module in the session's config frame
    #[serde(default)]
    pub properties: Properties,
}

/// Fan a stage out across remote workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedConfig {
    pub name: String,
    pub distributor: PluginConfig,
    #[serde(default)]
    pub readers: Vec<ReaderConfig>,
    #[serde(default)]
    pub writers: Vec<WriterConfig>,
    /// Stream each worker runs
    pub stream: StreamConfig,
}

/// Sequence of pure gadgets applied message by message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PureStreamConfig {
    #[serde(default)]
    pub gadgets: Vec<GadgetConfig>,
}

impl PureStreamConfig {
    /// Express the pure stream as an ordinary stream, for remote workers
    pub fn to_stream(&self, key: impl Into<String>) -> StreamConfig {
        StreamConfig::new(
            key,
            self.gadgets.iter().cloned().map(NodeConfig::Gadget).collect(),
        )
    }
}

/// Apply a pure stream on a local thread pool, preserving order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelProcessConfig {
    pub name: String,
    #[serde(default = "default_parallel_workers")]
    pub workers: usize,
    pub stream: PureStreamConfig,
}

fn default_parallel_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Apply a pure stream on remote workers, preserving order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PureDistributedConfig {
    pub name: String,
    #[serde(default)]
    pub readers: Vec<ReaderConfig>,
    #[serde(default)]
    pub writers: Vec<WriterConfig>,
    pub stream: PureStreamConfig,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}

// ==================== Worker config ====================

/// What a worker needs to run one session: codecs and the inner stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub readers: Vec<ReaderConfig>,
    #[serde(default)]
    pub writers: Vec<WriterConfig>,
    pub stream: StreamConfig,
}

impl WorkerConfig {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
