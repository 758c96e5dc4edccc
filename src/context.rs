//! Shared reconstruction context.
//!
//! Every stage is constructed with the same [`Context`]: the acquisition
//! header sent by the client plus server paths. Distributed stages forward it
//! to each worker in the session's header frame.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Filesystem locations available to stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paths {
    pub home: PathBuf,
    pub working_folder: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            home: PathBuf::from("."),
            working_folder: std::env::temp_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Acquisition header as received from the client; opaque to the core
    pub header: String,
    #[serde(default)]
    pub paths: Paths,
    /// Free-form session parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl Context {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
