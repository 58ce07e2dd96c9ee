//! Controller configuration file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use cumulus_engine::BackoffPolicy;
use serde::{Deserialize, Serialize};

use crate::workflow::{Network, NetworkSpec};

fn default_workers() -> usize {
    4
}

fn default_namespace() -> String {
    "default".to_string()
}

/// Network object created at start-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedNetwork {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    pub cidr: String,
    pub location: String,
}

impl SeedNetwork {
    pub fn to_object(&self) -> Network {
        Network::new(
            self.namespace.clone(),
            self.name.clone(),
            NetworkSpec {
                cidr: self.cidr.clone(),
                location: self.location.clone(),
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Concurrent invocations.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub backoff: BackoffPolicy,
    /// Per-invocation time limit in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub networks: Vec<SeedNetwork>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            backoff: BackoffPolicy::default(),
            timeout_secs: None,
            networks: Vec::new(),
        }
    }
}

impl ControllerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
