//! Cluster configuration
//!
//! Loaded from YAML. Every field has a default so an empty document is a
//! valid three-server cluster with the console attached to server 0.

use crate::{MeshError, Result};
use ctxmesh_common::ServerId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How reachability from the ingress is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Routing {
    /// Only servers with an up link to the ingress are reachable
    #[default]
    Direct,
    /// Any server connected to the ingress through alive servers and up links
    MultiHop,
}

impl Routing {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Routing::Direct => "direct",
            Routing::MultiHop => "multi_hop",
        }
    }
}

/// How a chosen response is committed to the replicas that saw the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Deliver to every reachable replica that saw the query, however few
    #[default]
    Broadcast,
    /// The ingress leads an accept phase and only decides once a majority of
    /// the context's holders acknowledged
    Majority,
}

impl CommitMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CommitMode::Broadcast => "broadcast",
            CommitMode::Majority => "majority",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResponderConfig {
    /// Think time of the echo responder
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub servers: usize,
    pub ingress: u32,
    pub routing: Routing,
    pub commit: CommitMode,
    pub fanout_timeout_ms: u64,
    pub commit_timeout_ms: u64,
    pub link_latency_ms: u64,
    pub responder: ResponderConfig,
    pub listen: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            servers: 3,
            ingress: 0,
            routing: Routing::Direct,
            commit: CommitMode::Broadcast,
            fanout_timeout_ms: 5_000,
            commit_timeout_ms: 2_000,
            link_latency_ms: 0,
            responder: ResponderConfig::default(),
            listen: "127.0.0.1:7400".to_string(),
        }
    }
}

impl ClusterConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a map
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            MeshError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Load from `path` if given, otherwise use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.servers == 0 {
            return Err(MeshError::ConfigError(
                "servers must be at least 1".to_string(),
            ));
        }
        if u32::try_from(self.servers).is_err() {
            return Err(MeshError::ConfigError(format!(
                "servers must fit in 32 bits, got {}",
                self.servers
            )));
        }
        if self.ingress as usize >= self.servers {
            return Err(MeshError::ConfigError(format!(
                "ingress {} is outside the cluster of {} servers",
                self.ingress, self.servers
            )));
        }
        if self.fanout_timeout_ms == 0 || self.commit_timeout_ms == 0 {
            return Err(MeshError::ConfigError(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn ingress_id(&self) -> ServerId {
        ServerId(self.ingress)
    }

    pub fn fanout_timeout(&self) -> Duration {
        Duration::from_millis(self.fanout_timeout_ms)
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    pub fn link_latency(&self) -> Duration {
        Duration::from_millis(self.link_latency_ms)
    }

    pub fn responder_delay(&self) -> Duration {
        Duration::from_millis(self.responder.delay_ms)
    }
}
