use ctxmesh_common::{Envelope, ServerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentRequest {
    /// One console command line
    Command { line: String },
    Status,
    /// Prometheus text exposition
    Metrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentResponse {
    Envelope { envelope: Envelope },
    Status(AgentStatus),
    Metrics { text: String },
    /// The request frame could not be understood
    Error { message: String },
}

impl AgentResponse {
    pub const fn kind(&self) -> &'static str {
        match self {
            AgentResponse::Envelope { .. } => "envelope",
            AgentResponse::Status(_) => "status",
            AgentResponse::Metrics { .. } => "metrics",
            AgentResponse::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub version: String,
    pub servers: usize,
    pub ingress: ServerId,
    pub routing: String,
    pub commit: String,
    pub alive: Vec<ServerId>,
    /// Links currently down, lower id first
    pub failed_links: Vec<(ServerId, ServerId)>,
    pub contexts: usize,
    pub sessions: usize,
    pub uptime_seconds: u64,
    pub commands_handled: u64,
}
