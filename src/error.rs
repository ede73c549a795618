use ctxmesh_common::{ContextId, ErrorKind, ServerId};
use thiserror::Error;

/// Errors returned to the console for a single command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Bad arguments: {0}")]
    BadArguments(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Unknown server {server}: cluster has {servers} servers")]
    UnknownServer { server: u64, servers: usize },

    #[error("Unknown context {0}")]
    UnknownContext(ContextId),

    #[error("Context {context} already exists on server {server}")]
    DuplicateContext { context: ContextId, server: ServerId },

    #[error("No reachable server for context {0}")]
    NoReachableServer(ContextId),

    #[error("No open query round for context {0}")]
    UnknownRound(ContextId),

    #[error("Server {server} has no response in the open round for context {context}")]
    InvalidChoice { context: ContextId, server: ServerId },

    #[error("Only {acked} of {needed} replicas needed for context {context} acknowledged")]
    NoQuorum {
        context: ContextId,
        acked: usize,
        needed: usize,
    },
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::BadArguments(_) => ErrorKind::BadArguments,
            CommandError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            CommandError::UnknownServer { .. } => ErrorKind::UnknownServer,
            CommandError::UnknownContext(_) => ErrorKind::UnknownContext,
            CommandError::DuplicateContext { .. } => ErrorKind::DuplicateContext,
            CommandError::NoReachableServer(_) => ErrorKind::NoReachableServer,
            CommandError::UnknownRound(_) => ErrorKind::UnknownRound,
            CommandError::InvalidChoice { .. } => ErrorKind::InvalidChoice,
            CommandError::NoQuorum { .. } => ErrorKind::NoQuorum,
        }
    }
}

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to parse configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MeshError>;
