//! Wire protocol between the ctxmesh agent and its consoles
//!
//! Defines:
//! - `JsonCodec` - 4-byte big-endian length prefix followed by a JSON document
//! - `AgentRequest` / `AgentResponse` - the request and response messages
//! - `AgentClient` - a console-side connection to an agent

pub mod client;
pub mod codec;
pub mod messages;

pub use client::AgentClient;
pub use codec::{JsonCodec, MAX_FRAME_LENGTH};
pub use messages::{AgentRequest, AgentResponse, AgentStatus};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Unexpected response: expected {expected}, got {got}")]
    UnexpectedResponse {
        expected: &'static str,
        got: &'static str,
    },

    #[error("Agent error: {0}")]
    Agent(String),
}
