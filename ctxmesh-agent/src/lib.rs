//! TCP agent for ctxmesh
//!
//! Responsibilities:
//! - Own one in-process cluster (`CommandRouter`)
//! - Accept console connections and run one session per connection
//! - Answer command, status and metrics requests
//! - Shut down cleanly on cancellation

pub mod server;
pub mod session;

pub use server::{serve, AgentState};
