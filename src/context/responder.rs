use async_trait::async_trait;
use ctxmesh_common::{ContextId, Entry, ServerId};
use std::time::Duration;

/// What a server sees when asked to answer a query
#[derive(Debug, Clone)]
pub struct Prompt {
    pub server: ServerId,
    pub context: ContextId,
    /// The server's replica, ending with the query entry being answered
    pub history: Vec<Entry>,
    pub query: String,
}

/// Produces a server's candidate response. The payload is opaque to the core.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, prompt: Prompt) -> anyhow::Result<String>;

    fn name(&self) -> &str;
}

/// Deterministic responder that restates the query with the serving server
pub struct EchoResponder {
    delay: Duration,
}

impl EchoResponder {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for EchoResponder {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl Responder for EchoResponder {
    async fn respond(&self, prompt: Prompt) -> anyhow::Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let turn = prompt.history.iter().filter(|e| e.is_query()).count();
        Ok(format!(
            "server {} (turn {}): {}",
            prompt.server, turn, prompt.query
        ))
    }

    fn name(&self) -> &str {
        "echo"
    }
}
