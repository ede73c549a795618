//! Accept loop and state shared by every session

use crate::session::run_session;
use ctxmesh::metrics::encode_text;
use ctxmesh::CommandRouter;
use ctxmesh_proto::{AgentRequest, AgentResponse, AgentStatus};
use dashmap::DashMap;
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub peer: SocketAddr,
    pub connected: Instant,
}

pub struct AgentState {
    router: CommandRouter,
    sessions: DashMap<u64, SessionInfo>,
    next_session: AtomicU64,
    commands_handled: AtomicU64,
    started: Instant,
}

impl AgentState {
    pub fn new(router: CommandRouter) -> Self {
        Self {
            router,
            sessions: DashMap::new(),
            next_session: AtomicU64::new(0),
            commands_handled: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub(crate) fn open_session(&self, peer: SocketAddr) -> u64 {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        self.sessions.insert(
            id,
            SessionInfo {
                peer,
                connected: Instant::now(),
            },
        );
        id
    }

    pub(crate) fn close_session(&self, id: u64) {
        if let Some((_, info)) = self.sessions.remove(&id) {
            debug!(
                "Session {} from {} closed after {:?}",
                id,
                info.peer,
                info.connected.elapsed()
            );
        }
    }

    pub async fn handle(&self, request: AgentRequest) -> AgentResponse {
        match request {
            AgentRequest::Command { line } => {
                self.commands_handled.fetch_add(1, Ordering::Relaxed);
                AgentResponse::Envelope {
                    envelope: self.router.execute(&line).await,
                }
            }
            AgentRequest::Status => AgentResponse::Status(self.status()),
            AgentRequest::Metrics => match encode_text(self.router.metrics()) {
                Ok(text) => AgentResponse::Metrics { text },
                Err(e) => AgentResponse::Error {
                    message: e.to_string(),
                },
            },
        }
    }

    pub fn status(&self) -> AgentStatus {
        let cluster = self.router.cluster();
        AgentStatus {
            version: ctxmesh::VERSION.to_string(),
            servers: cluster.servers(),
            ingress: cluster.ingress(),
            routing: cluster.routing().as_str().to_string(),
            commit: self.router.config().commit.as_str().to_string(),
            alive: cluster.nodes().alive_set().into_iter().collect(),
            failed_links: cluster.topology().failed_links(),
            contexts: self.router.store().context_count(),
            sessions: self.session_count(),
            uptime_seconds: self.started.elapsed().as_secs(),
            commands_handled: self.commands_handled.load(Ordering::Relaxed),
        }
    }
}

/// Accept connections until `shutdown` is cancelled, then wait for every
/// session to finish its current request
pub async fn serve(
    listener: TcpListener,
    state: Arc<AgentState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let tracker = TaskTracker::new();
    info!("Accepting consoles on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
                }

                let id = state.open_session(peer);
                info!("Session {} opened from {}", id, peer);
                tracker.spawn(run_session(stream, id, state.clone(), shutdown.child_token()));
            }
        }
    }

    tracker.close();
    info!("Waiting for {} sessions to finish", state.session_count());
    tracker.wait().await;
    Ok(())
}
