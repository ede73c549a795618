//! Simulated delivery between servers
//!
//! Each leg of a call waits the configured latency once per link on the
//! current shortest path, then rechecks reachability. The whole round trip is
//! bounded by a deadline and the operation itself only runs on arrival.

use super::Cluster;
use ctxmesh_common::ServerId;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Undelivered {
    #[error("server {to} is unreachable from server {from}")]
    Unreachable { from: ServerId, to: ServerId },

    #[error("no answer from server {0} before the deadline")]
    TimedOut(ServerId),

    #[error("server {server} rejected the message: {reason}")]
    Rejected { server: ServerId, reason: String },
}

impl Undelivered {
    /// Short label used for metrics
    pub const fn reason(&self) -> &'static str {
        match self {
            Undelivered::Unreachable { .. } => "unreachable",
            Undelivered::TimedOut(_) => "timeout",
            Undelivered::Rejected { .. } => "rejected",
        }
    }
}

#[derive(Clone)]
pub struct Transport {
    cluster: Arc<Cluster>,
    latency: Duration,
}

impl Transport {
    pub fn new(cluster: Arc<Cluster>, latency: Duration) -> Self {
        Self { cluster, latency }
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Deliver `op` from `from` to `to` and carry its result back
    pub async fn call<T, E, F>(
        &self,
        from: ServerId,
        to: ServerId,
        deadline: Duration,
        op: F,
    ) -> Result<T, Undelivered>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if !self.cluster.can_reach(from, to) {
            return Err(Undelivered::Unreachable { from, to });
        }

        let round_trip = async {
            self.hop(from, to).await?;
            let value = op.await.map_err(|e| Undelivered::Rejected {
                server: to,
                reason: e.to_string(),
            })?;
            self.hop(to, from).await?;
            Ok(value)
        };

        let result = match tokio::time::timeout(deadline, round_trip).await {
            Ok(result) => result,
            Err(_) => Err(Undelivered::TimedOut(to)),
        };

        if let Err(e) = &result {
            debug!("Delivery {} -> {} failed: {}", from, to, e);
        }
        result
    }

    async fn hop(&self, from: ServerId, to: ServerId) -> Result<(), Undelivered> {
        let hops = self
            .cluster
            .hops(from, to)
            .ok_or(Undelivered::Unreachable { from, to })?;
        if hops > 0 && !self.latency.is_zero() {
            tokio::time::sleep(self.latency * hops).await;
        }
        // Links and nodes may have failed while the message was in flight
        if self.cluster.can_reach(from, to) {
            Ok(())
        } else {
            Err(Undelivered::Unreachable { from, to })
        }
    }
}
