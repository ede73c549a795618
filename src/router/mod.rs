//! Command routing
//!
//! The router owns the cluster model, the context store and the query
//! arbiter. Every console line goes through [`CommandRouter::execute`] and
//! comes back as an [`Envelope`].

pub mod command;

pub use command::Command;

use crate::cluster::{Cluster, Transport};
use crate::config::{ClusterConfig, CommitMode};
use crate::context::arbiter::quorum;
use crate::context::{ArbiterTimeouts, ContextStore, EchoResponder, QueryArbiter, Responder};
use crate::error::CommandError;
use crate::metrics::MeshMetrics;
use crate::Result;
use ctxmesh_common::{Envelope, Reply};
use std::sync::Arc;
use tracing::{debug, info};

pub struct CommandRouter {
    config: ClusterConfig,
    cluster: Arc<Cluster>,
    store: Arc<ContextStore>,
    arbiter: QueryArbiter,
    metrics: Arc<MeshMetrics>,
}

impl CommandRouter {
    /// Build a router that answers queries with [`EchoResponder`]
    pub fn new(config: ClusterConfig) -> Result<Self> {
        let responder = Arc::new(EchoResponder::new(config.responder_delay()));
        Self::with_responder(config, responder)
    }

    pub fn with_responder(config: ClusterConfig, responder: Arc<dyn Responder>) -> Result<Self> {
        config.validate()?;

        let cluster = Arc::new(Cluster::new(
            config.servers,
            config.ingress_id(),
            config.routing,
        ));
        let store = Arc::new(ContextStore::new(config.servers));
        let metrics = Arc::new(MeshMetrics::new()?);
        let transport = Transport::new(cluster.clone(), config.link_latency());
        let arbiter = QueryArbiter::new(
            transport,
            store.clone(),
            responder.clone(),
            metrics.clone(),
            ArbiterTimeouts {
                fanout: config.fanout_timeout(),
                commit: config.commit_timeout(),
            },
            config.commit,
        );

        info!(
            "Cluster of {} servers ready (ingress {}, {} routing, {} commit, responder {})",
            config.servers,
            config.ingress,
            config.routing.as_str(),
            config.commit.as_str(),
            responder.name()
        );

        Ok(Self {
            config,
            cluster,
            store,
            arbiter,
            metrics,
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    pub fn arbiter(&self) -> &QueryArbiter {
        &self.arbiter
    }

    pub fn metrics(&self) -> &MeshMetrics {
        &self.metrics
    }

    /// Parse and run one console line. Never fails; errors are carried in
    /// the envelope.
    pub async fn execute(&self, line: &str) -> Envelope {
        let (name, result) = match Command::parse(line) {
            Ok(command) => {
                let name = command.name();
                (name, self.dispatch(command).await)
            }
            Err(e) => ("invalid", Err(e)),
        };

        match result {
            Ok(reply) => {
                self.metrics.record_command(name, "ok");
                Envelope::success(reply)
            }
            Err(e) => {
                let kind = e.kind();
                self.metrics.record_command(name, kind.as_str());
                debug!("Command {:?} failed: {}", line.trim(), e);
                Envelope::failure(kind, e.to_string())
            }
        }
    }

    pub async fn dispatch(&self, command: Command) -> std::result::Result<Reply, CommandError> {
        match command {
            Command::Create { context } => {
                let targets = self.cluster.reachable_from_ingress();
                if self.config.commit == CommitMode::Majority {
                    let needed = quorum(self.cluster.servers());
                    if targets.len() < needed {
                        return Err(CommandError::NoQuorum {
                            context,
                            acked: targets.len(),
                            needed,
                        });
                    }
                }
                let servers = self.store.create(context, &targets)?;
                info!("Created context {} on {:?}", context, servers);
                Ok(Reply::Created {
                    context,
                    servers: servers.into_iter().collect(),
                })
            }
            Command::Query { context, text } => {
                let outcome = self.arbiter.submit_query(context, &text).await?;
                Ok(Reply::RoundOpened {
                    context,
                    round: outcome.round,
                    responses: outcome.responses,
                })
            }
            Command::Choose { context, server } => {
                let server = self.cluster.server(server)?;
                let outcome = self.arbiter.choose_response(context, server).await?;
                Ok(Reply::Chosen {
                    context,
                    round: outcome.round,
                    server: outcome.server,
                    response: outcome.response,
                    committed: outcome.committed,
                })
            }
            Command::View { context } => Ok(Reply::Context {
                context,
                replicas: self.store.view(context)?,
            }),
            Command::ViewAll => Ok(Reply::AllContexts {
                contexts: self.store.view_all(),
            }),
            Command::FailLink { src, dest } => self.set_link(src, dest, false),
            Command::FixLink { src, dest } => self.set_link(src, dest, true),
            Command::FailNode { node } => {
                let node = self.cluster.server(node)?;
                let was_alive = self.cluster.nodes().set_alive(node, false)?;
                let discarded = self.arbiter.discard_server(node);
                if was_alive {
                    info!(
                        "Server {} failed; dropped its response from {} open rounds",
                        node, discarded
                    );
                }
                Ok(Reply::Node { node, alive: false })
            }
            Command::Resync { context } => {
                let updated = self.arbiter.resync(context).await?;
                Ok(Reply::Resynced { context, updated })
            }
        }
    }

    fn set_link(&self, src: u64, dest: u64, up: bool) -> std::result::Result<Reply, CommandError> {
        let src = self.cluster.server(src)?;
        let dest = self.cluster.server(dest)?;
        let was_up = self.cluster.topology().set_link(src, dest, up)?;
        if was_up != up {
            info!(
                "Link {} <-> {} is now {}",
                src,
                dest,
                if up { "up" } else { "down" }
            );
        }
        Ok(Reply::Link { src, dest, up })
    }
}
