//! Query fan-out, candidate collection and operator choice
//!
//! Each context has at most one round slot. A new query overwrites the slot,
//! which abandons the previous round: responses still in flight for it are
//! dropped when they find a different round id in the slot.
//!
//! A choice is only ever committed to the servers that appended the round's
//! query. Under [`CommitMode::Majority`] the ingress acts as a fixed leader:
//! it first collects acknowledgements from those servers and decides only
//! once a majority of the context's holders answered, merging its own
//! history into every replica that applies the decision.

use crate::cluster::Transport;
use crate::config::CommitMode;
use crate::context::responder::{Prompt, Responder};
use crate::context::store::ContextStore;
use crate::error::CommandError;
use crate::metrics::MeshMetrics;
use ctxmesh_common::{ContextId, RoundId, ServerId};
use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundState {
    Collecting,
    Open,
}

#[derive(Debug)]
struct RoundSlot {
    id: RoundId,
    state: RoundState,
    responses: BTreeMap<ServerId, String>,
    /// Servers whose replica received the query, answered or not
    queried: BTreeSet<ServerId>,
}

/// Responses returned to the console for a freshly opened round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    pub round: RoundId,
    pub responses: BTreeMap<ServerId, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub round: RoundId,
    pub server: ServerId,
    pub response: String,
    /// Holders that applied the commit
    pub committed: Vec<ServerId>,
}

/// Acknowledgements needed from `holders` replicas before a majority decision
pub const fn quorum(holders: usize) -> usize {
    holders / 2 + 1
}

#[derive(Debug, Clone, Copy)]
pub struct ArbiterTimeouts {
    pub fanout: Duration,
    pub commit: Duration,
}

pub struct QueryArbiter {
    transport: Transport,
    store: Arc<ContextStore>,
    responder: Arc<dyn Responder>,
    metrics: Arc<MeshMetrics>,
    rounds: DashMap<ContextId, RoundSlot>,
    next_round: AtomicU64,
    timeouts: ArbiterTimeouts,
    commit: CommitMode,
}

impl QueryArbiter {
    pub fn new(
        transport: Transport,
        store: Arc<ContextStore>,
        responder: Arc<dyn Responder>,
        metrics: Arc<MeshMetrics>,
        timeouts: ArbiterTimeouts,
        commit: CommitMode,
    ) -> Self {
        Self {
            transport,
            store,
            responder,
            metrics,
            rounds: DashMap::new(),
            next_round: AtomicU64::new(0),
            timeouts,
            commit,
        }
    }

    /// Fan `text` out to every reachable, alive holder of `context`
    pub async fn submit_query(
        &self,
        context: ContextId,
        text: &str,
    ) -> Result<RoundOutcome, CommandError> {
        let cluster = self.transport.cluster();
        let ingress = cluster.ingress();

        let holders = self.store.holders(context)?;
        let reachable = cluster.reachable_from_ingress();
        let candidates: Vec<ServerId> = holders.intersection(&reachable).copied().collect();
        if candidates.is_empty() {
            return Err(CommandError::NoReachableServer(context));
        }

        let round = RoundId(self.next_round.fetch_add(1, Ordering::Relaxed) + 1);
        let previous = self.rounds.insert(
            context,
            RoundSlot {
                id: round,
                state: RoundState::Collecting,
                responses: BTreeMap::new(),
                queried: BTreeSet::new(),
            },
        );
        if let Some(previous) = previous {
            debug!(
                "Round {} on context {} superseded by round {}",
                previous.id, context, round
            );
            if previous.state == RoundState::Open {
                self.metrics.round_closed();
            }
        }

        info!(
            "Round {} on context {}: fanning out to {:?}",
            round, context, candidates
        );

        let queried = DashSet::new();
        let queried_ref = &queried;
        let calls = candidates.iter().map(|&server| async move {
            let result = self
                .transport
                .call(
                    ingress,
                    server,
                    self.timeouts.fanout,
                    self.serve(context, server, ingress, text, queried_ref),
                )
                .await;
            (server, result)
        });

        let mut responses = BTreeMap::new();
        for (server, result) in join_all(calls).await {
            match result {
                Ok(response) => {
                    responses.insert(server, response);
                }
                Err(e) => self.metrics.undelivered(e.reason()),
            }
        }

        let queried = queried.into_iter().collect();
        self.publish(context, round, responses, queried)
    }

    /// Runs on `server` once the query has arrived there
    async fn serve(
        &self,
        context: ContextId,
        server: ServerId,
        origin: ServerId,
        text: &str,
        queried: &DashSet<ServerId>,
    ) -> anyhow::Result<String> {
        self.store.append_query(context, server, origin, text)?;
        queried.insert(server);
        let history = self.store.replica(context, server).unwrap_or_default();
        self.responder
            .respond(Prompt {
                server,
                context,
                history,
                query: text.to_string(),
            })
            .await
    }

    fn publish(
        &self,
        context: ContextId,
        round: RoundId,
        mut responses: BTreeMap<ServerId, String>,
        queried: BTreeSet<ServerId>,
    ) -> Result<RoundOutcome, CommandError> {
        let nodes = self.transport.cluster().nodes();
        // Servers that failed during collection are not choosable
        responses.retain(|&server, _| nodes.is_alive(server));

        let mut slot = match self.rounds.get_mut(&context) {
            Some(slot) if slot.id == round => slot,
            _ => {
                debug!("Round {} on context {} was superseded", round, context);
                return Err(CommandError::UnknownRound(context));
            }
        };

        if responses.is_empty() {
            drop(slot);
            self.rounds.remove_if(&context, |_, s| s.id == round);
            info!("Round {} on context {}: no server responded", round, context);
            return Err(CommandError::NoReachableServer(context));
        }

        slot.state = RoundState::Open;
        slot.responses = responses.clone();
        slot.queried = queried;
        drop(slot);

        self.metrics.round_opened(responses.len());
        info!(
            "Round {} on context {} open with {} responses",
            round,
            context,
            responses.len()
        );

        Ok(RoundOutcome { round, responses })
    }

    /// Commit `server`'s response from the open round to the replicas that
    /// saw its query
    pub async fn choose_response(
        &self,
        context: ContextId,
        server: ServerId,
    ) -> Result<CommitOutcome, CommandError> {
        let (round, response, queried) = {
            let slot = self
                .rounds
                .get(&context)
                .filter(|slot| slot.state == RoundState::Open)
                .ok_or(CommandError::UnknownRound(context))?;

            let response = slot
                .responses
                .get(&server)
                .filter(|_| self.transport.cluster().nodes().is_alive(server))
                .cloned()
                .ok_or(CommandError::InvalidChoice { context, server })?;
            (slot.id, response, slot.queried.clone())
        };

        let holders = self.store.holders(context)?;
        let targets: Vec<ServerId> = queried.intersection(&holders).copied().collect();

        // Without a quorum the round stays open for a later attempt
        let targets = match self.commit {
            CommitMode::Broadcast => targets,
            CommitMode::Majority => {
                self.accept(context, round, &targets, quorum(holders.len()))
                    .await?
            }
        };

        // Another session may have chosen or superseded the round meanwhile
        self.rounds
            .remove_if(&context, |_, s| s.id == round && s.state == RoundState::Open)
            .ok_or(CommandError::UnknownRound(context))?;
        self.metrics.round_closed();

        let committed = match self.commit {
            CommitMode::Broadcast => {
                self.broadcast_commit(context, server, &response, targets)
                    .await
            }
            CommitMode::Majority => self.decide(context, server, &response, targets).await,
        };
        info!(
            "Round {} on context {}: chose server {}, committed to {:?}",
            round, context, server, committed
        );

        Ok(CommitOutcome {
            round,
            server,
            response,
            committed,
        })
    }

    async fn broadcast_commit(
        &self,
        context: ContextId,
        chosen: ServerId,
        response: &str,
        targets: Vec<ServerId>,
    ) -> Vec<ServerId> {
        let ingress = self.transport.cluster().ingress();

        let calls = targets.into_iter().map(|holder| async move {
            let result = self
                .transport
                .call(ingress, holder, self.timeouts.commit, async {
                    self.store
                        .append_response(context, holder, response, chosen)
                })
                .await;
            (holder, result)
        });

        let mut committed = Vec::new();
        for (holder, result) in join_all(calls).await {
            match result {
                Ok(_) => committed.push(holder),
                Err(e) => self.metrics.undelivered(e.reason()),
            }
        }
        committed
    }

    /// Ask every target to acknowledge round `round`. Returns the servers that
    /// did, or `NoQuorum` when fewer than `needed` answered.
    async fn accept(
        &self,
        context: ContextId,
        round: RoundId,
        targets: &[ServerId],
        needed: usize,
    ) -> Result<Vec<ServerId>, CommandError> {
        let ingress = self.transport.cluster().ingress();

        let calls = targets.iter().map(|&target| async move {
            let result = self
                .transport
                .call(ingress, target, self.timeouts.commit, async {
                    if self.store.holds(context, target) {
                        Ok(())
                    } else {
                        Err(CommandError::UnknownContext(context))
                    }
                })
                .await;
            (target, result)
        });

        let mut acked = Vec::new();
        for (target, result) in join_all(calls).await {
            match result {
                Ok(()) => acked.push(target),
                Err(e) => self.metrics.undelivered(e.reason()),
            }
        }

        debug!(
            "Accept for round {} on context {}: {:?} acknowledged, {} needed",
            round, context, acked, needed
        );
        if acked.len() < needed {
            info!(
                "Round {} on context {}: no quorum ({} of {})",
                round,
                context,
                acked.len(),
                needed
            );
            return Err(CommandError::NoQuorum {
                context,
                acked: acked.len(),
                needed,
            });
        }
        Ok(acked)
    }

    /// Apply the decision on the ingress, then on every acknowledged follower.
    /// Followers also adopt the ingress history when it is longer than theirs.
    async fn decide(
        &self,
        context: ContextId,
        chosen: ServerId,
        response: &str,
        acked: Vec<ServerId>,
    ) -> Vec<ServerId> {
        let ingress = self.transport.cluster().ingress();

        let mut committed = Vec::new();
        if acked.contains(&ingress)
            && self
                .store
                .append_response(context, ingress, response, chosen)
                .is_ok()
        {
            committed.push(ingress);
        }
        let history = self.store.replica(context, ingress);
        let history = &history;

        let followers = acked.into_iter().filter(|&s| s != ingress);
        let calls = followers.map(|follower| async move {
            let result = self
                .transport
                .call(ingress, follower, self.timeouts.commit, async {
                    self.store
                        .append_response(context, follower, response, chosen)?;
                    if let Some(history) = history {
                        self.store.adopt(context, follower, history);
                    }
                    Ok::<_, CommandError>(())
                })
                .await;
            (follower, result)
        });

        for (follower, result) in join_all(calls).await {
            match result {
                Ok(()) => committed.push(follower),
                Err(e) => self.metrics.undelivered(e.reason()),
            }
        }
        committed.sort();
        committed
    }

    /// Push the ingress replica to every other reachable server whose replica
    /// is missing or shorter
    pub async fn resync(&self, context: ContextId) -> Result<Vec<ServerId>, CommandError> {
        let cluster = self.transport.cluster();
        let ingress = cluster.ingress();

        let source = self
            .store
            .replica(context, ingress)
            .ok_or(CommandError::UnknownContext(context))?;
        if !cluster.nodes().is_alive(ingress) {
            return Err(CommandError::NoReachableServer(context));
        }

        let targets = cluster
            .reachable_from_ingress()
            .into_iter()
            .filter(|&s| s != ingress);
        let source = &source;
        let calls = targets.map(|target| async move {
            let result = self
                .transport
                .call(ingress, target, self.timeouts.commit, async {
                    Ok::<_, Infallible>(self.store.adopt(context, target, source))
                })
                .await;
            (target, result)
        });

        let mut updated = Vec::new();
        for (target, result) in join_all(calls).await {
            match result {
                Ok(true) => updated.push(target),
                Ok(false) => {}
                Err(e) => self.metrics.undelivered(e.reason()),
            }
        }

        info!("Resync of context {} updated {:?}", context, updated);
        Ok(updated)
    }

    /// Drop `server`'s responses from every round. Returns how many were dropped.
    pub fn discard_server(&self, server: ServerId) -> usize {
        let mut dropped = 0;
        for mut slot in self.rounds.iter_mut() {
            if slot.responses.remove(&server).is_some() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!("Discarded {} pending responses from server {}", dropped, server);
        }
        dropped
    }

    /// Responses of the open round on `context`, if any
    pub fn open_round(&self, context: ContextId) -> Option<RoundOutcome> {
        self.rounds
            .get(&context)
            .filter(|slot| slot.state == RoundState::Open)
            .map(|slot| RoundOutcome {
                round: slot.id,
                responses: slot.responses.clone(),
            })
    }
}
