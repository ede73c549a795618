//! Per-server context replicas
//!
//! Replicas live in an arena keyed by `(context, server)`, so appends to
//! different replicas only contend on a map shard. A separate directory
//! records which servers hold each context.

use crate::error::CommandError;
use ctxmesh_common::{ContextId, Entry, EntryKind, ReplicaView, ServerId};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
struct ReplicaKey {
    context: ContextId,
    server: ServerId,
}

impl ReplicaKey {
    fn new(context: ContextId, server: ServerId) -> Self {
        Self { context, server }
    }
}

pub struct ContextStore {
    directory: DashMap<ContextId, BTreeSet<ServerId>>,
    replicas: DashMap<ReplicaKey, Vec<Entry>>,
    clocks: Vec<AtomicU64>,
}

impl ContextStore {
    pub fn new(servers: usize) -> Self {
        Self {
            directory: DashMap::new(),
            replicas: DashMap::new(),
            clocks: (0..servers).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Create an empty replica of `context` on each of `targets`
    ///
    /// `targets` are the servers the console can reach right now. Fails if
    /// any of them already holds the context.
    pub fn create(
        &self,
        context: ContextId,
        targets: &BTreeSet<ServerId>,
    ) -> Result<BTreeSet<ServerId>, CommandError> {
        if targets.is_empty() {
            return Err(CommandError::NoReachableServer(context));
        }

        // The directory entry guard serializes concurrent creates of one id
        let mut holders = self.directory.entry(context).or_default();
        if let Some(&server) = holders.intersection(targets).next() {
            return Err(CommandError::DuplicateContext { context, server });
        }

        for &server in targets {
            self.replicas
                .insert(ReplicaKey::new(context, server), Vec::new());
            holders.insert(server);
        }

        Ok(targets.clone())
    }

    pub fn append_query(
        &self,
        context: ContextId,
        server: ServerId,
        origin: ServerId,
        text: &str,
    ) -> Result<u64, CommandError> {
        self.append(
            context,
            server,
            origin,
            EntryKind::Query {
                text: text.to_string(),
            },
        )
    }

    pub fn append_response(
        &self,
        context: ContextId,
        server: ServerId,
        text: &str,
        chosen_from: ServerId,
    ) -> Result<u64, CommandError> {
        self.append(
            context,
            server,
            chosen_from,
            EntryKind::Response {
                text: text.to_string(),
            },
        )
    }

    fn append(
        &self,
        context: ContextId,
        server: ServerId,
        origin: ServerId,
        kind: EntryKind,
    ) -> Result<u64, CommandError> {
        let mut replica = self
            .replicas
            .get_mut(&ReplicaKey::new(context, server))
            .ok_or(CommandError::UnknownContext(context))?;

        // Taken under the replica guard so entry order matches sequence order
        let seq = self.tick(server);
        replica.push(Entry { seq, origin, kind });
        Ok(seq)
    }

    fn tick(&self, server: ServerId) -> u64 {
        self.clocks
            .get(server.index())
            .map(|clock| clock.fetch_add(1, Ordering::AcqRel) + 1)
            .unwrap_or(0)
    }

    pub fn holders(&self, context: ContextId) -> Result<BTreeSet<ServerId>, CommandError> {
        self.directory
            .get(&context)
            .map(|h| h.clone())
            .ok_or(CommandError::UnknownContext(context))
    }

    pub fn holds(&self, context: ContextId, server: ServerId) -> bool {
        self.replicas
            .contains_key(&ReplicaKey::new(context, server))
    }

    /// Snapshot of one server's replica
    pub fn replica(&self, context: ContextId, server: ServerId) -> Option<Vec<Entry>> {
        self.replicas
            .get(&ReplicaKey::new(context, server))
            .map(|r| r.clone())
    }

    pub fn view(&self, context: ContextId) -> Result<ReplicaView, CommandError> {
        let holders = self.holders(context)?;
        Ok(holders
            .into_iter()
            .filter_map(|server| self.replica(context, server).map(|r| (server, r)))
            .collect())
    }

    pub fn view_all(&self) -> BTreeMap<ContextId, ReplicaView> {
        let mut contexts: Vec<ContextId> = self.directory.iter().map(|e| *e.key()).collect();
        contexts.sort();
        contexts
            .into_iter()
            .filter_map(|context| self.view(context).ok().map(|v| (context, v)))
            .collect()
    }

    /// Replace `server`'s replica with `source` when it is missing or strictly
    /// shorter. Returns whether the replica changed.
    pub fn adopt(&self, context: ContextId, server: ServerId, source: &[Entry]) -> bool {
        let changed = match self.replicas.entry(ReplicaKey::new(context, server)) {
            MapEntry::Occupied(mut existing) => {
                if existing.get().len() < source.len() {
                    let restamped = self.restamp(server, source);
                    existing.insert(restamped);
                    true
                } else {
                    false
                }
            }
            MapEntry::Vacant(slot) => {
                slot.insert(self.restamp(server, source));
                true
            }
        };

        if changed {
            self.directory.entry(context).or_default().insert(server);
        }
        changed
    }

    fn restamp(&self, server: ServerId, source: &[Entry]) -> Vec<Entry> {
        source
            .iter()
            .map(|entry| Entry {
                seq: self.tick(server),
                origin: entry.origin,
                kind: entry.kind.clone(),
            })
            .collect()
    }

    /// Number of distinct context ids on any server
    pub fn context_count(&self) -> usize {
        self.directory.len()
    }
}
