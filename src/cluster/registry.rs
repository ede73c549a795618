//! Per-server liveness, independent of link state

use crate::error::CommandError;
use ctxmesh_common::ServerId;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct NodeRegistry {
    alive: Vec<AtomicBool>,
}

impl NodeRegistry {
    /// Create a registry where every server is alive
    pub fn new(servers: usize) -> Self {
        Self {
            alive: (0..servers).map(|_| AtomicBool::new(true)).collect(),
        }
    }

    /// Set a server's liveness, returning the previous value
    pub fn set_alive(&self, id: ServerId, alive: bool) -> Result<bool, CommandError> {
        let flag = self.alive.get(id.index()).ok_or(CommandError::UnknownServer {
            server: id.0 as u64,
            servers: self.alive.len(),
        })?;
        Ok(flag.swap(alive, Ordering::AcqRel))
    }

    /// Unknown servers are reported as not alive
    pub fn is_alive(&self, id: ServerId) -> bool {
        self.alive
            .get(id.index())
            .map(|flag| flag.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn alive_set(&self) -> BTreeSet<ServerId> {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, flag)| flag.load(Ordering::Acquire))
            .map(|(i, _)| ServerId(i as u32))
            .collect()
    }
}
