//! Link state between every pair of servers
//!
//! One atomic flag per unordered pair, laid out as a packed upper-triangular
//! matrix. Links start up.

use crate::error::CommandError;
use ctxmesh_common::ServerId;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct Topology {
    servers: usize,
    links: Vec<AtomicBool>,
}

impl Topology {
    pub fn new(servers: usize) -> Self {
        let pairs = servers * servers.saturating_sub(1) / 2;
        Self {
            servers,
            links: (0..pairs).map(|_| AtomicBool::new(true)).collect(),
        }
    }

    pub fn servers(&self) -> usize {
        self.servers
    }

    /// Set a link up or down, returning its previous state
    pub fn set_link(&self, src: ServerId, dest: ServerId, up: bool) -> Result<bool, CommandError> {
        self.check(src)?;
        self.check(dest)?;
        if src == dest {
            return Err(CommandError::BadArguments(format!(
                "link endpoints must differ, got {} and {}",
                src, dest
            )));
        }
        let slot = &self.links[self.pair_index(src, dest)];
        Ok(slot.swap(up, Ordering::AcqRel))
    }

    /// Whether the link between `a` and `b` is up. A server is always linked to itself.
    pub fn is_up(&self, a: ServerId, b: ServerId) -> Result<bool, CommandError> {
        self.check(a)?;
        self.check(b)?;
        if a == b {
            return Ok(true);
        }
        Ok(self.links[self.pair_index(a, b)].load(Ordering::Acquire))
    }

    /// Servers with an up link to `id`, excluding `id` itself
    pub fn neighbors(&self, id: ServerId) -> Vec<ServerId> {
        (0..self.servers as u32)
            .map(ServerId)
            .filter(|&other| other != id && self.is_up(id, other).unwrap_or(false))
            .collect()
    }

    /// All links currently down, as `(low, high)` pairs
    pub fn failed_links(&self) -> Vec<(ServerId, ServerId)> {
        let mut out = Vec::new();
        for a in 0..self.servers as u32 {
            for b in (a + 1)..self.servers as u32 {
                if !self.links[self.pair_index(ServerId(a), ServerId(b))].load(Ordering::Acquire) {
                    out.push((ServerId(a), ServerId(b)));
                }
            }
        }
        out
    }

    fn check(&self, id: ServerId) -> Result<(), CommandError> {
        if id.index() < self.servers {
            Ok(())
        } else {
            Err(CommandError::UnknownServer {
                server: id.0 as u64,
                servers: self.servers,
            })
        }
    }

    fn pair_index(&self, a: ServerId, b: ServerId) -> usize {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (lo, hi) = (lo.index(), hi.index());
        // Row `lo` starts after the rows for 0..lo, of lengths n-1, n-2, ...
        lo * (2 * self.servers - lo - 1) / 2 + (hi - lo - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_default_up() {
        let topology = Topology::new(3);
        assert!(topology.is_up(ServerId(0), ServerId(1)).unwrap());
        assert!(topology.is_up(ServerId(2), ServerId(2)).unwrap());
        assert!(topology.failed_links().is_empty());
    }

    #[test]
    fn test_last_transition_wins() {
        let topology = Topology::new(4);
        let (a, b) = (ServerId(3), ServerId(1));

        let transitions = [false, false, true, false, true, true, false];
        for up in transitions {
            topology.set_link(a, b, up).unwrap();
            assert_eq!(topology.is_up(a, b).unwrap(), up);
            assert_eq!(topology.is_up(b, a).unwrap(), up);
        }
        assert_eq!(topology.failed_links(), vec![(ServerId(1), ServerId(3))]);
    }

    #[test]
    fn test_links_are_independent() {
        let topology = Topology::new(5);
        topology.set_link(ServerId(0), ServerId(4), false).unwrap();

        for a in 0..5 {
            for b in 0..5 {
                let expected = !((a, b) == (0, 4) || (a, b) == (4, 0));
                assert_eq!(
                    topology.is_up(ServerId(a), ServerId(b)).unwrap(),
                    expected,
                    "link {a}-{b}"
                );
            }
        }
    }

    #[test]
    fn test_self_link_rejected() {
        let topology = Topology::new(3);
        let err = topology.set_link(ServerId(1), ServerId(1), false).unwrap_err();
        assert!(matches!(err, CommandError::BadArguments(_)));
    }

    #[test]
    fn test_unknown_server() {
        let topology = Topology::new(3);
        let err = topology.set_link(ServerId(0), ServerId(3), false).unwrap_err();
        assert!(matches!(err, CommandError::UnknownServer { server: 3, .. }));
        assert!(topology.is_up(ServerId(7), ServerId(0)).is_err());
    }

    #[test]
    fn test_set_link_returns_previous() {
        let topology = Topology::new(2);
        assert!(topology.set_link(ServerId(0), ServerId(1), false).unwrap());
        assert!(!topology.set_link(ServerId(1), ServerId(0), true).unwrap());
    }

    #[test]
    fn test_neighbors() {
        let topology = Topology::new(3);
        topology.set_link(ServerId(0), ServerId(1), false).unwrap();
        assert_eq!(topology.neighbors(ServerId(0)), vec![ServerId(2)]);
        assert_eq!(topology.neighbors(ServerId(2)), vec![ServerId(0), ServerId(1)]);
    }
}
