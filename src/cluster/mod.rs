pub mod registry;
pub mod topology;
pub mod transport;

pub use registry::NodeRegistry;
pub use topology::Topology;
pub use transport::{Transport, Undelivered};

use crate::config::Routing;
use crate::error::CommandError;
use ctxmesh_common::ServerId;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Link and liveness state of the whole cluster, plus the routing rule that
/// turns them into reachability
pub struct Cluster {
    topology: Topology,
    nodes: NodeRegistry,
    routing: Routing,
    ingress: ServerId,
}

impl Cluster {
    pub fn new(servers: usize, ingress: ServerId, routing: Routing) -> Self {
        Self {
            topology: Topology::new(servers),
            nodes: NodeRegistry::new(servers),
            routing,
            ingress,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    pub fn routing(&self) -> Routing {
        self.routing
    }

    /// Server the operator console is attached to
    pub fn ingress(&self) -> ServerId {
        self.ingress
    }

    pub fn servers(&self) -> usize {
        self.topology.servers()
    }

    /// Validate a raw id from a command
    pub fn server(&self, raw: u64) -> Result<ServerId, CommandError> {
        match u32::try_from(raw) {
            Ok(id) if (id as usize) < self.servers() => Ok(ServerId(id)),
            _ => Err(CommandError::UnknownServer {
                server: raw,
                servers: self.servers(),
            }),
        }
    }

    /// Alive servers that `from` can currently deliver to, including itself.
    /// Empty when `from` has failed.
    pub fn reachable_from(&self, from: ServerId) -> BTreeSet<ServerId> {
        self.distances(from).into_keys().collect()
    }

    pub fn reachable_from_ingress(&self) -> BTreeSet<ServerId> {
        self.reachable_from(self.ingress)
    }

    pub fn can_reach(&self, from: ServerId, to: ServerId) -> bool {
        self.hops(from, to).is_some()
    }

    /// Links a message from `from` crosses to reach `to`, or `None` when it
    /// cannot get there. Always 1 between distinct servers under direct routing.
    pub fn hops(&self, from: ServerId, to: ServerId) -> Option<u32> {
        if !self.nodes.is_alive(from) || !self.nodes.is_alive(to) {
            return None;
        }
        match self.routing {
            Routing::Direct if from == to => Some(0),
            Routing::Direct => self.topology.is_up(from, to).ok()?.then_some(1),
            Routing::MultiHop => self.distances(from).get(&to).copied(),
        }
    }

    /// Shortest hop count from `from` to every server it reaches
    fn distances(&self, from: ServerId) -> BTreeMap<ServerId, u32> {
        let mut reached = BTreeMap::new();
        if !self.nodes.is_alive(from) {
            return reached;
        }
        reached.insert(from, 0);

        match self.routing {
            Routing::Direct => {
                reached.extend(
                    self.topology
                        .neighbors(from)
                        .into_iter()
                        .filter(|&s| self.nodes.is_alive(s))
                        .map(|s| (s, 1)),
                );
            }
            Routing::MultiHop => {
                let mut queue = VecDeque::from([(from, 0)]);
                while let Some((current, depth)) = queue.pop_front() {
                    for next in self.topology.neighbors(current) {
                        if self.nodes.is_alive(next) && !reached.contains_key(&next) {
                            reached.insert(next, depth + 1);
                            queue.push_back((next, depth + 1));
                        }
                    }
                }
            }
        }

        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[u32]) -> BTreeSet<ServerId> {
        v.iter().copied().map(ServerId).collect()
    }

    #[test]
    fn test_direct_reachability() {
        let cluster = Cluster::new(3, ServerId(0), Routing::Direct);
        assert_eq!(cluster.reachable_from_ingress(), ids(&[0, 1, 2]));

        cluster
            .topology()
            .set_link(ServerId(0), ServerId(1), false)
            .unwrap();
        assert_eq!(cluster.reachable_from_ingress(), ids(&[0, 2]));
        assert!(!cluster.can_reach(ServerId(0), ServerId(1)));
        assert!(cluster.can_reach(ServerId(2), ServerId(1)));
    }

    #[test]
    fn test_multi_hop_reachability() {
        let cluster = Cluster::new(3, ServerId(0), Routing::MultiHop);
        cluster
            .topology()
            .set_link(ServerId(0), ServerId(1), false)
            .unwrap();
        // 0 -> 2 -> 1
        assert_eq!(cluster.reachable_from_ingress(), ids(&[0, 1, 2]));

        cluster.nodes().set_alive(ServerId(2), false).unwrap();
        assert_eq!(cluster.reachable_from_ingress(), ids(&[0]));
    }

    #[test]
    fn test_failed_node_unreachable_with_link_up() {
        let cluster = Cluster::new(3, ServerId(0), Routing::Direct);
        cluster.nodes().set_alive(ServerId(2), false).unwrap();
        assert!(cluster.topology().is_up(ServerId(0), ServerId(2)).unwrap());
        assert_eq!(cluster.reachable_from_ingress(), ids(&[0, 1]));
    }

    #[test]
    fn test_failed_ingress_reaches_nothing() {
        let cluster = Cluster::new(3, ServerId(0), Routing::Direct);
        cluster.nodes().set_alive(ServerId(0), false).unwrap();
        assert!(cluster.reachable_from_ingress().is_empty());
    }

    #[test]
    fn test_hop_counts() {
        let cluster = Cluster::new(4, ServerId(0), Routing::MultiHop);
        for (a, b) in [(0, 1), (0, 2), (1, 3)] {
            cluster
                .topology()
                .set_link(ServerId(a), ServerId(b), false)
                .unwrap();
        }
        // 0 -> 3 -> 2 -> 1
        assert_eq!(cluster.hops(ServerId(0), ServerId(0)), Some(0));
        assert_eq!(cluster.hops(ServerId(0), ServerId(3)), Some(1));
        assert_eq!(cluster.hops(ServerId(0), ServerId(2)), Some(2));
        assert_eq!(cluster.hops(ServerId(0), ServerId(1)), Some(3));

        cluster.nodes().set_alive(ServerId(2), false).unwrap();
        assert_eq!(cluster.hops(ServerId(0), ServerId(1)), None);

        let direct = Cluster::new(3, ServerId(0), Routing::Direct);
        direct
            .topology()
            .set_link(ServerId(0), ServerId(1), false)
            .unwrap();
        assert_eq!(direct.hops(ServerId(0), ServerId(2)), Some(1));
        assert_eq!(direct.hops(ServerId(0), ServerId(1)), None);
    }

    #[test]
    fn test_server_validation() {
        let cluster = Cluster::new(3, ServerId(0), Routing::Direct);
        assert_eq!(cluster.server(2).unwrap(), ServerId(2));
        assert!(matches!(
            cluster.server(3),
            Err(CommandError::UnknownServer { server: 3, servers: 3 })
        ));
        assert!(cluster.server(u64::MAX).is_err());
    }
}
