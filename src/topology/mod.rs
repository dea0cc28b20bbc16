//! Topology tracker (spec §4.9): observed nodes/edges, shortest-path BFS
//! queries, and staleness reaping. Distinct from `routing::RoutingTable`,
//! which only remembers the single best next-hop per destination — this
//! keeps the full observed adjacency so `shortest_path` can be recomputed
//! on demand and `health()` can summarize link quality.

use crate::transport::{PeerInfo, TransportKind};
use std::collections::{HashMap, HashSet, VecDeque};

pub const STALE_AFTER_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: String,
    pub handle: Option<String>,
    pub last_seen: u64,
    pub hop_count: u32,
    pub transport: Option<TransportKind>,
    pub signal_estimate: Option<f64>,
    pub geohash: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct EdgeInfo {
    pub strength: f64,
    pub last_seen: u64,
}

/// `nodes: map<id, NodeInfo>` and `edges: map<(a,b), EdgeInfo>` per spec
/// §4.9, with directed adjacency formed from peer-discovery sightings and
/// from the hop paths carried by routed packets.
#[derive(Default)]
pub struct TopologyTracker {
    nodes: HashMap<String, NodeInfo>,
    edges: HashMap<(String, String), EdgeInfo>,
}

impl TopologyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&NodeInfo> {
        self.nodes.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn record_edge(&mut self, from: &str, to: &str, strength: f64, now: u64) {
        if from == to {
            return;
        }
        self.edges.insert((from.to_string(), to.to_string()), EdgeInfo { strength: strength.clamp(0.0, 1.0), last_seen: now });
    }

    fn upsert_node(&mut self, id: &str, now: u64, f: impl FnOnce(&mut NodeInfo)) {
        let entry = self.nodes.entry(id.to_string()).or_insert_with(|| NodeInfo {
            id: id.to_string(),
            handle: None,
            last_seen: now,
            hop_count: 0,
            transport: None,
            signal_estimate: None,
            geohash: None,
        });
        entry.last_seen = now;
        f(entry);
    }

    /// Records a peer sighting observed directly by `me` (transport
    /// `on_peer_discovered` callback). The edge `me -> peer.id` carries
    /// `peer.signal_estimate` as its strength, defaulting to full strength
    /// for a direct sighting with no signal estimate.
    pub fn observe_peer(&mut self, me: &str, peer: &PeerInfo, now: u64) {
        self.upsert_node(&peer.id, now, |node| {
            node.handle = peer.handle.clone();
            node.hop_count = peer.hop_count;
            node.transport = Some(peer.transport);
            node.signal_estimate = peer.signal_estimate;
            node.geohash = peer.geohash.clone();
        });
        self.record_edge(me, &peer.id, peer.signal_estimate.unwrap_or(1.0), now);
    }

    /// Learns the directed edges implied by a packet's traversed hop path:
    /// `hop_path[i] -> hop_path[i+1]` for every consecutive pair.
    pub fn observe_hop_path(&mut self, hop_path: &[String], now: u64) {
        for window in hop_path.windows(2) {
            let (a, b) = (&window[0], &window[1]);
            self.upsert_node(a, now, |_| {});
            self.upsert_node(b, now, |_| {});
            self.record_edge(a, b, 1.0, now);
        }
    }

    /// BFS shortest path from `from` to `target` over the directed
    /// adjacency formed by observed edges. Returns the full path including
    /// both endpoints, or `None` if unreachable.
    pub fn shortest_path(&self, from: &str, target: &str) -> Option<Vec<String>> {
        if from == target {
            return Some(vec![from.to_string()]);
        }
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(from);
        let mut queue: VecDeque<Vec<&str>> = VecDeque::new();
        queue.push_back(vec![from]);

        while let Some(path) = queue.pop_front() {
            let current = *path.last().expect("path always has at least one node");
            for (a, b) in self.edges.keys() {
                if a == current && !visited.contains(b.as_str()) {
                    let mut next_path = path.clone();
                    next_path.push(b.as_str());
                    if b == target {
                        return Some(next_path.into_iter().map(str::to_string).collect());
                    }
                    visited.insert(b.as_str());
                    queue.push_back(next_path);
                }
            }
        }
        None
    }

    /// Mean edge strength across all observed edges; `0.0` if none.
    pub fn health(&self) -> f64 {
        if self.edges.is_empty() {
            return 0.0;
        }
        self.edges.values().map(|e| e.strength).sum::<f64>() / self.edges.len() as f64
    }

    /// Prunes nodes (and their incident edges) with no observation in the
    /// last `STALE_AFTER_SECS`.
    pub fn reap_stale(&mut self, now: u64) {
        let stale: HashSet<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| now.saturating_sub(node.last_seen) > STALE_AFTER_SECS)
            .map(|(id, _)| id.clone())
            .collect();
        self.nodes.retain(|id, _| !stale.contains(id));
        self.edges.retain(|(a, b), _| !stale.contains(a) && !stale.contains(b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str, signal: Option<f64>) -> PeerInfo {
        PeerInfo {
            id: id.to_string(),
            handle: None,
            x25519_public: None,
            ed25519_public: None,
            last_seen: 0,
            hop_count: 0,
            transport: TransportKind::Mesh,
            signal_estimate: signal,
            geohash: None,
        }
    }

    #[test]
    fn observe_peer_creates_node_and_edge() {
        let mut tracker = TopologyTracker::new();
        tracker.observe_peer("alice", &peer("bob", Some(0.8)), 100);
        assert!(tracker.node("bob").is_some());
        assert_eq!(tracker.edge_count(), 1);
    }

    #[test]
    fn shortest_path_via_hop_path_chain() {
        let mut tracker = TopologyTracker::new();
        let hops = vec!["alice".to_string(), "carol".to_string(), "dave".to_string(), "bob".to_string()];
        tracker.observe_hop_path(&hops, 0);
        let path = tracker.shortest_path("alice", "bob").unwrap();
        assert_eq!(path, hops);
    }

    #[test]
    fn shortest_path_returns_none_when_unreachable() {
        let tracker = TopologyTracker::new();
        assert!(tracker.shortest_path("alice", "bob").is_none());
    }

    #[test]
    fn health_is_mean_edge_strength() {
        let mut tracker = TopologyTracker::new();
        assert_eq!(tracker.health(), 0.0);
        tracker.observe_peer("alice", &peer("bob", Some(1.0)), 0);
        tracker.observe_peer("alice", &peer("carol", Some(0.5)), 0);
        assert!((tracker.health() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn reap_stale_removes_old_nodes_and_incident_edges() {
        let mut tracker = TopologyTracker::new();
        tracker.observe_peer("alice", &peer("bob", None), 0);
        tracker.reap_stale(STALE_AFTER_SECS + 1);
        assert!(tracker.node("bob").is_none());
        assert_eq!(tracker.edge_count(), 0);
    }
}
