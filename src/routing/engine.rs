//! The `Router`: ties the packet shape, routing table, pending-ack table,
//! and dedup service together into the decision loop from spec §4.5.

use super::acks::{PendingAckTable, TickOutcome};
use super::decision::{decide, Decision};
use super::packet::{PacketType, RoutablePacket};
use super::table::RoutingTable;
use crate::dedup::{dedup_key, DedupState};
use std::collections::HashSet;

/// What the caller (the `TransportCoordinator`/`Core`) must do after an
/// incoming packet has been run through the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterOutcome {
    Dropped(&'static str),
    Delivered(RoutablePacket),
    Forwarded { packet: RoutablePacket, to: Vec<String> },
    Broadcasted(RoutablePacket),
}

pub struct Router {
    me: String,
    enable_relaying: bool,
    dedup: DedupState,
    table: RoutingTable,
    acks: PendingAckTable,
    direct_peers: HashSet<String>,
}

impl Router {
    pub fn new(me: impl Into<String>, enable_relaying: bool, ack_retry_timeout_ms: u64, ack_retry_max: u32) -> Self {
        Self {
            me: me.into(),
            enable_relaying,
            dedup: DedupState::new(),
            table: RoutingTable::new(),
            acks: PendingAckTable::new(ack_retry_timeout_ms, ack_retry_max),
            direct_peers: HashSet::new(),
        }
    }

    pub fn direct_peers(&self) -> &HashSet<String> {
        &self.direct_peers
    }

    /// A peer becomes directly reachable: learned at hop_count 0.
    pub fn peer_discovered(&mut self, peer_id: &str, now_secs: u64) {
        self.direct_peers.insert(peer_id.to_string());
        self.table.learn_direct(peer_id, now_secs);
    }

    pub fn peer_lost(&mut self, peer_id: &str) {
        self.direct_peers.remove(peer_id);
    }

    /// Originates a new outbound packet addressed to `recipient_id`, with
    /// `initial_ttl` (usually `CoreConfig::max_hops`) and records it in the
    /// pending-ack table.
    pub fn originate(
        &mut self,
        recipient_id: &str,
        payload: Vec<u8>,
        initial_ttl: u8,
        now_secs: u64,
        now_ms: u64,
    ) -> RoutablePacket {
        let packet = RoutablePacket::originate(&self.me, Some(recipient_id), payload, PacketType::Message, initial_ttl, now_secs);
        self.acks.insert(packet.clone(), now_ms);
        packet
    }

    /// Runs the §4.5 decision function against an incoming packet, updates
    /// dedup/routing-table state as a side effect, and returns what the
    /// caller must do next.
    pub fn handle_incoming(&mut self, packet: RoutablePacket, now_secs: u64) -> RouterOutcome {
        let key = dedup_key(&packet.sender_id, &packet.packet_id, packet.origin_timestamp);
        let is_duplicate = self.dedup.is_duplicate(&key);
        let decision = decide(&packet, &self.me, is_duplicate, &self.direct_peers, &self.table, self.enable_relaying, now_secs);

        if !matches!(decision, Decision::Drop(_)) {
            if let Some(previous_hop) = packet.hop_path.last() {
                self.table.learn(&packet.sender_id, previous_hop, packet.hop_path.len() as u32, now_secs);
            }
        }

        match decision {
            Decision::Drop(reason) => RouterOutcome::Dropped(reason),
            Decision::Deliver => {
                if packet.packet_type == PacketType::MessageAck {
                    if let Ok(acked_id) = String::from_utf8(packet.payload.clone()) {
                        self.acks.acknowledge(&acked_id);
                    }
                }
                RouterOutcome::Delivered(packet)
            }
            Decision::Forward(to) => {
                let forwarded = packet.forwarded(&self.me).expect("decide() already checked ttl > 0");
                RouterOutcome::Forwarded { packet: forwarded, to }
            }
            Decision::Broadcast => {
                let forwarded = packet.forwarded(&self.me).expect("decide() already checked ttl > 0");
                RouterOutcome::Broadcasted(forwarded)
            }
        }
    }

    /// A `message-ack` packet addressed back to `recipient_id` (the original
    /// sender of `original_packet_id`); the caller is responsible for
    /// actually transmitting it. It must carry a concrete recipient rather
    /// than `None` — an unaddressed packet hits the "no recipient ⇒
    /// broadcast" arm of `decide()` instead of resolving to `Deliver` at the
    /// original sender, which would leave that sender's pending-ack entry
    /// stuck forever.
    pub fn build_ack(&self, original_packet_id: &str, recipient_id: &str, now_secs: u64) -> RoutablePacket {
        RoutablePacket::originate(
            &self.me,
            Some(recipient_id),
            original_packet_id.as_bytes().to_vec(),
            PacketType::MessageAck,
            1,
            now_secs,
        )
    }

    pub fn tick_acks(&mut self, now_ms: u64) -> Vec<TickOutcome> {
        self.acks.tick(now_ms)
    }

    pub fn rotate_dedup(&mut self) {
        self.dedup.rotate();
    }

    pub fn reap_stale_routes(&mut self, now_secs: u64) {
        self.table.reap_stale(now_secs);
    }

    pub fn pending_ack_count(&self) -> usize {
        self.acks.len()
    }

    /// A known mesh route to `destination`: either a direct peer, or a
    /// non-stale routing-table entry. Used by the transport coordinator's
    /// Hybrid selection policy.
    pub fn route_for(&self, destination: &str, now_secs: u64) -> Option<String> {
        if self.direct_peers.contains(destination) {
            return Some(destination.to_string());
        }
        self.table.lookup(destination, now_secs).map(|e| e.next_hop.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_delivery_round_trip() {
        let mut alice = Router::new("alice", false, 30_000, 3);
        let mut bob = Router::new("bob", false, 30_000, 3);
        alice.peer_discovered("bob", 0);
        bob.peer_discovered("alice", 0);

        let packet = alice.originate("bob", b"hello".to_vec(), 7, 0, 0);
        let outcome = bob.handle_incoming(packet.clone(), 0);
        assert_eq!(outcome, RouterOutcome::Delivered(packet.clone()));
        assert_eq!(packet.hop_path, vec!["alice".to_string()]);

        let ack = bob.build_ack(&packet.packet_id, "alice", 0);
        let ack_outcome = alice.handle_incoming(ack, 0);
        assert!(matches!(ack_outcome, RouterOutcome::Delivered(_)));
        assert_eq!(alice.pending_ack_count(), 0);
    }

    #[test]
    fn duplicate_packet_from_second_transport_is_dropped() {
        let mut bob = Router::new("bob", false, 30_000, 3);
        let packet = RoutablePacket::originate("alice", Some("bob"), b"x".to_vec(), PacketType::Message, 7, 0);
        let first = bob.handle_incoming(packet.clone(), 0);
        assert!(matches!(first, RouterOutcome::Delivered(_)));
        let second = bob.handle_incoming(packet, 0);
        assert_eq!(second, RouterOutcome::Dropped("duplicate"));
    }

    #[test]
    fn multi_hop_learns_shorter_route_on_ack() {
        let mut alice = Router::new("alice", false, 30_000, 3);
        let hop_path = vec!["alice".to_string(), "carol".to_string(), "dave".to_string()];
        let ack = RoutablePacket {
            packet_id: "ack1".into(),
            sender_id: "bob".into(),
            recipient_id: Some("alice".into()),
            payload: b"pkt-1".to_vec(),
            packet_type: PacketType::MessageAck,
            ttl: 5,
            timestamp: 0,
            origin_timestamp: 0,
            hop_path,
            signature: None,
        };
        alice.handle_incoming(ack, 0);
        assert_eq!(alice.route_for("bob", 0), Some("dave".to_string()));
    }
}
