//! The routing decision function (spec §4.5). Never throws — it classifies.

use super::packet::RoutablePacket;
use super::table::RoutingTable;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Drop(&'static str),
    Broadcast,
    Deliver,
    Forward(Vec<String>),
}

/// Evaluates the nine-step decision function for an incoming packet `p` at
/// node `me`. `is_duplicate` is supplied by the caller (it mutates dedup
/// state as a side effect, which this pure function must not do).
pub fn decide(
    packet: &RoutablePacket,
    me: &str,
    is_duplicate: bool,
    direct_peers: &HashSet<String>,
    routing_table: &RoutingTable,
    enable_relaying: bool,
    now: u64,
) -> Decision {
    if is_duplicate {
        return Decision::Drop("duplicate");
    }
    if packet.ttl == 0 {
        return Decision::Drop("ttl_exhausted");
    }
    if packet.contains_hop(me) {
        return Decision::Drop("loop");
    }
    let Some(recipient) = packet.recipient_id.as_deref() else {
        return Decision::Broadcast;
    };
    if recipient == me {
        return Decision::Deliver;
    }
    if direct_peers.contains(recipient) {
        return Decision::Forward(vec![recipient.to_string()]);
    }
    if let Some(entry) = routing_table.lookup(recipient, now) {
        return Decision::Forward(vec![entry.next_hop.clone()]);
    }
    if enable_relaying {
        let candidates: Vec<String> =
            direct_peers.iter().filter(|peer| !packet.contains_hop(peer)).cloned().collect();
        if !candidates.is_empty() {
            return Decision::Forward(candidates);
        }
    }
    Decision::Drop("no_route")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::packet::PacketType;

    fn packet(recipient: Option<&str>, ttl: u8, hop_path: &[&str]) -> RoutablePacket {
        RoutablePacket {
            packet_id: "p1".into(),
            sender_id: hop_path.first().copied().unwrap_or("alice").to_string(),
            recipient_id: recipient.map(str::to_string),
            payload: vec![],
            packet_type: PacketType::Message,
            ttl,
            timestamp: 0,
            origin_timestamp: 0,
            hop_path: hop_path.iter().map(|s| s.to_string()).collect(),
            signature: None,
        }
    }

    #[test]
    fn duplicate_drops_before_anything_else() {
        let p = packet(Some("me"), 0, &["me"]);
        let table = RoutingTable::new();
        let decision = decide(&p, "me", true, &HashSet::new(), &table, false, 0);
        assert_eq!(decision, Decision::Drop("duplicate"));
    }

    #[test]
    fn ttl_exhausted_drops() {
        let p = packet(Some("bob"), 0, &["alice"]);
        let table = RoutingTable::new();
        assert_eq!(decide(&p, "me", false, &HashSet::new(), &table, false, 0), Decision::Drop("ttl_exhausted"));
    }

    #[test]
    fn loop_drops_when_me_in_hop_path() {
        let p = packet(Some("bob"), 3, &["alice", "me"]);
        let table = RoutingTable::new();
        assert_eq!(decide(&p, "me", false, &HashSet::new(), &table, false, 0), Decision::Drop("loop"));
    }

    #[test]
    fn no_recipient_broadcasts() {
        let p = packet(None, 3, &["alice"]);
        let table = RoutingTable::new();
        assert_eq!(decide(&p, "me", false, &HashSet::new(), &table, false, 0), Decision::Broadcast);
    }

    #[test]
    fn recipient_is_me_delivers() {
        let p = packet(Some("me"), 3, &["alice"]);
        let table = RoutingTable::new();
        assert_eq!(decide(&p, "me", false, &HashSet::new(), &table, false, 0), Decision::Deliver);
    }

    #[test]
    fn direct_peer_forwards_directly() {
        let p = packet(Some("bob"), 3, &["alice"]);
        let mut peers = HashSet::new();
        peers.insert("bob".to_string());
        let table = RoutingTable::new();
        assert_eq!(decide(&p, "me", false, &peers, &table, false, 0), Decision::Forward(vec!["bob".to_string()]));
    }

    #[test]
    fn routing_table_entry_forwards_via_next_hop() {
        let p = packet(Some("bob"), 3, &["alice"]);
        let mut table = RoutingTable::new();
        table.learn("bob", "carol", 2, 0);
        assert_eq!(decide(&p, "me", false, &HashSet::new(), &table, false, 0), Decision::Forward(vec!["carol".to_string()]));
    }

    #[test]
    fn relaying_floods_to_peers_not_in_hop_path() {
        let p = packet(Some("zed"), 3, &["alice"]);
        let mut peers = HashSet::new();
        peers.insert("carol".to_string());
        peers.insert("alice".to_string());
        let table = RoutingTable::new();
        let decision = decide(&p, "me", false, &peers, &table, true, 0);
        assert_eq!(decision, Decision::Forward(vec!["carol".to_string()]));
    }

    #[test]
    fn no_route_drops_when_relaying_disabled() {
        let p = packet(Some("zed"), 3, &["alice"]);
        let table = RoutingTable::new();
        assert_eq!(decide(&p, "me", false, &HashSet::new(), &table, false, 0), Decision::Drop("no_route"));
    }
}
