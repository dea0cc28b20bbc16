//! Routing table: learned `destination -> next_hop` entries, replaced only
//! by a strictly shorter path and reaped after a staleness window.

use std::collections::HashMap;

pub const STALE_AFTER_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct RoutingEntry {
    pub next_hop: String,
    pub hop_count: u32,
    pub last_updated: u64,
}

#[derive(Default)]
pub struct RoutingTable {
    entries: HashMap<String, RoutingEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learns `destination -> next_hop` at `hop_count`, but only if there is
    /// no existing entry or the new path is strictly shorter.
    pub fn learn(&mut self, destination: &str, next_hop: &str, hop_count: u32, now: u64) {
        let better = match self.entries.get(destination) {
            Some(existing) => hop_count < existing.hop_count,
            None => true,
        };
        if better {
            self.entries.insert(
                destination.to_string(),
                RoutingEntry { next_hop: next_hop.to_string(), hop_count, last_updated: now },
            );
        }
    }

    /// Records a direct-peer sighting: `next_hop = peer, hop_count = 0`.
    pub fn learn_direct(&mut self, peer_id: &str, now: u64) {
        self.learn(peer_id, peer_id, 0, now);
    }

    /// Returns the entry for `destination` if present and not stale as of `now`.
    pub fn lookup(&self, destination: &str, now: u64) -> Option<&RoutingEntry> {
        self.entries.get(destination).filter(|e| now.saturating_sub(e.last_updated) <= STALE_AFTER_SECS)
    }

    /// Prunes entries untouched for longer than `STALE_AFTER_SECS`.
    pub fn reap_stale(&mut self, now: u64) {
        self.entries.retain(|_, e| now.saturating_sub(e.last_updated) <= STALE_AFTER_SECS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learn_replaces_only_if_strictly_shorter() {
        let mut table = RoutingTable::new();
        table.learn("bob", "carol", 3, 1000);
        table.learn("bob", "dave", 5, 1001);
        assert_eq!(table.lookup("bob", 1001).unwrap().next_hop, "carol");
        table.learn("bob", "erin", 2, 1002);
        assert_eq!(table.lookup("bob", 1002).unwrap().next_hop, "erin");
    }

    #[test]
    fn stale_entries_are_not_returned() {
        let mut table = RoutingTable::new();
        table.learn("bob", "carol", 1, 0);
        assert!(table.lookup("bob", STALE_AFTER_SECS + 1).is_none());
    }

    #[test]
    fn reap_stale_removes_old_entries() {
        let mut table = RoutingTable::new();
        table.learn("bob", "carol", 1, 0);
        table.reap_stale(STALE_AFTER_SECS + 1);
        assert!(table.lookup("bob", STALE_AFTER_SECS + 1).is_none());
    }
}
