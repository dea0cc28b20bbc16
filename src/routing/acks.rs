//! Pending-ack state machine (spec §4.5, §4.9): `Outbound -> Acked |
//! Retrying -> Acked | Failed`.

use super::packet::RoutablePacket;
use std::collections::HashMap;

pub const DEFAULT_RETRY_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
const MAX_PENDING: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckState {
    Outbound,
    Retrying,
    Acked,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PendingAck {
    pub envelope: RoutablePacket,
    pub sent_at_ms: u64,
    pub retry_count: u32,
    pub state: AckState,
}

/// What the engine should do with a pending-ack entry after a timer tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    ReEmit(RoutablePacket),
    DeliveryFailed(String),
}

pub struct PendingAckTable {
    entries: HashMap<String, PendingAck>,
    retry_timeout_ms: u64,
    max_retries: u32,
}

impl PendingAckTable {
    pub fn new(retry_timeout_ms: u64, max_retries: u32) -> Self {
        Self { entries: HashMap::new(), retry_timeout_ms, max_retries }
    }

    /// Records a freshly-sent packet awaiting acknowledgement. Oldest entry
    /// is dropped (surfacing a delivery-failed notification) once the table
    /// exceeds `MAX_PENDING`.
    pub fn insert(&mut self, packet: RoutablePacket, now_ms: u64) -> Option<String> {
        let mut evicted = None;
        if self.entries.len() >= MAX_PENDING {
            if let Some(oldest_id) = self
                .entries
                .iter()
                .min_by_key(|(_, ack)| ack.sent_at_ms)
                .map(|(id, _)| id.clone())
            {
                self.entries.remove(&oldest_id);
                evicted = Some(oldest_id);
            }
        }
        self.entries.insert(
            packet.packet_id.clone(),
            PendingAck { envelope: packet, sent_at_ms: now_ms, retry_count: 0, state: AckState::Outbound },
        );
        evicted
    }

    /// Receipt of a `message-ack` naming `packet_id` clears the entry.
    pub fn acknowledge(&mut self, packet_id: &str) -> bool {
        self.entries.remove(packet_id).is_some()
    }

    /// Runs one timer tick (spec: every 10s) over all pending entries,
    /// advancing the state machine and returning what the engine must do.
    pub fn tick(&mut self, now_ms: u64) -> Vec<TickOutcome> {
        let mut outcomes = Vec::new();
        let mut to_remove = Vec::new();

        for (packet_id, ack) in self.entries.iter_mut() {
            if now_ms.saturating_sub(ack.sent_at_ms) <= self.retry_timeout_ms {
                continue;
            }
            if ack.retry_count < self.max_retries {
                ack.retry_count += 1;
                ack.sent_at_ms = now_ms;
                ack.state = AckState::Retrying;
                outcomes.push(TickOutcome::ReEmit(ack.envelope.clone()));
            } else {
                ack.state = AckState::Failed;
                outcomes.push(TickOutcome::DeliveryFailed(packet_id.clone()));
                to_remove.push(packet_id.clone());
            }
        }

        for packet_id in to_remove {
            self.entries.remove(&packet_id);
        }
        outcomes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn state_of(&self, packet_id: &str) -> Option<AckState> {
        self.entries.get(packet_id).map(|ack| ack.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::packet::PacketType;

    fn packet(id: &str) -> RoutablePacket {
        RoutablePacket {
            packet_id: id.to_string(),
            sender_id: "alice".into(),
            recipient_id: Some("bob".into()),
            payload: vec![],
            packet_type: PacketType::Message,
            ttl: 7,
            timestamp: 0,
            origin_timestamp: 0,
            hop_path: vec!["alice".into()],
            signature: None,
        }
    }

    #[test]
    fn ack_received_clears_entry() {
        let mut table = PendingAckTable::new(DEFAULT_RETRY_TIMEOUT_MS, DEFAULT_MAX_RETRIES);
        table.insert(packet("p1"), 0);
        assert!(table.acknowledge("p1"));
        assert!(table.is_empty());
    }

    #[test]
    fn tick_before_timeout_does_nothing() {
        let mut table = PendingAckTable::new(DEFAULT_RETRY_TIMEOUT_MS, DEFAULT_MAX_RETRIES);
        table.insert(packet("p1"), 0);
        assert!(table.tick(1000).is_empty());
        assert_eq!(table.state_of("p1"), Some(AckState::Outbound));
    }

    #[test]
    fn tick_after_timeout_retries_then_fails() {
        let mut table = PendingAckTable::new(1000, 2);
        table.insert(packet("p1"), 0);

        let outcomes = table.tick(1500);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], TickOutcome::ReEmit(_)));
        assert_eq!(table.state_of("p1"), Some(AckState::Retrying));

        let outcomes = table.tick(3000);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], TickOutcome::ReEmit(_)));

        let outcomes = table.tick(4500);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], TickOutcome::DeliveryFailed(_)));
        assert!(table.is_empty());
    }
}
