//! The `Transport` abstraction and its in-memory `LoopbackTransport` test
//! double (spec §2, §6: "the core consumes an abstract `Transport`").

pub mod coordinator;

pub use coordinator::{OutboundPath, TransportCoordinator};

use crate::error::TransportError;
use crate::routing::RoutablePacket;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Which concrete transport observed or carried something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Mesh,
    Nostr,
}

/// A peer as observed by a transport (spec §3: "Discovered peer").
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub id: String,
    pub handle: Option<String>,
    pub x25519_public: Option<[u8; 32]>,
    pub ed25519_public: Option<[u8; 32]>,
    pub last_seen: u64,
    pub hop_count: u32,
    pub transport: TransportKind,
    pub signal_estimate: Option<f64>,
    pub geohash: Option<String>,
}

/// Events a transport delivers upward; consumed by the core task.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Packet(RoutablePacket),
    PeerDiscovered(PeerInfo),
    PeerLost(String),
}

/// Common capability set implemented by the mesh transport and the Nostr
/// relay transport. Events are delivered through an internal queue rather
/// than synchronous callbacks, so the coordinator can `select!` over both
/// transports from one cooperative task.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;
    async fn disconnect(&mut self) -> Result<(), TransportError>;
    async fn send(&mut self, packet: RoutablePacket, recipient_id: &str) -> Result<(), TransportError>;
    async fn broadcast(&mut self, packet: RoutablePacket) -> Result<(), TransportError>;
    fn is_connected(&self) -> bool;
    /// Awaits the next event. Returns `None` once the transport is
    /// permanently closed and will emit nothing further.
    async fn recv_event(&mut self) -> Option<TransportEvent>;
}

/// An in-memory transport wired directly to a peer `LoopbackTransport` via
/// `tokio::sync::mpsc` channels, grounded in the teacher's loopback
/// `EncryptedStream` test harness. Used by the scenario tests and the demo
/// binary; never used for real mesh or relay I/O.
pub struct LoopbackTransport {
    local_id: String,
    peer_id: String,
    connected: bool,
    peer_inbound: mpsc::UnboundedSender<TransportEvent>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl LoopbackTransport {
    /// Builds two transports wired to each other.
    pub fn pair(local_id: impl Into<String>, peer_id: impl Into<String>) -> (Self, Self) {
        let local_id = local_id.into();
        let peer_id = peer_id.into();
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self { local_id: local_id.clone(), peer_id: peer_id.clone(), connected: false, peer_inbound: tx_b, inbound: rx_a };
        let b = Self { local_id: peer_id, peer_id: local_id, connected: false, peer_inbound: tx_a, inbound: rx_b };
        (a, b)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        let _ = self.peer_inbound.send(TransportEvent::PeerDiscovered(PeerInfo {
            id: self.local_id.clone(),
            handle: None,
            x25519_public: None,
            ed25519_public: None,
            last_seen: 0,
            hop_count: 0,
            transport: TransportKind::Mesh,
            signal_estimate: None,
            geohash: None,
        }));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        let _ = self.peer_inbound.send(TransportEvent::PeerLost(self.local_id.clone()));
        Ok(())
    }

    async fn send(&mut self, packet: RoutablePacket, recipient_id: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        if recipient_id != self.peer_id {
            return Err(TransportError::PeerNotReachable);
        }
        self.peer_inbound
            .send(TransportEvent::Packet(packet))
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn broadcast(&mut self, packet: RoutablePacket) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        self.peer_inbound
            .send(TransportEvent::Packet(packet))
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn recv_event(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{PacketType, RoutablePacket};

    #[tokio::test]
    async fn connect_announces_peer_discovery() {
        let (mut a, mut b) = LoopbackTransport::pair("alice", "bob");
        a.connect().await.unwrap();
        let event = b.recv_event().await.unwrap();
        assert!(matches!(event, TransportEvent::PeerDiscovered(ref peer) if peer.id == "alice"));
    }

    #[tokio::test]
    async fn send_delivers_packet_to_peer() {
        let (mut a, mut b) = LoopbackTransport::pair("alice", "bob");
        a.connect().await.unwrap();
        b.connect().await.unwrap();
        let _ = a.recv_event().await;
        let _ = b.recv_event().await;

        let packet = RoutablePacket::originate("alice", Some("bob"), b"hi".to_vec(), PacketType::Message, 7, 0);
        a.send(packet.clone(), "bob").await.unwrap();
        let event = b.recv_event().await.unwrap();
        assert!(matches!(event, TransportEvent::Packet(p) if p.packet_id == packet.packet_id));
    }

    #[tokio::test]
    async fn send_while_disconnected_fails() {
        let (mut a, _b) = LoopbackTransport::pair("alice", "bob");
        let packet = RoutablePacket::originate("alice", Some("bob"), b"hi".to_vec(), PacketType::Message, 7, 0);
        assert!(matches!(a.send(packet, "bob").await, Err(TransportError::Disconnected)));
    }
}
