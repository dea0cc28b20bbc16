//! Owns the two `Transport` implementations and chooses a path per outbound
//! packet per the selection policy in spec §4.6.

use super::{Transport, TransportEvent, TransportKind};
use crate::config::{CoreConfig, PreferredTransport};
use crate::error::TransportError;
use crate::routing::{RoutablePacket, Router};

/// Which transport(s) an outbound packet should travel over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundPath {
    Mesh,
    Nostr,
    Both,
    None,
}

pub struct TransportCoordinator {
    config: CoreConfig,
    mesh: Option<Box<dyn Transport>>,
    nostr: Option<Box<dyn Transport>>,
}

impl TransportCoordinator {
    pub fn new(config: CoreConfig, mesh: Option<Box<dyn Transport>>, nostr: Option<Box<dyn Transport>>) -> Self {
        Self { config, mesh, nostr }
    }

    /// Attaches (or replaces) the mesh transport. Transports are wired in
    /// after `Core::bootstrap` resolves this device's identity, since a
    /// transport must be constructed knowing the local node's id (see
    /// `Core::attach_mesh`).
    pub fn set_mesh(&mut self, transport: Box<dyn Transport>) {
        self.mesh = Some(transport);
    }

    /// Attaches (or replaces) the Nostr transport.
    pub fn set_nostr(&mut self, transport: Box<dyn Transport>) {
        self.nostr = Some(transport);
    }

    pub async fn connect_all(&mut self) -> Result<(), TransportError> {
        if let Some(mesh) = self.mesh.as_mut() {
            if self.config.mesh_enabled {
                mesh.connect().await?;
            }
        }
        if let Some(nostr) = self.nostr.as_mut() {
            if self.config.nostr_enabled {
                nostr.connect().await?;
            }
        }
        Ok(())
    }

    /// Selection policy for a unicast packet addressed to `recipient_id`.
    pub fn select_unicast(&self, recipient_id: &str, router: &Router, now_secs: u64) -> OutboundPath {
        let mesh_available = self.config.mesh_enabled && self.mesh.is_some();
        let nostr_available = self.config.nostr_enabled && self.nostr.is_some();
        let mesh_route = mesh_available && router.route_for(recipient_id, now_secs).is_some();

        match self.config.preferred_transport {
            PreferredTransport::Mesh => if mesh_route { OutboundPath::Mesh } else { OutboundPath::None },
            PreferredTransport::Nostr => if nostr_available { OutboundPath::Nostr } else { OutboundPath::None },
            PreferredTransport::Hybrid => {
                if mesh_route {
                    OutboundPath::Mesh
                } else if nostr_available {
                    OutboundPath::Nostr
                } else {
                    OutboundPath::None
                }
            }
        }
    }

    /// Selection policy for a broadcast. Under Hybrid, a broadcast floods
    /// mesh AND publishes to the current geohash channel on Nostr.
    pub fn select_broadcast(&self) -> OutboundPath {
        let mesh_available = self.config.mesh_enabled && self.mesh.is_some();
        let nostr_available = self.config.nostr_enabled && self.nostr.is_some();

        match self.config.preferred_transport {
            PreferredTransport::Mesh => if mesh_available { OutboundPath::Mesh } else { OutboundPath::None },
            PreferredTransport::Nostr => if nostr_available { OutboundPath::Nostr } else { OutboundPath::None },
            PreferredTransport::Hybrid => match (mesh_available, nostr_available) {
                (true, true) => OutboundPath::Both,
                (true, false) => OutboundPath::Mesh,
                (false, true) => OutboundPath::Nostr,
                (false, false) => OutboundPath::None,
            },
        }
    }

    pub async fn send_unicast(
        &mut self,
        packet: RoutablePacket,
        recipient_id: &str,
        router: &Router,
        now_secs: u64,
    ) -> Result<(), TransportError> {
        match self.select_unicast(recipient_id, router, now_secs) {
            OutboundPath::Mesh => self.mesh.as_mut().ok_or(TransportError::PeerNotReachable)?.send(packet, recipient_id).await,
            OutboundPath::Nostr => self.nostr.as_mut().ok_or(TransportError::PeerNotReachable)?.send(packet, recipient_id).await,
            OutboundPath::Both | OutboundPath::None => Err(TransportError::PeerNotReachable),
        }
    }

    pub async fn broadcast(&mut self, packet: RoutablePacket) -> Result<(), TransportError> {
        match self.select_broadcast() {
            OutboundPath::Mesh => self.mesh.as_mut().ok_or(TransportError::PeerNotReachable)?.broadcast(packet).await,
            OutboundPath::Nostr => self.nostr.as_mut().ok_or(TransportError::PeerNotReachable)?.broadcast(packet).await,
            OutboundPath::Both => {
                let mesh = self.mesh.as_mut().ok_or(TransportError::PeerNotReachable)?;
                mesh.broadcast(packet.clone()).await?;
                let nostr = self.nostr.as_mut().ok_or(TransportError::PeerNotReachable)?;
                nostr.broadcast(packet).await
            }
            OutboundPath::None => Err(TransportError::PeerNotReachable),
        }
    }

    /// Awaits the next event from whichever transport produces one first.
    pub async fn recv_event(&mut self) -> Option<(TransportKind, TransportEvent)> {
        match (self.mesh.as_mut(), self.nostr.as_mut()) {
            (Some(mesh), Some(nostr)) => tokio::select! {
                event = mesh.recv_event() => event.map(|e| (TransportKind::Mesh, e)),
                event = nostr.recv_event() => event.map(|e| (TransportKind::Nostr, e)),
            },
            (Some(mesh), None) => mesh.recv_event().await.map(|e| (TransportKind::Mesh, e)),
            (None, Some(nostr)) => nostr.recv_event().await.map(|e| (TransportKind::Nostr, e)),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;

    #[test]
    fn hybrid_prefers_mesh_when_route_exists() {
        let mut config = CoreConfig::default();
        config.preferred_transport = PreferredTransport::Hybrid;
        let (mesh, _peer) = LoopbackTransport::pair("alice", "bob");
        let coordinator = TransportCoordinator::new(config, Some(Box::new(mesh)), None);

        let mut router = Router::new("alice", false, 30_000, 3);
        router.peer_discovered("bob", 0);
        assert_eq!(coordinator.select_unicast("bob", &router, 0), OutboundPath::Mesh);
    }

    #[test]
    fn hybrid_falls_back_to_nostr_without_mesh_route() {
        let mut config = CoreConfig::default();
        config.preferred_transport = PreferredTransport::Hybrid;
        let (nostr, _peer) = LoopbackTransport::pair("alice", "relay");
        let coordinator = TransportCoordinator::new(config, None, Some(Box::new(nostr)));

        let router = Router::new("alice", false, 30_000, 3);
        assert_eq!(coordinator.select_unicast("bob", &router, 0), OutboundPath::Nostr);
    }

    #[test]
    fn hybrid_broadcast_uses_both_transports() {
        let mut config = CoreConfig::default();
        config.preferred_transport = PreferredTransport::Hybrid;
        let (mesh, _) = LoopbackTransport::pair("alice", "bob");
        let (nostr, _) = LoopbackTransport::pair("alice", "relay");
        let coordinator = TransportCoordinator::new(config, Some(Box::new(mesh)), Some(Box::new(nostr)));
        assert_eq!(coordinator.select_broadcast(), OutboundPath::Both);
    }
}
