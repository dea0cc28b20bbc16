//! The core: wires identity, routing, transport, the Nostr engine, geohash
//! channels, and topology tracking into one cooperatively-scheduled value
//! (spec §9: "hoist ownership into one `Core` value" rather than letting
//! components hold live back-references to each other).

use crate::clock::Clock;
use crate::codec::bolt11;
use crate::config::CoreConfig;
use crate::crypto::{self, MeshIdentity, NostrIdentity};
use crate::error::{CodecError, CryptoError, Error, ZapError};
use crate::geohash_channels::ChannelManager;
use crate::identity::{derive_did, IdentityStore, SecretStore};
use crate::nostr::event::NostrEvent;
use crate::nostr::relay::{parse_incoming, ClientFrame, RelayFrame, RelaySession};
use crate::nostr::subscription::SubscriptionRegistry;
use crate::nostr::zap;
use crate::routing::{MessageEnvelope, MessageType, PacketType, RoutablePacket, Router, RouterOutcome, TickOutcome};
use crate::topology::{self, TopologyTracker};
use crate::transport::{PeerInfo, Transport, TransportCoordinator, TransportEvent, TransportKind};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Upward-facing events the host application consumes after each
/// `handle_transport_event`/`tick` call.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    MessageReceived { sender_id: String, plaintext: Vec<u8>, message_type: MessageType, language: Option<String> },
    PeerDiscovered(PeerInfo),
    PeerLost(String),
    DeliveryFailed(String),
    NostrEventReceived(NostrEvent),
    PublishFailed { event_id: String, reason: String },
}

/// Result of a completed zap pipeline run (spec §4.7): the signed zap
/// request, the resolved invoice string, and the wallet URIs the host
/// application should offer the user, in preference order. The core never
/// takes custody of funds — paying the invoice is the host's job.
#[derive(Debug, Clone)]
pub struct ZapResult {
    pub zap_request: NostrEvent,
    pub invoice: String,
    pub wallet_uris: Vec<String>,
}

/// Ties every leaf component together. Single-writer: every method that
/// mutates state takes `&mut self`, so a host application drives this from
/// one cooperative task instead of sharing it across threads.
pub struct Core<S: SecretStore> {
    config: CoreConfig,
    clock: Box<dyn Clock>,
    id: String,
    handle: String,
    mesh_identity: MeshIdentity,
    nostr_identity: NostrIdentity,
    identity_store: IdentityStore<S>,
    router: Router,
    coordinator: TransportCoordinator,
    topology: TopologyTracker,
    channels: ChannelManager,
    subscriptions: SubscriptionRegistry,
    relays: HashMap<String, RelaySession>,
    http_client: reqwest::Client,
    last_dedup_rotation_ms: u64,
    last_topology_reap_secs: u64,
}

impl<S: SecretStore> Core<S> {
    /// Loads the persisted mesh and Nostr identities, creating fresh ones
    /// under `handle` if none exist yet, and wires up the router and
    /// transport coordinator. No transport is attached yet — a concrete
    /// `Transport` implementation (e.g. a mesh radio stack) needs this
    /// node's id (`self.id()`, the `did:key:...` derived below) to address
    /// itself to peers, so transports can only be constructed once
    /// bootstrap has resolved the identity. Call `attach_mesh`/
    /// `attach_nostr` with the resulting id, then `connect()`.
    pub async fn bootstrap(config: CoreConfig, secrets: S, handle: &str, clock: Box<dyn Clock>) -> Result<Self, Error> {
        let config = config.normalized();
        let identity_store = IdentityStore::new(secrets);

        let mesh_identity = match identity_store.load().await? {
            Some(loaded) => loaded.identity,
            None => identity_store.create_or_fail(handle).await?,
        };
        let nostr_identity = match identity_store.load_nostr().await? {
            Some(identity) => identity,
            None => identity_store.create_nostr_or_fail().await?,
        };

        let id = derive_did(&mesh_identity.ed25519_public_bytes());
        let router = Router::new(id.clone(), config.enable_relaying, config.ack_retry_timeout_ms, config.ack_retry_max);
        let coordinator = TransportCoordinator::new(config.clone(), None, None);
        let last_dedup_rotation_ms = clock.monotonic_millis();
        let last_topology_reap_secs = clock.unix_seconds();

        info!(id = %id, handle, "pulse core bootstrapped");

        Ok(Self {
            config,
            clock,
            id,
            handle: handle.to_string(),
            mesh_identity,
            nostr_identity,
            identity_store,
            router,
            coordinator,
            topology: TopologyTracker::new(),
            channels: ChannelManager::new(),
            subscriptions: SubscriptionRegistry::new(),
            relays: HashMap::new(),
            http_client: reqwest::Client::new(),
            last_dedup_rotation_ms,
            last_topology_reap_secs,
        })
    }

    /// Attaches the mesh transport. Must be constructed with this node's
    /// `id()` as its own address — a peer discovered over this transport is
    /// addressed by whatever id the transport announces, and `send_message`
    /// addresses recipients by their `did:key:...` id, so the two must share
    /// one namespace (see spec §4.6, §3 "Discovered peer").
    pub fn attach_mesh(&mut self, transport: Box<dyn Transport>) {
        self.coordinator.set_mesh(transport);
    }

    /// Attaches the Nostr transport, addressed by Nostr public key per spec §4.6.
    pub fn attach_nostr(&mut self, transport: Box<dyn Transport>) {
        self.coordinator.set_nostr(transport);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn mesh_identity(&self) -> &MeshIdentity {
        &self.mesh_identity
    }

    pub fn nostr_identity(&self) -> &NostrIdentity {
        &self.nostr_identity
    }

    pub fn topology(&self) -> &TopologyTracker {
        &self.topology
    }

    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    /// Erases both identities from the secret store. Callers must re-bootstrap
    /// (which generates fresh ones) before using this core again.
    pub async fn forget_identity(&self) -> Result<bool, Error> {
        self.identity_store.delete().await.map_err(Error::from)
    }

    /// Connects every enabled transport.
    pub async fn connect(&mut self) -> Result<(), Error> {
        self.coordinator.connect_all().await.map_err(Error::from)
    }

    /// Awaits the next event from whichever transport produces one first.
    /// Pair this with `tick()` in a `tokio::select!` driving loop.
    pub async fn recv_transport_event(&mut self) -> Option<(TransportKind, TransportEvent)> {
        self.coordinator.recv_event().await
    }

    /// Registers a relay URL the coordinator mirrors subscriptions across.
    /// Driving the underlying websocket is the host application's job —
    /// real relay I/O is out of scope for this core (spec §1); this only
    /// tracks the session's state machine and outgoing rate limiter.
    pub fn add_relay(&mut self, url: impl Into<String>) {
        let url = url.into();
        self.relays.entry(url.clone()).or_insert_with(|| RelaySession::new(url));
    }

    /// Marks a relay session `Open` and returns the `REQ` frames for every
    /// active subscription, to reissue them on (re)connect.
    pub fn relay_opened(&mut self, url: &str) -> Vec<ClientFrame> {
        if let Some(session) = self.relays.get_mut(url) {
            session.mark_open();
        }
        self.subscriptions.reissue_frames()
    }

    /// Records a relay drop. Reconnecting with backoff is the host's job
    /// (spec §7: "reconnect for relay drops with exponential backoff
    /// starting at 1s, capped at 60s").
    pub fn relay_closed(&mut self, url: &str) {
        if let Some(session) = self.relays.get_mut(url) {
            session.mark_error();
        }
        warn!(relay = url, "relay session dropped, reconnect with backoff");
    }

    /// Parses one framed message read off `url`'s websocket and dispatches it
    /// (spec §4.7 "Relay session"). `EVENT` frames run full verification
    /// before being handed upward — a failing event is dropped silently and
    /// does NOT mark the relay faulty, since the fault is in the event, not
    /// the connection. `OK false` surfaces as a publish failure; `EOSE` and
    /// `AUTH` are acknowledged with no further action (authentication
    /// response is out of core scope).
    pub fn handle_relay_message(&mut self, url: &str, text: &str) -> Vec<CoreEvent> {
        let frame = match parse_incoming(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(relay = url, error = %e, "malformed relay frame, dropping");
                return Vec::new();
            }
        };

        match frame {
            RelayFrame::Event { event, .. } => match crate::nostr::event::verify(&event) {
                Ok(()) => vec![CoreEvent::NostrEventReceived(event)],
                Err(e) => {
                    warn!(relay = url, error = %e, "event failed verification, dropping");
                    Vec::new()
                }
            },
            RelayFrame::Ok { event_id, accepted, message } => {
                if accepted {
                    Vec::new()
                } else {
                    warn!(relay = url, %event_id, reason = %message, "relay rejected publish");
                    vec![CoreEvent::PublishFailed { event_id, reason: message }]
                }
            }
            RelayFrame::Eose { .. } | RelayFrame::Notice(_) | RelayFrame::Auth(_) => Vec::new(),
        }
    }

    /// Number of packets still awaiting acknowledgement.
    pub fn pending_ack_count(&self) -> usize {
        self.router.pending_ack_count()
    }

    /// Encrypts, signs, and originates a message addressed to `recipient_id`,
    /// then hands it to the transport coordinator. Returns the originated
    /// message id.
    pub async fn send_message(
        &mut self,
        recipient_id: &str,
        recipient_x25519_pub: &[u8; 32],
        plaintext: &[u8],
        message_type: MessageType,
        language: Option<String>,
    ) -> Result<String, Error> {
        let ciphertext_bytes = crypto::encrypt_for(plaintext, recipient_x25519_pub).map_err(Error::from)?;
        let now_secs = self.clock.unix_seconds();
        let now_ms = self.clock.monotonic_millis();

        let mut envelope = MessageEnvelope {
            message_id: Uuid::new_v4().to_string(),
            sender_id: self.id.clone(),
            recipient_id: recipient_id.to_string(),
            ciphertext: BASE64_STANDARD.encode(ciphertext_bytes),
            timestamp: now_secs,
            message_type,
            language,
            signature: None,
            sender_pubkey: self.mesh_identity.ed25519_public_bytes(),
        };
        envelope.signature = Some(self.mesh_identity.sign(&envelope.signing_bytes()));
        let message_id = envelope.message_id.clone();

        let payload = bincode::serialize(&envelope).map_err(|e| Error::Codec(CodecError::Envelope(e.to_string())))?;
        let packet = self.router.originate(recipient_id, payload, self.config.max_hops, now_secs, now_ms);

        self.coordinator.send_unicast(packet, recipient_id, &self.router, now_secs).await.map_err(Error::from)?;
        Ok(message_id)
    }

    /// Originates and broadcasts a non-message packet (peer-announce,
    /// route-request, …) to every reachable peer.
    pub async fn broadcast_packet(&mut self, packet_type: PacketType, payload: Vec<u8>) -> Result<(), Error> {
        let now_secs = self.clock.unix_seconds();
        let packet = RoutablePacket::originate(&self.id, None, payload, packet_type, self.config.max_hops, now_secs);
        self.coordinator.broadcast(packet).await.map_err(Error::from)
    }

    /// Processes one event from a transport: updates topology/routing state
    /// and returns whatever the host application should act on.
    pub async fn handle_transport_event(&mut self, transport_kind: TransportKind, event: TransportEvent) -> Result<Vec<CoreEvent>, Error> {
        let now_secs = self.clock.unix_seconds();
        let mut out = Vec::new();

        match event {
            TransportEvent::PeerDiscovered(peer) => {
                self.router.peer_discovered(&peer.id, now_secs);
                self.topology.observe_peer(&self.id, &peer, now_secs);
                out.push(CoreEvent::PeerDiscovered(peer));
            }
            TransportEvent::PeerLost(peer_id) => {
                self.router.peer_lost(&peer_id);
                out.push(CoreEvent::PeerLost(peer_id));
            }
            TransportEvent::Packet(packet) => {
                self.topology.observe_hop_path(&packet.hop_path, now_secs);
                self.handle_packet(transport_kind, packet, now_secs, &mut out).await?;
            }
        }
        Ok(out)
    }

    async fn handle_packet(
        &mut self,
        transport_kind: TransportKind,
        packet: RoutablePacket,
        now_secs: u64,
        out: &mut Vec<CoreEvent>,
    ) -> Result<(), Error> {
        match self.router.handle_incoming(packet, now_secs) {
            RouterOutcome::Dropped(reason) => {
                debug!(reason, transport = ?transport_kind, "packet dropped");
            }
            RouterOutcome::Delivered(packet) => {
                if packet.packet_type == PacketType::Message {
                    self.deliver_message(packet, now_secs, out).await?;
                }
            }
            RouterOutcome::Forwarded { packet, to } => {
                for next_hop in to {
                    let _ = self.coordinator.send_unicast(packet.clone(), &next_hop, &self.router, now_secs).await;
                }
            }
            RouterOutcome::Broadcasted(packet) => {
                let _ = self.coordinator.broadcast(packet).await;
            }
        }
        Ok(())
    }

    async fn deliver_message(&mut self, packet: RoutablePacket, now_secs: u64, out: &mut Vec<CoreEvent>) -> Result<(), Error> {
        let envelope: MessageEnvelope =
            bincode::deserialize(&packet.payload).map_err(|e| Error::Codec(CodecError::Envelope(e.to_string())))?;
        if envelope.recipient_id != self.id {
            return Err(Error::Codec(CodecError::Envelope("envelope addressed to a different recipient".into())));
        }
        if !envelope.verify_signature() {
            warn!(sender = %envelope.sender_id, "envelope signature failed, dropping");
            return Err(Error::Crypto(CryptoError::InvalidSignature));
        }
        let ciphertext =
            BASE64_STANDARD.decode(&envelope.ciphertext).map_err(|e| Error::Codec(CodecError::Envelope(e.to_string())))?;
        let plaintext = crypto::decrypt_with(&self.mesh_identity.x25519_private_bytes(), &ciphertext).map_err(Error::from)?;

        let ack = self.router.build_ack(&packet.packet_id, &envelope.sender_id, now_secs);
        let _ = self.coordinator.send_unicast(ack, &envelope.sender_id, &self.router, now_secs).await;

        out.push(CoreEvent::MessageReceived {
            sender_id: envelope.sender_id,
            plaintext,
            message_type: envelope.message_type,
            language: envelope.language,
        });
        Ok(())
    }

    /// Drives ack retries/failures, dedup rotation, and staleness reaping.
    /// Intended to run on a short interval (spec §4.5/§4.9's ack tick).
    pub async fn tick(&mut self) -> Vec<CoreEvent> {
        let now_ms = self.clock.monotonic_millis();
        let now_secs = self.clock.unix_seconds();
        let mut out = Vec::new();

        for outcome in self.router.tick_acks(now_ms) {
            match outcome {
                TickOutcome::ReEmit(packet) => {
                    warn!(packet_id = %packet.packet_id, "retrying unacknowledged packet");
                    if let Some(recipient) = packet.recipient_id.clone() {
                        let _ = self.coordinator.send_unicast(packet, &recipient, &self.router, now_secs).await;
                    }
                }
                TickOutcome::DeliveryFailed(packet_id) => {
                    warn!(packet_id, "delivery failed after max retries");
                    out.push(CoreEvent::DeliveryFailed(packet_id));
                }
            }
        }

        if now_ms.saturating_sub(self.last_dedup_rotation_ms) >= self.config.dedup_rotation_ms {
            self.router.rotate_dedup();
            self.last_dedup_rotation_ms = now_ms;
        }
        self.router.reap_stale_routes(now_secs);
        if now_secs.saturating_sub(self.last_topology_reap_secs) >= topology::STALE_AFTER_SECS {
            self.topology.reap_stale(now_secs);
            self.last_topology_reap_secs = now_secs;
        }
        out
    }

    /// Updates the local position, recomputing the geohash at every tracked
    /// precision (spec §4.8).
    pub fn set_location(&mut self, lat: f64, lon: f64) -> Result<(), Error> {
        self.channels.set_location(lat, lon).map_err(Error::from)
    }

    /// Joins a geohash location channel and returns the `REQ` frames to send
    /// to every relay currently `Open` (spec §4.7/§4.8's subscription
    /// mirroring). The subscription id is embedded in the returned frames.
    pub fn join_channel(&mut self, channel_id: &str) -> Vec<ClientFrame> {
        let now_secs = self.clock.unix_seconds();
        let request = self.channels.join(channel_id, now_secs);
        let sub_id = self.subscriptions.subscribe(request.filter.clone());
        self.relays
            .values()
            .filter(|session| session.is_open())
            .map(|_| ClientFrame::Req { sub_id: sub_id.clone(), filter: request.filter.clone() })
            .collect()
    }

    /// Leaves a channel, returning the `CLOSE` frames for every relay still
    /// holding its subscription.
    pub fn leave_channel(&mut self, channel_id: &str, sub_id: &str) -> Vec<ClientFrame> {
        self.channels.leave(channel_id);
        self.subscriptions.unsubscribe(sub_id);
        self.relays
            .values()
            .filter(|session| session.is_open())
            .map(|_| ClientFrame::Close { sub_id: sub_id.to_string() })
            .collect()
    }

    /// Queues a Nostr event for publishing to every `Open` relay, respecting
    /// each relay's outgoing rate limit (spec §4.7). Relays still inside
    /// their rate-limit window get the frame queued instead of returned here
    /// — see `drain_relay_queues`.
    pub fn publish(&mut self, event: NostrEvent) -> Vec<(String, ClientFrame)> {
        let now_ms = self.clock.monotonic_millis();
        let limit = self.config.relay_publish_rate_per_sec;
        self.relays
            .iter_mut()
            .filter(|(_, session)| session.is_open())
            .filter_map(|(url, session)| {
                session.submit(ClientFrame::Event(event.clone()), now_ms, limit).map(|frame| (url.clone(), frame))
            })
            .collect()
    }

    /// Pulls any frames that have cleared a relay's rate-limit window since
    /// the last call — run this alongside `tick`.
    pub fn drain_relay_queues(&mut self) -> Vec<(String, ClientFrame)> {
        let now_ms = self.clock.monotonic_millis();
        let limit = self.config.relay_publish_rate_per_sec;
        self.relays
            .iter_mut()
            .flat_map(|(url, session)| session.drain_ready(now_ms, limit).into_iter().map(move |frame| (url.clone(), frame)))
            .collect()
    }

    /// Constructs and signs a Nostr event using this device's Nostr identity.
    pub fn new_nostr_event(&self, kind_id: u32, content: &str, tags: Vec<Vec<String>>) -> NostrEvent {
        crate::nostr::event::new_event(&self.nostr_identity, self.clock.as_ref(), kind_id, content, tags)
    }

    /// Runs the full NIP-57 zap pipeline (spec §4.7, steps 1-7): resolves the
    /// Lightning address, validates the LNURL-pay endpoint, builds and signs
    /// a zap-request event, fetches the invoice, and verifies the three-way
    /// amount match and description-hash binding. Returns the invoice and
    /// candidate wallet URIs for the host application to hand to an external
    /// wallet — this core never takes custody of funds.
    pub async fn send_zap(
        &self,
        lightning_address: &str,
        amount_msats: u64,
        relays: &[String],
        comment: Option<&str>,
        event_id: Option<&str>,
    ) -> Result<ZapResult, Error> {
        let (local, domain) = zap::validate_lightning_address(lightning_address).map_err(Error::from)?;
        let lnurl = zap::resolve_lnurl_endpoint(&self.http_client, &local, &domain).await.map_err(Error::from)?;
        lnurl.validate(amount_msats).map_err(Error::from)?;

        let recipient_pubkey = lnurl.nostr_pubkey.clone().ok_or(Error::Zap(ZapError::NoWallet))?;
        let zap_request =
            zap::build_zap_request(&self.nostr_identity, self.clock.as_ref(), &recipient_pubkey, amount_msats, relays, comment, event_id);

        let callback_url = zap::callback_url(&lnurl.callback, &zap_request, amount_msats).map_err(Error::from)?;
        let invoice_str = zap::fetch_invoice(&self.http_client, &callback_url).await.map_err(Error::from)?;
        let invoice = bolt11::parse(&invoice_str).map_err(Error::from)?;
        bolt11::validate(&invoice).map_err(Error::from)?;
        zap::three_way_amount_check(amount_msats, &zap_request, &invoice).map_err(Error::from)?;
        zap::description_hash_check(&invoice, &zap_request).map_err(Error::from)?;

        Ok(ZapResult { wallet_uris: zap::candidate_wallet_uris(&invoice_str), zap_request, invoice: invoice_str })
    }

    /// Validates an incoming kind-9735 zap receipt (spec §4.7).
    pub fn validate_zap_receipt(&self, receipt: &NostrEvent) -> Result<(), Error> {
        zap::validate_zap_receipt(receipt).map_err(Error::from)
    }
}
