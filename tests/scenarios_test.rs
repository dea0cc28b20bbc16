//! End-to-end scenarios driven through the public `Core` API, over an
//! in-memory `LoopbackTransport` pair and a deterministic `FakeClock`.

use pulse_core::nostr::event::{new_event, kind};
use pulse_core::{
    Core, CoreConfig, CoreEvent, FakeClock, InMemorySecretStore, LoopbackTransport, MessageType,
    TransportKind,
};
use pulse_core::crypto::NostrIdentity;

async fn bootstrap_pair() -> (Core<InMemorySecretStore>, Core<InMemorySecretStore>) {
    let mut alice = Core::bootstrap(
        CoreConfig::default(),
        InMemorySecretStore::new(),
        "alice",
        Box::new(FakeClock::new(1_700_000_000)),
    )
    .await
    .unwrap();
    let mut bob = Core::bootstrap(
        CoreConfig::default(),
        InMemorySecretStore::new(),
        "bob",
        Box::new(FakeClock::new(1_700_000_000)),
    )
    .await
    .unwrap();

    // The loopback transport addresses peers by whatever id it is built
    // with; it must share the router's did:key namespace, so it is wired up
    // only now that each side's identity (and therefore its id) is known.
    let (mesh_a, mesh_b) = LoopbackTransport::pair(alice.id().to_string(), bob.id().to_string());
    alice.attach_mesh(Box::new(mesh_a));
    bob.attach_mesh(Box::new(mesh_b));

    alice.connect().await.unwrap();
    bob.connect().await.unwrap();

    // Drain the loopback peer-discovery handshake each side emits on connect.
    let (kind_a, event_a) = alice.recv_transport_event().await.unwrap();
    alice.handle_transport_event(kind_a, event_a).await.unwrap();
    let (kind_b, event_b) = bob.recv_transport_event().await.unwrap();
    bob.handle_transport_event(kind_b, event_b).await.unwrap();

    (alice, bob)
}

#[tokio::test]
async fn direct_mesh_delivery_round_trip_through_core() {
    let (mut alice, mut bob) = bootstrap_pair().await;
    let bob_x25519_pub = bob.mesh_identity().x25519_public;

    alice
        .send_message(bob.id(), &bob_x25519_pub, b"hello from the mesh", MessageType::Text, None)
        .await
        .unwrap();
    assert_eq!(alice.pending_ack_count(), 1);

    // Bob receives the packet and immediately emits an ack back to alice.
    let (kind, event) = bob.recv_transport_event().await.unwrap();
    let bob_events = bob.handle_transport_event(kind, event).await.unwrap();
    assert_eq!(bob_events.len(), 1);
    match &bob_events[0] {
        CoreEvent::MessageReceived { sender_id, plaintext, message_type, .. } => {
            assert_eq!(sender_id, alice.id());
            assert_eq!(plaintext, b"hello from the mesh");
            assert_eq!(*message_type, MessageType::Text);
        }
        other => panic!("expected MessageReceived, got {other:?}"),
    }

    // Alice receives the ack and the pending entry clears.
    let (kind, event) = alice.recv_transport_event().await.unwrap();
    let alice_events = alice.handle_transport_event(kind, event).await.unwrap();
    assert!(alice_events.is_empty());
    assert_eq!(alice.pending_ack_count(), 0);
}

#[tokio::test]
async fn duplicate_packet_across_transports_delivers_once() {
    let (mut alice, mut bob) = bootstrap_pair().await;
    let bob_x25519_pub = bob.mesh_identity().x25519_public;

    alice
        .send_message(bob.id(), &bob_x25519_pub, b"only once please", MessageType::Text, None)
        .await
        .unwrap();

    let (_, event) = bob.recv_transport_event().await.unwrap();
    let packet = match event {
        pulse_core::TransportEvent::Packet(p) => p,
        other => panic!("expected a Packet event, got {other:?}"),
    };

    let first = bob.handle_transport_event(TransportKind::Mesh, pulse_core::TransportEvent::Packet(packet.clone())).await.unwrap();
    assert_eq!(first.len(), 1);
    assert!(matches!(first[0], CoreEvent::MessageReceived { .. }));

    // The identical packet replayed as if arriving over the Nostr transport
    // is still keyed by (sender, packet_id, origin_timestamp floor), so the
    // dedup filter drops it regardless of which transport carried it.
    let second = bob.handle_transport_event(TransportKind::Nostr, pulse_core::TransportEvent::Packet(packet)).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn tampered_relay_event_dropped_without_marking_relay_faulty() {
    let (mut alice, _bob) = bootstrap_pair().await;
    let clock = FakeClock::new(1_700_000_000);
    let identity = NostrIdentity::generate();
    let mut event = new_event(&identity, &clock, kind::TEXT_NOTE, "gm mesh", vec![]);

    // Flip a hex nibble in the signature so it no longer verifies against
    // the (unchanged) event id.
    let mut sig_bytes = event.sig.into_bytes();
    let last = sig_bytes.len() - 1;
    sig_bytes[last] = if sig_bytes[last] == b'0' { b'1' } else { b'0' };
    event.sig = String::from_utf8(sig_bytes).unwrap();

    let frame = serde_json::json!(["EVENT", "sub1", event]).to_string();
    let out = alice.handle_relay_message("wss://relay.example", &frame);
    assert!(out.is_empty(), "a tampered event must never surface as NostrEventReceived");
}

#[tokio::test]
async fn relay_publish_rejection_surfaces_as_publish_failed() {
    let (mut alice, _bob) = bootstrap_pair().await;
    let frame = serde_json::json!(["OK", "deadbeef", false, "rate-limited"]).to_string();
    let events = alice.handle_relay_message("wss://relay.example", &frame);
    assert_eq!(events.len(), 1);
    match &events[0] {
        CoreEvent::PublishFailed { event_id, reason } => {
            assert_eq!(event_id, "deadbeef");
            assert_eq!(reason, "rate-limited");
        }
        other => panic!("expected PublishFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn relay_eose_and_auth_frames_are_acknowledged_with_no_events() {
    let (mut alice, _bob) = bootstrap_pair().await;
    let eose = serde_json::json!(["EOSE", "sub1"]).to_string();
    assert!(alice.handle_relay_message("wss://relay.example", &eose).is_empty());

    let auth = serde_json::json!(["AUTH", "challenge-string"]).to_string();
    assert!(alice.handle_relay_message("wss://relay.example", &auth).is_empty());
}
