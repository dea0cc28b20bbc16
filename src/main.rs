use clap::Parser;
use pulse_core::core::{Core, CoreEvent};
use pulse_core::identity::InMemorySecretStore;
use pulse_core::routing::MessageType;
use pulse_core::transport::LoopbackTransport;
use pulse_core::{CoreConfig, Error, SystemClock};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Demo binary exercising a two-node Pulse exchange over an in-memory
/// loopback transport. Real mesh radio and relay websocket I/O are out of
/// scope for this core; swap `LoopbackTransport` for a real implementation
/// of the `Transport` trait to run against an actual network.
#[derive(Parser, Debug)]
#[command(name = "pulse-node", about = "Pulse dual-transport messaging demo")]
struct Args {
    #[arg(long, default_value = "alice")]
    handle: String,

    #[arg(long, default_value = "bob")]
    peer_handle: String,

    #[arg(long, default_value = "hello from the mesh")]
    message: String,

    #[arg(long, default_value_t = 5)]
    status_interval_secs: u64,
}

struct PulseNode {
    id: String,
    core: Core<InMemorySecretStore>,
}

impl PulseNode {
    /// Resolves this node's identity without attaching any transport yet —
    /// a transport needs the node's id (the `did:key:...` derived during
    /// bootstrap) to address itself to peers in the same namespace.
    async fn bootstrap(handle: &str) -> Result<Self, Error> {
        let config = CoreConfig::default();
        let core = Core::bootstrap(config, InMemorySecretStore::new(), handle, Box::new(SystemClock)).await?;
        let id = core.id().to_string();
        Ok(Self { id, core })
    }
}

fn handle_core_events(node_id: &str, events: Vec<CoreEvent>) {
    for event in events {
        match event {
            CoreEvent::MessageReceived { sender_id, plaintext, message_type, .. } => {
                let text = String::from_utf8_lossy(&plaintext);
                info!(node = node_id, from = %sender_id, kind = ?message_type, %text, "message received");
            }
            CoreEvent::PeerDiscovered(peer) => {
                info!(node = node_id, peer = %peer.id, "peer discovered");
            }
            CoreEvent::PeerLost(peer_id) => {
                info!(node = node_id, peer = %peer_id, "peer lost");
            }
            CoreEvent::DeliveryFailed(packet_id) => {
                error!(node = node_id, %packet_id, "delivery failed after max retries");
            }
            CoreEvent::NostrEventReceived(event) => {
                info!(node = node_id, event_id = %event.id, kind = event.kind, "nostr event received");
            }
            CoreEvent::PublishFailed { event_id, reason } => {
                error!(node = node_id, %event_id, %reason, "relay rejected event publish");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulse_core=info".parse().unwrap()))
        .init();

    let args = Args::parse();

    let mut alice = PulseNode::bootstrap(&args.handle).await?;
    let mut bob = PulseNode::bootstrap(&args.peer_handle).await?;

    // The loopback transport addresses peers by whatever id it is built
    // with, so it is wired up only now that each node's did:key id is known.
    let (mesh_a, mesh_b) = LoopbackTransport::pair(alice.id.clone(), bob.id.clone());
    alice.core.attach_mesh(Box::new(mesh_a));
    bob.core.attach_mesh(Box::new(mesh_b));
    alice.core.connect().await?;
    bob.core.connect().await?;

    // One cooperative task drives both demo nodes; a real deployment runs
    // one `Core` per process instead (spec §9's single-writer model).
    let bob_x25519_pub = bob.core.mesh_identity().x25519_public;
    let bob_id = bob.id.clone();
    let alice_id = alice.id.clone();

    // Drain the loopback peer-discovery handshake before routing a message.
    if let Some((kind, event)) = alice.core.recv_transport_event().await {
        handle_core_events(&alice.id, alice.core.handle_transport_event(kind, event).await?);
    }
    if let Some((kind, event)) = bob.core.recv_transport_event().await {
        handle_core_events(&bob.id, bob.core.handle_transport_event(kind, event).await?);
    }

    let message_id = alice
        .core
        .send_message(&bob_id, &bob_x25519_pub, args.message.as_bytes(), MessageType::Text, None)
        .await?;
    info!(node = %alice_id, %message_id, "message sent");

    let mut tick_interval = tokio::time::interval(std::time::Duration::from_secs(1));
    let mut status_interval = tokio::time::interval(std::time::Duration::from_secs(args.status_interval_secs));

    loop {
        tokio::select! {
            maybe_event = alice.core.recv_transport_event() => {
                match maybe_event {
                    Some((kind, event)) => match alice.core.handle_transport_event(kind, event).await {
                        Ok(events) => handle_core_events(&alice.id, events),
                        Err(e) => error!(node = %alice.id, error = %e, "failed to process transport event"),
                    },
                    None => info!(node = %alice.id, "transport closed"),
                }
            }
            maybe_event = bob.core.recv_transport_event() => {
                match maybe_event {
                    Some((kind, event)) => match bob.core.handle_transport_event(kind, event).await {
                        Ok(events) => handle_core_events(&bob.id, events),
                        Err(e) => error!(node = %bob.id, error = %e, "failed to process transport event"),
                    },
                    None => info!(node = %bob.id, "transport closed"),
                }
            }
            _ = tick_interval.tick() => {
                handle_core_events(&alice.id, alice.core.tick().await);
                handle_core_events(&bob.id, bob.core.tick().await);
            }
            _ = status_interval.tick() => {
                info!(
                    alice_peers = alice.core.topology().node_count(),
                    bob_peers = bob.core.topology().node_count(),
                    "status"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down...");
                break;
            }
        }
    }

    Ok(())
}
