pub mod clock;
pub mod codec;
pub mod config;
pub mod core;
pub mod crypto;
pub mod dedup;
pub mod error;
pub mod geohash_channels;
pub mod identity;
pub mod nostr;
pub mod routing;
pub mod topology;
pub mod transport;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{CoreConfig, PreferredTransport};
pub use core::{Core, CoreEvent, ZapResult};
pub use error::Error;
pub use identity::{derive_did, IdentityStore, InMemorySecretStore, SecretStore};
pub use routing::{MessageEnvelope, MessageType, PacketType, RoutablePacket};
pub use transport::{LoopbackTransport, PeerInfo, Transport, TransportEvent, TransportKind};
