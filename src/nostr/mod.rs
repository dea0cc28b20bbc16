//! Nostr event construction/verification, relay session state machine,
//! subscription registry, and the NIP-57 zap pipeline (spec §4.7).

pub mod event;
pub mod relay;
pub mod subscription;
pub mod zap;

pub use event::{kind, new_event, verify, NostrEvent};
pub use relay::{ClientFrame, Filter, RelayFrame, RelaySession, RelayState, parse_incoming};
pub use subscription::SubscriptionRegistry;
