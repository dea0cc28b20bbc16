//! Configuration surface recognized by the core (see design spec §6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreferredTransport {
    Mesh,
    Nostr,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub mesh_enabled: bool,
    pub nostr_enabled: bool,
    pub preferred_transport: PreferredTransport,
    /// Initial TTL for originated packets. Clamped to [1, 16].
    pub max_hops: u8,
    pub enable_relaying: bool,
    pub ack_retry_max: u32,
    pub ack_retry_timeout_ms: u64,
    pub relay_publish_rate_per_sec: u32,
    pub dedup_rotation_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            mesh_enabled: true,
            nostr_enabled: true,
            preferred_transport: PreferredTransport::Hybrid,
            max_hops: 7,
            enable_relaying: true,
            ack_retry_max: 3,
            ack_retry_timeout_ms: 30_000,
            relay_publish_rate_per_sec: 60,
            dedup_rotation_ms: 300_000,
        }
    }
}

impl CoreConfig {
    /// Clamp `max_hops` into the documented range, rather than rejecting it.
    pub fn normalized(mut self) -> Self {
        self.max_hops = self.max_hops.clamp(1, 16);
        self
    }
}
