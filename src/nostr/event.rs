//! Nostr event construction and verification (NIP-01, spec §4.7).

use crate::clock::Clock;
use crate::codec::nostr_json;
use crate::crypto::{schnorr, sha256, NostrIdentity};
use crate::error::NostrError;
use serde::{Deserialize, Serialize};

/// Event kind integers the engine MUST preserve exactly for interop.
pub mod kind {
    pub const METADATA: u32 = 0;
    pub const TEXT_NOTE: u32 = 1;
    pub const CONTACT_LIST: u32 = 3;
    pub const LEGACY_DM: u32 = 4;
    pub const DELETION: u32 = 5;
    pub const REPOST: u32 = 6;
    pub const REACTION: u32 = 7;
    pub const GIFT_WRAP: u32 = 1059;
    pub const ZAP_REQUEST: u32 = 9734;
    pub const ZAP_RECEIPT: u32 = 9735;
    pub const CUSTOM_APP_MESSAGE: u32 = 30078;
    pub const CUSTOM_LOCATION_CHANNEL: u32 = 30079;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NostrEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl NostrEvent {
    pub fn get_tag_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        self.tags.iter().filter(move |t| t.first().map(|s| s.as_str()) == Some(name)).filter_map(|t| t.get(1)).map(|s| s.as_str())
    }

    pub fn first_tag_value(&self, name: &str) -> Option<&str> {
        self.get_tag_values(name).next()
    }
}

/// Constructs, signs, and returns a new event (spec §4.7 "Event construction").
pub fn new_event(identity: &NostrIdentity, clock: &dyn Clock, kind: u32, content: &str, tags: Vec<Vec<String>>) -> NostrEvent {
    let pubkey = hex::encode(identity.xonly_public_bytes());
    let created_at = clock.unix_seconds();
    let canonical = nostr_json::canonical_bytes(&pubkey, created_at, kind, &tags, content);
    let id_bytes = sha256(&canonical);
    let id = hex::encode(id_bytes);
    let sig_bytes = schnorr::sign_schnorr_secp256k1(&identity.secret, &id_bytes);
    let sig = hex::encode(sig_bytes);
    NostrEvent { id, pubkey, created_at, kind, tags, content: content.to_string(), sig }
}

/// Verifies an event per spec §4.7: hex/length validity, then id
/// recomputation, then Schnorr verification, in that order. All three MUST
/// pass before the event is handed upward.
pub fn verify(event: &NostrEvent) -> Result<(), NostrError> {
    let pubkey_bytes = hex::decode(&event.pubkey).map_err(|_| NostrError::BadEvent("pubkey not hex"))?;
    let id_bytes = hex::decode(&event.id).map_err(|_| NostrError::BadEvent("id not hex"))?;
    let sig_bytes = hex::decode(&event.sig).map_err(|_| NostrError::BadEvent("sig not hex"))?;

    let pubkey: [u8; 32] = pubkey_bytes.try_into().map_err(|_| NostrError::BadEvent("pubkey wrong length"))?;
    let id: [u8; 32] = id_bytes.try_into().map_err(|_| NostrError::BadEvent("id wrong length"))?;
    let sig: [u8; 64] = sig_bytes.try_into().map_err(|_| NostrError::BadEvent("sig wrong length"))?;

    let canonical = nostr_json::canonical_bytes(&event.pubkey, event.created_at, event.kind, &event.tags, &event.content);
    let recomputed = sha256(&canonical);
    if recomputed != id {
        return Err(NostrError::BadEvent("id does not match canonical serialization"));
    }

    if !schnorr::verify_schnorr_secp256k1(&pubkey, &id, &sig) {
        return Err(NostrError::BadEvent("schnorr signature does not verify"));
    }
    Ok(())
}
