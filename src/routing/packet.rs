//! Wire-level packet and envelope shapes (spec §3: "Routable packet",
//! "Message envelope").

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `serde`'s derive only covers fixed-size arrays up to length 32; these two
/// structs carry 64-byte Ed25519 signatures, so both `signature` fields below
/// route through this helper (built on `serde_big_array::BigArray`) instead.
mod optional_big_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_big_array::BigArray;

    pub fn serialize<S>(value: &Option<[u8; 64]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct Wrapper<'a>(#[serde(with = "BigArray")] &'a [u8; 64]);
        value.as_ref().map(Wrapper).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 64]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(with = "BigArray")] [u8; 64]);
        let wrapped = Option::<Wrapper>::deserialize(deserializer)?;
        Ok(wrapped.map(|Wrapper(bytes)| bytes))
    }
}

/// Discriminates a `RoutablePacket`'s payload semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketType {
    Message,
    MessageAck,
    ReadReceipt,
    PeerAnnounce,
    PeerQuery,
    RouteRequest,
    RouteReply,
}

/// Application-level message kind carried inside a `MessageEnvelope`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Text,
    Code,
    Voice,
    Image,
}

/// The end-to-end-encrypted payload exchanged between two identities.
/// `ciphertext` is the base64 string of `crypto::encrypt_for`'s output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub ciphertext: String,
    pub timestamp: u64,
    pub message_type: MessageType,
    pub language: Option<String>,
    #[serde(with = "optional_big_array")]
    pub signature: Option<[u8; 64]>,
    pub sender_pubkey: [u8; 32],
}

impl MessageEnvelope {
    /// Invariant: ciphertext is never empty (spec §3).
    pub fn is_well_formed(&self) -> bool {
        !self.ciphertext.is_empty()
    }

    /// Bytes the optional envelope signature is computed over: every field
    /// but the signature itself, in declaration order. Spec §3 says only
    /// "a signature over the envelope" without pinning an exact byte
    /// layout, so this concatenation is this core's chosen wire meaning
    /// (see DESIGN.md).
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.message_id.len() + self.sender_id.len() + self.recipient_id.len() + self.ciphertext.len() + 8,
        );
        out.extend_from_slice(self.message_id.as_bytes());
        out.extend_from_slice(self.sender_id.as_bytes());
        out.extend_from_slice(self.recipient_id.as_bytes());
        out.extend_from_slice(self.ciphertext.as_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out
    }

    /// Verifies the attached signature against `sender_pubkey`, if present.
    /// Spec §3: "signature, if present, must verify against the attached
    /// public key" — absence of a signature is not itself an error.
    pub fn verify_signature(&self) -> bool {
        match self.signature {
            Some(sig) => crate::crypto::verify_ed25519(&self.sender_pubkey, &self.signing_bytes(), &sig),
            None => true,
        }
    }
}

/// The in-flight routing unit: wraps an application payload plus routing
/// metadata. `ttl` strictly decreases along the path; `hop_path` records the
/// identifiers a packet has traversed, starting with the sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutablePacket {
    pub packet_id: String,
    pub sender_id: String,
    pub recipient_id: Option<String>,
    pub payload: Vec<u8>,
    pub packet_type: PacketType,
    pub ttl: u8,
    pub timestamp: u64,
    pub origin_timestamp: u64,
    pub hop_path: Vec<String>,
    #[serde(with = "optional_big_array")]
    pub signature: Option<[u8; 64]>,
}

impl RoutablePacket {
    /// Builds a freshly-originated packet: fresh packet id, TTL and
    /// hop-path seeded per spec §4.5 ("Outbound").
    pub fn originate(
        sender_id: &str,
        recipient_id: Option<&str>,
        payload: Vec<u8>,
        packet_type: PacketType,
        ttl: u8,
        now: u64,
    ) -> Self {
        Self {
            packet_id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.map(str::to_string),
            payload,
            packet_type,
            ttl,
            timestamp: now,
            origin_timestamp: now,
            hop_path: vec![sender_id.to_string()],
            signature: None,
        }
    }

    /// Whether this node's id already appears in the hop path (loop guard).
    pub fn contains_hop(&self, node_id: &str) -> bool {
        self.hop_path.iter().any(|h| h == node_id)
    }

    /// Returns a forwarded copy with `ttl - 1` and this node appended to the
    /// hop path, or `None` if the TTL is already exhausted.
    pub fn forwarded(&self, forwarding_node: &str) -> Option<Self> {
        if self.ttl == 0 {
            return None;
        }
        let mut hop_path = self.hop_path.clone();
        hop_path.push(forwarding_node.to_string());
        Some(Self { ttl: self.ttl - 1, hop_path, ..self.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn originate_seeds_hop_path_with_sender() {
        let packet = RoutablePacket::originate("alice", Some("bob"), vec![1, 2, 3], PacketType::Message, 7, 1000);
        assert_eq!(packet.hop_path, vec!["alice".to_string()]);
        assert_eq!(packet.ttl, 7);
    }

    #[test]
    fn forwarded_decrements_ttl_and_appends_hop() {
        let packet = RoutablePacket::originate("alice", None, vec![], PacketType::Message, 2, 1000);
        let forwarded = packet.forwarded("carol").unwrap();
        assert_eq!(forwarded.ttl, 1);
        assert_eq!(forwarded.hop_path, vec!["alice".to_string(), "carol".to_string()]);
    }

    #[test]
    fn forwarded_at_zero_ttl_returns_none() {
        let packet = RoutablePacket::originate("alice", None, vec![], PacketType::Message, 0, 1000);
        assert!(packet.forwarded("carol").is_none());
    }

    #[test]
    fn envelope_with_no_signature_verifies() {
        let envelope = MessageEnvelope {
            message_id: "m1".into(),
            sender_id: "alice".into(),
            recipient_id: "bob".into(),
            ciphertext: "Y2lwaGVy".into(),
            timestamp: 1000,
            message_type: MessageType::Text,
            language: None,
            signature: None,
            sender_pubkey: [0u8; 32],
        };
        assert!(envelope.verify_signature());
    }

    #[test]
    fn envelope_signature_round_trips_and_rejects_tampering() {
        let identity = crate::crypto::MeshIdentity::generate().unwrap();
        let mut envelope = MessageEnvelope {
            message_id: "m1".into(),
            sender_id: "alice".into(),
            recipient_id: "bob".into(),
            ciphertext: "Y2lwaGVy".into(),
            timestamp: 1000,
            message_type: MessageType::Text,
            language: None,
            signature: None,
            sender_pubkey: identity.ed25519_public_bytes(),
        };
        envelope.signature = Some(identity.sign(&envelope.signing_bytes()));
        assert!(envelope.verify_signature());

        envelope.ciphertext = "dGFtcGVyZWQ".into();
        assert!(!envelope.verify_signature());
    }

    #[test]
    fn envelope_with_signature_round_trips_through_bincode() {
        let identity = crate::crypto::MeshIdentity::generate().unwrap();
        let mut envelope = MessageEnvelope {
            message_id: "m1".into(),
            sender_id: "alice".into(),
            recipient_id: "bob".into(),
            ciphertext: "Y2lwaGVy".into(),
            timestamp: 1000,
            message_type: MessageType::Text,
            language: None,
            signature: None,
            sender_pubkey: identity.ed25519_public_bytes(),
        };
        envelope.signature = Some(identity.sign(&envelope.signing_bytes()));

        let bytes = bincode::serialize(&envelope).unwrap();
        let decoded: MessageEnvelope = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.signature, envelope.signature);
        assert!(decoded.verify_signature());
    }

    #[test]
    fn packet_with_signature_round_trips_through_bincode() {
        let mut packet = RoutablePacket::originate("alice", Some("bob"), vec![1, 2, 3], PacketType::Message, 7, 1000);
        packet.signature = Some([7u8; 64]);

        let bytes = bincode::serialize(&packet).unwrap();
        let decoded: RoutablePacket = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.signature, packet.signature);
    }
}
