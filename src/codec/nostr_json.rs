//! Canonical Nostr event serialization (NIP-01): the UTF-8 encoding of the
//! JSON array `[0, pubkey, created_at, kind, tags, content]`, no insignificant
//! whitespace, integers without a decimal point, minimum string escaping.
//! Any divergence here breaks cross-client event-id compatibility.

use crate::error::CodecError;
use serde_json::Value;

/// Produces the canonical byte string for event-id hashing.
pub fn canonical_bytes(
    pubkey_hex: &str,
    created_at: u64,
    kind: u32,
    tags: &[Vec<String>],
    content: &str,
) -> Vec<u8> {
    let tags_value: Vec<Value> = tags
        .iter()
        .map(|tag| Value::Array(tag.iter().map(|s| Value::String(s.clone())).collect()))
        .collect();

    let array = Value::Array(vec![
        Value::Number(0.into()),
        Value::String(pubkey_hex.to_string()),
        Value::Number(created_at.into()),
        Value::Number(kind.into()),
        Value::Array(tags_value),
        Value::String(content.to_string()),
    ]);

    // serde_json's default `Value` serialization already produces compact,
    // minimum-escaped output with no insignificant whitespace and integers
    // rendered without a decimal point — exactly NIP-01's canonical form.
    serde_json::to_vec(&array).expect("canonical array serializes infallibly")
}

/// Re-serializes already-canonical bytes, verifying idempotence:
/// `canonical(parse(canonical(event))) == canonical(event)`.
pub fn reserialize(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| CodecError::CanonicalJson(e.to_string()))?;
    serde_json::to_vec(&value).map_err(|e| CodecError::CanonicalJson(e.to_string()))
}
