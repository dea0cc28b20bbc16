//! Wire-level codecs: bech32, BOLT11 invoices, geohash cells, and canonical
//! Nostr event JSON.

pub mod bech32;
pub mod bolt11;
pub mod geohash;
pub mod nostr_json;

pub use bolt11::{validate as validate_bolt11, ParsedInvoice, TaggedField};
