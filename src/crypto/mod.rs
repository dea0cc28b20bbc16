//! Cryptographic primitives: mesh identity (X25519 + Ed25519), Nostr identity
//! (secp256k1 Schnorr), and the shared SHA-256 helper.

pub mod hash;
pub mod mesh;
pub mod schnorr;

pub use hash::{sha256, sha256_concat};
pub use mesh::{decrypt_with, encrypt_for, sign_ed25519, verify_ed25519, MeshIdentity};
pub use schnorr::{sign_schnorr_secp256k1, verify_schnorr_secp256k1, NostrIdentity};
