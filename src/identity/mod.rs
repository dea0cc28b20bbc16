//! Mesh and Nostr identity lifecycle, backed by a keyed secret store.

pub mod store;

pub use store::{
    derive_did, encode_npub, encode_nsec, IdentityStore, InMemorySecretStore, LoadedMeshIdentity, SecretStore,
};
