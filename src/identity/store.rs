//! Identity lifecycle: mesh and Nostr keypairs, persisted through a keyed
//! secret-store collaborator.
//!
//! Persisted layout (see spec): `mesh_identity` holds
//! `x25519_priv(32) ‖ ed25519_priv(32) ‖ utf8(handle)`; `nostr_identity`
//! holds `secp256k1_priv(32)`.

use crate::codec::bech32;
use crate::crypto::{MeshIdentity, NostrIdentity};
use crate::error::IdentityError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

const MESH_KEY: &str = "mesh_identity";
const NOSTR_KEY: &str = "nostr_identity";

/// External key-value collaborator for persisting raw identity bytes.
/// Access per key must be atomic; the core never assumes cross-key
/// transactions.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IdentityError>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), IdentityError>;
    async fn delete(&self, key: &str) -> Result<(), IdentityError>;
}

/// In-memory `SecretStore`. Used by the demo binary and the test suite; a
/// host application wires in an OS-keychain-backed implementation instead.
#[derive(Default)]
pub struct InMemorySecretStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IdentityError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), IdentityError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), IdentityError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Mesh identity plus the handle it was created with.
pub struct LoadedMeshIdentity {
    pub identity: MeshIdentity,
    pub handle: String,
}

/// Derives `did:key:z<base58(ed25519_public)>` from a mesh identity's
/// Ed25519 public key.
pub fn derive_did(ed25519_public: &[u8; 32]) -> String {
    format!("did:key:z{}", bs58::encode(ed25519_public).into_string())
}

/// Bech32-encodes a Nostr public key as `npub1...`.
pub fn encode_npub(xonly_public: &[u8; 32]) -> Result<String, IdentityError> {
    bech32::encode("npub", &bech32::bytes_to_u5(xonly_public)).map_err(|e| IdentityError::SecretStore(e.to_string()))
}

/// Bech32-encodes a Nostr private key as `nsec1...`.
pub fn encode_nsec(secret: &[u8; 32]) -> Result<String, IdentityError> {
    bech32::encode("nsec", &bech32::bytes_to_u5(secret)).map_err(|e| IdentityError::SecretStore(e.to_string()))
}

/// Owns the lifecycle of this device's two identities against a
/// `SecretStore` collaborator.
pub struct IdentityStore<S: SecretStore> {
    secrets: S,
}

impl<S: SecretStore> IdentityStore<S> {
    pub fn new(secrets: S) -> Self {
        Self { secrets }
    }

    /// Loads the persisted mesh identity, if one exists.
    pub async fn load(&self) -> Result<Option<LoadedMeshIdentity>, IdentityError> {
        let Some(bytes) = self.secrets.get(MESH_KEY).await? else {
            return Ok(None);
        };
        if bytes.len() < 64 {
            return Err(IdentityError::SecretStore("mesh identity record truncated".into()));
        }
        let mut x25519_priv = [0u8; 32];
        let mut ed25519_priv = [0u8; 32];
        x25519_priv.copy_from_slice(&bytes[0..32]);
        ed25519_priv.copy_from_slice(&bytes[32..64]);
        let handle = String::from_utf8(bytes[64..].to_vec())
            .map_err(|_| IdentityError::SecretStore("handle is not valid utf-8".into()))?;
        let identity = MeshIdentity::from_raw_parts(x25519_priv, ed25519_priv)
            .map_err(|e| IdentityError::SecretStore(e.to_string()))?;
        Ok(Some(LoadedMeshIdentity { identity, handle }))
    }

    /// Loads the persisted Nostr identity, if one exists.
    pub async fn load_nostr(&self) -> Result<Option<NostrIdentity>, IdentityError> {
        let Some(bytes) = self.secrets.get(NOSTR_KEY).await? else {
            return Ok(None);
        };
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| IdentityError::SecretStore("nostr identity record has the wrong length".into()))?;
        NostrIdentity::from_secret_bytes(&secret).map(Some).map_err(|e| IdentityError::SecretStore(e.to_string()))
    }

    /// Generates and persists a new mesh identity under `handle`. Fails if
    /// one is already persisted — callers that want to replace an identity
    /// must `delete()` first.
    pub async fn create_or_fail(&self, handle: &str) -> Result<MeshIdentity, IdentityError> {
        if self.secrets.get(MESH_KEY).await?.is_some() {
            return Err(IdentityError::SecretStore("mesh identity already exists".into()));
        }
        let identity = MeshIdentity::generate().map_err(|e| IdentityError::SecretStore(e.to_string()))?;
        let mut record = Vec::with_capacity(64 + handle.len());
        record.extend_from_slice(&identity.x25519_private_bytes());
        record.extend_from_slice(&identity.ed25519_private_bytes());
        record.extend_from_slice(handle.as_bytes());
        self.secrets.set(MESH_KEY, record).await?;
        Ok(identity)
    }

    /// Generates and persists a new Nostr identity, failing if one is
    /// already persisted (mirrors `create_or_fail` for the mesh identity).
    pub async fn create_nostr_or_fail(&self) -> Result<NostrIdentity, IdentityError> {
        if self.secrets.get(NOSTR_KEY).await?.is_some() {
            return Err(IdentityError::SecretStore("nostr identity already exists".into()));
        }
        let identity = NostrIdentity::generate();
        self.secrets.set(NOSTR_KEY, identity.secret_bytes().to_vec()).await?;
        Ok(identity)
    }

    /// Erases both identities from the secret store.
    pub async fn delete(&self) -> Result<bool, IdentityError> {
        let had_mesh = self.secrets.get(MESH_KEY).await?.is_some();
        let had_nostr = self.secrets.get(NOSTR_KEY).await?.is_some();
        self.secrets.delete(MESH_KEY).await?;
        self.secrets.delete(NOSTR_KEY).await?;
        Ok(had_mesh || had_nostr)
    }

    /// Validates and persists a Nostr identity supplied as either an
    /// `nsec1...` bech32 string or a raw 64-character hex private key.
    pub async fn import_nostr(&self, nsec_or_hex: &str) -> Result<NostrIdentity, IdentityError> {
        let secret_bytes = if let Some(stripped) = nsec_or_hex.strip_prefix("nsec1") {
            let _ = stripped;
            let (hrp, data) = bech32::decode(nsec_or_hex).map_err(|e| IdentityError::SecretStore(e.to_string()))?;
            if hrp != "nsec" {
                return Err(IdentityError::SecretStore("not an nsec bech32 string".into()));
            }
            bech32::u5_to_bytes(&data).map_err(|e| IdentityError::SecretStore(e.to_string()))?
        } else {
            hex::decode(nsec_or_hex).map_err(|_| IdentityError::SecretStore("not valid hex".into()))?
        };
        let secret: [u8; 32] = secret_bytes
            .try_into()
            .map_err(|_| IdentityError::SecretStore("private key must be 32 bytes".into()))?;
        let identity =
            NostrIdentity::from_secret_bytes(&secret).map_err(|e| IdentityError::SecretStore(e.to_string()))?;
        self.secrets.set(NOSTR_KEY, secret.to_vec()).await?;
        Ok(identity)
    }
}
