//! Nostr identity crypto: secp256k1 scalar keys, BIP-340 Schnorr signatures
//! over x-only public keys.

use crate::error::CryptoError;
use secp256k1::rand::rngs::OsRng;
use secp256k1::{Keypair, Message, SecretKey, XOnlyPublicKey};
use secp256k1::{Secp256k1, Signing};

pub struct NostrIdentity {
    pub secret: SecretKey,
    pub xonly_public: XOnlyPublicKey,
}

impl NostrIdentity {
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, keypair) = generate_keypair(&secp);
        let (xonly_public, _parity) = keypair.x_only_public_key();
        Self { secret, xonly_public }
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(bytes).map_err(|_| CryptoError::InvalidKey)?;
        let keypair = Keypair::from_secret_key(&secp, &secret);
        let (xonly_public, _parity) = keypair.x_only_public_key();
        Ok(Self { secret, xonly_public })
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    pub fn xonly_public_bytes(&self) -> [u8; 32] {
        self.xonly_public.serialize()
    }
}

fn generate_keypair<C: Signing>(secp: &Secp256k1<C>) -> (SecretKey, Keypair) {
    let keypair = Keypair::new(secp, &mut OsRng);
    (keypair.secret_key(), keypair)
}

/// Signs a 32-byte message hash with BIP-340 Schnorr, using synthetic (RFC6979-style) aux randomness.
pub fn sign_schnorr_secp256k1(secret: &SecretKey, msg32: &[u8; 32]) -> [u8; 64] {
    let secp = Secp256k1::new();
    let keypair = Keypair::from_secret_key(&secp, secret);
    let msg = Message::from_digest(*msg32);
    let sig = secp.sign_schnorr(&msg, &keypair);
    sig.as_ref().try_into().expect("schnorr signatures are 64 bytes")
}

/// Verifies a BIP-340 Schnorr signature. Returns `false` on any decoding error.
pub fn verify_schnorr_secp256k1(xonly_pub: &[u8; 32], msg32: &[u8; 32], sig: &[u8; 64]) -> bool {
    let secp = Secp256k1::new();
    let Ok(public) = XOnlyPublicKey::from_slice(xonly_pub) else {
        return false;
    };
    let Ok(signature) = secp256k1::schnorr::Signature::from_slice(sig) else {
        return false;
    };
    let msg = Message::from_digest(*msg32);
    secp.verify_schnorr(&signature, &msg, &public).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schnorr_sign_verify_round_trip() {
        let identity = NostrIdentity::generate();
        let msg = crate::crypto::hash::sha256(b"nostr event bytes");
        let sig = sign_schnorr_secp256k1(&identity.secret, &msg);
        assert!(verify_schnorr_secp256k1(&identity.xonly_public_bytes(), &msg, &sig));
    }

    #[test]
    fn schnorr_verify_rejects_flipped_bit() {
        let identity = NostrIdentity::generate();
        let msg = crate::crypto::hash::sha256(b"nostr event bytes");
        let mut sig = sign_schnorr_secp256k1(&identity.secret, &msg);
        sig[0] ^= 0x01;
        assert!(!verify_schnorr_secp256k1(&identity.xonly_public_bytes(), &msg, &sig));
    }

    #[test]
    fn from_secret_bytes_round_trip() {
        let identity = NostrIdentity::generate();
        let restored = NostrIdentity::from_secret_bytes(&identity.secret_bytes()).unwrap();
        assert_eq!(restored.xonly_public_bytes(), identity.xonly_public_bytes());
    }
}
