//! Error kinds surfaced by the core, per the taxonomy in the design spec.
//!
//! The routing decision function never raises — it classifies (see
//! `routing::decision::Decision`). Everything else that can fail returns one
//! of the typed errors below so a host application can match on `kind()` and
//! show a human-readable recovery suggestion.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("csprng unavailable")]
    Unavailable,
    #[error("invalid key")]
    InvalidKey,
    #[error("authentication failed")]
    AuthFailed,
    #[error("invalid signature")]
    InvalidSignature,
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("bech32 decode error: {0}")]
    Bech32(String),
    #[error("invalid bolt11 amount")]
    Bolt11Amount,
    #[error("invalid bolt11 field: {0}")]
    Bolt11Field(&'static str),
    #[error("invalid bolt11 signature length")]
    Bolt11Signature,
    #[error("canonical json error: {0}")]
    CanonicalJson(String),
    #[error("invalid geohash")]
    Geohash,
    #[error("envelope encoding error: {0}")]
    Envelope(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport disconnected")]
    Disconnected,
    #[error("peer not reachable")]
    PeerNotReachable,
    #[error("send failed: {0}")]
    SendFailed(String),
}

#[derive(Error, Debug)]
pub enum NostrError {
    #[error("relay closed")]
    RelayClosed,
    #[error("publish rejected: {0}")]
    PublishRejected(String),
    #[error("bad event: {0}")]
    BadEvent(&'static str),
    #[error("rate limited")]
    RateLimited,
}

#[derive(Error, Debug)]
pub enum ZapError {
    #[error("lnurl endpoint error: {0}")]
    LnurlEndpoint(String),
    #[error("amount out of range")]
    AmountOutOfRange,
    #[error("amount mismatch")]
    AmountMismatch,
    #[error("description hash mismatch")]
    DescriptionHashMismatch,
    #[error("invalid invoice: {0}")]
    InvalidInvoice(String),
    #[error("no wallet available")]
    NoWallet,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("identity not initialized")]
    NotInitialized,
    #[error("secret store error: {0}")]
    SecretStore(String),
}

/// Top-level error type returned at the `Core` boundary and by the demo binary.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Nostr(#[from] NostrError),
    #[error(transparent)]
    Zap(#[from] ZapError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl Error {
    /// Human-readable recovery suggestion; every surfaced error carries one.
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Error::Crypto(CryptoError::Unavailable) => "retry once a CSPRNG source is available",
            Error::Crypto(CryptoError::InvalidKey) => "verify the peer's public key was transmitted correctly",
            Error::Crypto(CryptoError::AuthFailed) => "discard the message, the ciphertext was tampered with or misdirected",
            Error::Crypto(CryptoError::InvalidSignature) => "discard the message, the signature does not match the claimed sender",
            Error::Codec(_) => "discard the malformed input and do not retry with the same bytes",
            Error::Transport(TransportError::Disconnected) => "reconnect the transport and retry the send",
            Error::Transport(TransportError::PeerNotReachable) => "wait for a route to reappear or pick another transport",
            Error::Transport(TransportError::SendFailed(_)) => "retry with backoff",
            Error::Nostr(NostrError::RelayClosed) => "reconnect with exponential backoff",
            Error::Nostr(NostrError::PublishRejected(_)) => "inspect the relay's OK reason before retrying",
            Error::Nostr(NostrError::BadEvent(_)) => "drop the event, it failed verification",
            Error::Nostr(NostrError::RateLimited) => "slow down publishing to this relay",
            Error::Zap(_) => "abort this zap attempt, zap errors are always terminal",
            Error::Identity(IdentityError::NotInitialized) => "create or import an identity before using the core",
            Error::Identity(IdentityError::SecretStore(_)) => "check secret store availability and permissions",
        }
    }
}
