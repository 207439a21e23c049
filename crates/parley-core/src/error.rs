//! Error types for parley core
//!
//! Every fallible operation in this crate returns [`Error`]. The variants are
//! grouped by where they arise:
//!
//! - **Setup**: `Bind`, `InvalidConfig`, `Discovery`, `InvalidState`
//! - **Transport**: `ConnectionClosed`, `ShortRead`, `Io`, `Timeout`
//! - **Handshake**: `MalformedHandshake`, `DecryptionFailed`, `UnauthorizedPeer`,
//!   `InvalidSignature`, `HandshakeTimeout`
//! - **Channel**: `AuthenticationFailed`, `FrameTooLarge`
//! - **Listener**: `ListenerClosed`
//!
//! Handshake failures are per connection. They end that connection's worker
//! and are reported through `tracing`; they never reach [`crate::Listener::accept`].

use parley_crypto::{CryptoError, PublicKey};
use std::borrow::Cow;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors produced by parley core
#[derive(Debug, Error)]
pub enum Error {
    // ============ Setup Errors ============
    /// Listening socket could not be created or bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// Discovery collaborator failed
    #[error("Discovery error: {0}")]
    Discovery(Cow<'static, str>),

    /// Operation not valid in the current state
    #[error("Invalid state: {0}")]
    InvalidState(Cow<'static, str>),

    // ============ Transport Errors ============
    /// Stream ended cleanly before a message started
    #[error("Connection closed")]
    ConnectionClosed,

    /// Stream ended in the middle of a message
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes required
        expected: usize,
        /// Bytes received before EOF
        actual: usize,
    },

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(Cow<'static, str>),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ============ Handshake Errors ============
    /// Handshake message could not be decoded
    #[error("Malformed handshake: {0}")]
    MalformedHandshake(Cow<'static, str>),

    /// Handshake request was not encrypted to this node
    #[error("Handshake decryption failed")]
    DecryptionFailed,

    /// Initiator is not in the contact list
    #[error("Unauthorized peer: {}", hex::encode(&.0.to_bytes()[..8]))]
    UnauthorizedPeer(PublicKey),

    /// Handshake proof did not verify
    #[error("Invalid handshake signature")]
    InvalidSignature,

    /// Handshake did not complete in time
    #[error("Handshake timed out")]
    HandshakeTimeout,

    // ============ Channel Errors ============
    /// Frame failed authentication (tampering, replay, or reordering)
    #[error("Frame authentication failed")]
    AuthenticationFailed,

    /// Frame header announced a length above the configured limit
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    // ============ Node Errors ============
    /// Listener was closed
    #[error("Listener closed")]
    ListenerClosed,

    /// No address known for a peer
    #[error("Peer not found: {}", hex::encode(&.0.to_bytes()[..8]))]
    PeerNotFound(PublicKey),

    /// Cryptographic primitive failed
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl Error {
    /// Returns true if this error ends a single handshake attempt
    #[must_use]
    pub fn is_handshake_failure(&self) -> bool {
        matches!(
            self,
            Error::ConnectionClosed
                | Error::ShortRead { .. }
                | Error::MalformedHandshake(_)
                | Error::DecryptionFailed
                | Error::UnauthorizedPeer(_)
                | Error::InvalidSignature
                | Error::HandshakeTimeout
                | Error::Io(_)
        )
    }

    /// Returns true if an established channel must not be used after this error
    #[must_use]
    pub fn is_fatal_to_channel(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationFailed
                | Error::FrameTooLarge(_)
                | Error::ConnectionClosed
                | Error::ShortRead { .. }
                | Error::Io(_)
                | Error::Crypto(_)
        )
    }

    /// Create a malformed handshake error with static context (zero allocation)
    #[must_use]
    pub const fn malformed(context: &'static str) -> Self {
        Error::MalformedHandshake(Cow::Borrowed(context))
    }

    /// Create an invalid config error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        Error::InvalidConfig(Cow::Borrowed(context))
    }

    /// Create an invalid state error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_state(context: &'static str) -> Self {
        Error::InvalidState(Cow::Borrowed(context))
    }

    /// Create a timeout error with static context (zero allocation)
    #[must_use]
    pub const fn timeout(context: &'static str) -> Self {
        Error::Timeout(Cow::Borrowed(context))
    }
}

impl From<parley_discovery::DiscoveryError> for Error {
    fn from(err: parley_discovery::DiscoveryError) -> Self {
        Error::Discovery(Cow::Owned(err.to_string()))
    }
}

/// Result type for parley core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use parley_crypto::Identity;
    use rand_core::OsRng;

    #[test]
    fn test_handshake_failures() {
        let peer = Identity::generate(&mut OsRng).public_key();

        assert!(Error::DecryptionFailed.is_handshake_failure());
        assert!(Error::UnauthorizedPeer(peer).is_handshake_failure());
        assert!(Error::InvalidSignature.is_handshake_failure());
        assert!(Error::HandshakeTimeout.is_handshake_failure());
        assert!(Error::malformed("short").is_handshake_failure());

        assert!(!Error::ListenerClosed.is_handshake_failure());
        assert!(!Error::AuthenticationFailed.is_handshake_failure());
    }

    #[test]
    fn test_channel_fatal_errors() {
        assert!(Error::AuthenticationFailed.is_fatal_to_channel());
        assert!(Error::FrameTooLarge(1 << 20).is_fatal_to_channel());
        assert!(Error::Crypto(CryptoError::NonceOverflow).is_fatal_to_channel());

        assert!(!Error::ListenerClosed.is_fatal_to_channel());
        assert!(!Error::invalid_config("x").is_fatal_to_channel());
    }

    #[test]
    fn test_error_display() {
        let mut seed = [0u8; 32];
        seed[0] = 1;
        let peer = Identity::from_seed(&seed).public_key();
        let prefix = hex::encode(&peer.to_bytes()[..8]);

        assert!(Error::UnauthorizedPeer(peer).to_string().contains(&prefix));
        assert!(Error::PeerNotFound(peer).to_string().contains(&prefix));
        assert_eq!(
            Error::ShortRead {
                expected: 8,
                actual: 3
            }
            .to_string(),
            "Short read: expected 8 bytes, got 3"
        );
    }

    #[test]
    fn test_convenience_constructors() {
        assert!(matches!(Error::malformed("x"), Error::MalformedHandshake(_)));
        assert!(matches!(Error::invalid_config("x"), Error::InvalidConfig(_)));
        assert!(matches!(Error::invalid_state("x"), Error::InvalidState(_)));
        assert!(matches!(Error::timeout("x"), Error::Timeout(_)));
    }

    #[test]
    fn test_conversions() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(matches!(Error::from(io_err), Error::Io(_)));

        let err: Error = CryptoError::DecryptionFailed.into();
        assert!(matches!(err, Error::Crypto(_)));

        let err: Error = parley_discovery::DiscoveryError::NotRunning.into();
        assert!(matches!(err, Error::Discovery(_)));
    }
}
