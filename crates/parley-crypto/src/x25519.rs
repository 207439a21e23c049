//! Ephemeral X25519 key agreement (RFC 7748).
//!
//! Each handshake generates a fresh key pair on both sides. The secret half is
//! consumed by [`EphemeralSecret::agree`], so it cannot be reused for a second
//! agreement; dropping it zeroizes the scalar. This is what gives sessions
//! forward secrecy with respect to the long-term identity keys.

use rand_core::{CryptoRng, RngCore};
use std::fmt;
use zeroize::ZeroizeOnDrop;

/// X25519 public contribution size
pub const EPHEMERAL_PUBLIC_SIZE: usize = 32;

/// Single-use X25519 secret.
pub struct EphemeralSecret(x25519_dalek::EphemeralSecret);

/// X25519 public contribution sent over the wire (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EphemeralPublicKey([u8; EPHEMERAL_PUBLIC_SIZE]);

/// X25519 shared secret (32 bytes).
#[derive(ZeroizeOnDrop)]
pub struct SharedSecret(x25519_dalek::SharedSecret);

impl EphemeralSecret {
    /// Generate a new random secret.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(x25519_dalek::EphemeralSecret::random_from_rng(rng))
    }

    /// Public contribution for this secret.
    #[must_use]
    pub fn public_key(&self) -> EphemeralPublicKey {
        EphemeralPublicKey(*x25519_dalek::PublicKey::from(&self.0).as_bytes())
    }

    /// Perform Diffie-Hellman with the peer's contribution, consuming the secret.
    ///
    /// Returns `None` if the peer's public key is a low-order point.
    #[must_use]
    pub fn agree(self, peer: &EphemeralPublicKey) -> Option<SharedSecret> {
        let shared = self
            .0
            .diffie_hellman(&x25519_dalek::PublicKey::from(peer.0));

        if !shared.was_contributory() {
            return None;
        }

        Some(SharedSecret(shared))
    }
}

impl EphemeralPublicKey {
    /// Import public contribution from bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; EPHEMERAL_PUBLIC_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get bytes as a slice.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; EPHEMERAL_PUBLIC_SIZE] {
        &self.0
    }
}

impl fmt::Debug for EphemeralPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EphemeralPublicKey({})", hex::encode(&self.0[..8]))
    }
}

impl SharedSecret {
    /// Get shared secret as bytes.
    ///
    /// # Security
    ///
    /// Feed this through [`crate::kdf::SharedKey::derive`] before use as a key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn test_key_agreement() {
        let alice = EphemeralSecret::generate(&mut OsRng);
        let alice_public = alice.public_key();

        let bob = EphemeralSecret::generate(&mut OsRng);
        let bob_public = bob.public_key();

        let alice_shared = alice.agree(&bob_public).unwrap();
        let bob_shared = bob.agree(&alice_public).unwrap();

        assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
    }

    #[test]
    fn test_fresh_contributions_differ() {
        let a = EphemeralSecret::generate(&mut OsRng).public_key();
        let b = EphemeralSecret::generate(&mut OsRng).public_key();
        assert_ne!(a, b);
        assert_ne!(a.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_reject_low_order_points() {
        let secret = EphemeralSecret::generate(&mut OsRng);
        let zero = EphemeralPublicKey::from_bytes([0u8; 32]);
        assert!(secret.agree(&zero).is_none());
    }

    #[test]
    fn test_altered_contribution_changes_secret() {
        let alice = EphemeralSecret::generate(&mut OsRng);
        let alice_public = alice.public_key();
        let bob = EphemeralSecret::generate(&mut OsRng);
        let mallory_public = EphemeralSecret::generate(&mut OsRng).public_key();

        let bob_shared = bob.agree(&alice_public).unwrap();
        let alice_shared = alice.agree(&mallory_public).unwrap();

        assert_ne!(alice_shared.as_bytes(), bob_shared.as_bytes());
    }
}
