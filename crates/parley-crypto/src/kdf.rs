//! Handshake key schedule (BLAKE3 in key-derivation mode).
//!
//! - [`Transcript`] binds both long-term identities and both ephemeral
//!   contributions; the handshake signatures cover it.
//! - [`SharedKey`] is derived from the ephemeral Diffie-Hellman output and the
//!   transcript, so altering either contribution in transit yields different
//!   keys on the two ends.
//! - [`ChannelKeys`] splits a SharedKey into one key per direction.

use crate::aead::{AeadKey, CipherState};
use crate::identity::PublicKey;
use crate::x25519::{EphemeralPublicKey, SharedSecret};
use subtle::ConstantTimeEq;
use zeroize::ZeroizeOnDrop;

const TRANSCRIPT_CONTEXT: &str = "parley 2026-01 handshake transcript v1";
const SHARED_KEY_CONTEXT: &str = "parley 2026-01 handshake shared key v1";
const INITIATOR_TO_RESPONDER_CONTEXT: &str = "parley 2026-01 channel initiator->responder v1";
const RESPONDER_TO_INITIATOR_CONTEXT: &str = "parley 2026-01 channel responder->initiator v1";

/// Shared key size
pub const SHARED_KEY_SIZE: usize = 32;

/// Hash of everything both sides contributed to one handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transcript([u8; 32]);

impl Transcript {
    /// Build the transcript for one exchange.
    #[must_use]
    pub fn new(
        initiator: &PublicKey,
        responder: &PublicKey,
        initiator_ephemeral: &EphemeralPublicKey,
        responder_ephemeral: &EphemeralPublicKey,
    ) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(TRANSCRIPT_CONTEXT);
        hasher.update(&initiator.to_bytes());
        hasher.update(&responder.to_bytes());
        hasher.update(initiator_ephemeral.as_bytes());
        hasher.update(responder_ephemeral.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Message to sign: a role label followed by the transcript hash.
    #[must_use]
    pub fn signing_payload(&self, label: &[u8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(label.len() + self.0.len());
        payload.extend_from_slice(label);
        payload.extend_from_slice(&self.0);
        payload
    }

    /// Raw transcript hash
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Per-connection symmetric key.
///
/// Never printed, compared in constant time, zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct SharedKey([u8; SHARED_KEY_SIZE]);

impl SharedKey {
    /// Derive from an ephemeral agreement and the exchange transcript.
    #[must_use]
    pub fn derive(secret: &SharedSecret, transcript: &Transcript) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(SHARED_KEY_CONTEXT);
        hasher.update(secret.as_bytes());
        hasher.update(transcript.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Expand into the two directional channel ciphers.
    #[must_use]
    pub fn channel_keys(&self) -> ChannelKeys {
        ChannelKeys {
            initiator_to_responder: CipherState::new(AeadKey::new(blake3::derive_key(
                INITIATOR_TO_RESPONDER_CONTEXT,
                &self.0,
            ))),
            responder_to_initiator: CipherState::new(AeadKey::new(blake3::derive_key(
                RESPONDER_TO_INITIATOR_CONTEXT,
                &self.0,
            ))),
        }
    }
}

impl PartialEq for SharedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SharedKey {}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// Directional ciphers for one channel.
#[derive(Debug)]
pub struct ChannelKeys {
    /// Protects frames written by the initiator
    pub initiator_to_responder: CipherState,
    /// Protects frames written by the responder
    pub responder_to_initiator: CipherState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::x25519::EphemeralSecret;
    use rand_core::OsRng;

    fn transcript_for(a: &EphemeralPublicKey, b: &EphemeralPublicKey) -> Transcript {
        let initiator = Identity::from_seed(&[1u8; 32]).public_key();
        let responder = Identity::from_seed(&[2u8; 32]).public_key();
        Transcript::new(&initiator, &responder, a, b)
    }

    #[test]
    fn test_both_sides_derive_same_key() {
        let i = EphemeralSecret::generate(&mut OsRng);
        let r = EphemeralSecret::generate(&mut OsRng);
        let (i_pub, r_pub) = (i.public_key(), r.public_key());
        let transcript = transcript_for(&i_pub, &r_pub);

        let initiator_key = SharedKey::derive(&i.agree(&r_pub).unwrap(), &transcript);
        let responder_key = SharedKey::derive(&r.agree(&i_pub).unwrap(), &transcript);

        assert_eq!(initiator_key, responder_key);
    }

    #[test]
    fn test_transcript_binds_contributions() {
        let a = EphemeralPublicKey::from_bytes([1u8; 32]);
        let b = EphemeralPublicKey::from_bytes([2u8; 32]);
        let c = EphemeralPublicKey::from_bytes([3u8; 32]);

        assert_ne!(transcript_for(&a, &b), transcript_for(&a, &c));
        assert_ne!(transcript_for(&a, &b), transcript_for(&b, &a));
    }

    #[test]
    fn test_signing_payload_is_labelled() {
        let t = transcript_for(
            &EphemeralPublicKey::from_bytes([1u8; 32]),
            &EphemeralPublicKey::from_bytes([2u8; 32]),
        );
        let payload = t.signing_payload(b"label");
        assert_eq!(&payload[..5], b"label");
        assert_eq!(&payload[5..], t.as_bytes());
    }

    #[test]
    fn test_directional_keys_differ() {
        let i = EphemeralSecret::generate(&mut OsRng);
        let r = EphemeralSecret::generate(&mut OsRng);
        let (i_pub, r_pub) = (i.public_key(), r.public_key());
        let key = SharedKey::derive(&i.agree(&r_pub).unwrap(), &transcript_for(&i_pub, &r_pub));

        let mut keys = key.channel_keys();
        let counter = keys.initiator_to_responder.next_counter().unwrap();
        let ciphertext = keys
            .initiator_to_responder
            .encrypt(counter, b"frame", b"")
            .unwrap();

        assert!(
            keys.responder_to_initiator
                .decrypt(counter, &ciphertext, b"")
                .is_err()
        );
    }

    #[test]
    fn test_debug_hides_key() {
        let secret = EphemeralSecret::generate(&mut OsRng)
            .agree(&EphemeralSecret::generate(&mut OsRng).public_key())
            .unwrap();
        let key = SharedKey::derive(
            &secret,
            &transcript_for(
                &EphemeralPublicKey::from_bytes([1u8; 32]),
                &EphemeralPublicKey::from_bytes([2u8; 32]),
            ),
        );
        assert_eq!(format!("{key:?}"), "SharedKey(..)");
    }
}
