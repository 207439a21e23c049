//! Handshake message encoding.
//!
//! Pure and deterministic. These are the plaintext bodies; the request body is
//! sealed to the responder before it goes on the wire, and every body is
//! length-prefixed by [`super::protocol`].
//!
//! | Message | Layout |
//! |---------|--------|
//! | Request | `[32 ephemeral][32 initiator public key]` |
//! | Response | `[32 ephemeral][64 signature]` |
//! | Finish | `[64 signature]` |

use crate::error::{Error, Result};
use parley_crypto::identity::{PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
use parley_crypto::x25519::EPHEMERAL_PUBLIC_SIZE;
use parley_crypto::{EphemeralPublicKey, PublicKey, Signature};

/// Encoded response length
pub const RESPONSE_SIZE: usize = EPHEMERAL_PUBLIC_SIZE + SIGNATURE_SIZE;

/// Encoded finish length
pub const FINISH_SIZE: usize = SIGNATURE_SIZE;

/// Encoded request length
pub const REQUEST_SIZE: usize = EPHEMERAL_PUBLIC_SIZE + PUBLIC_KEY_SIZE;

/// "I am `initiator`, here is my ephemeral contribution."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Initiator long-term identity
    pub initiator: PublicKey,
    /// Initiator ephemeral X25519 contribution
    pub ephemeral: EphemeralPublicKey,
}

/// Responder's contribution plus proof of its identity over the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Responder ephemeral X25519 contribution
    pub ephemeral: EphemeralPublicKey,
    /// Responder signature over the transcript
    pub signature: Signature,
}

/// Initiator's proof of possession over the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeFinish {
    /// Initiator signature over the transcript
    pub signature: Signature,
}

/// Encode a request body: ephemeral contribution then public key.
#[must_use]
pub fn encode_request(initiator: &PublicKey, ephemeral: &EphemeralPublicKey) -> Vec<u8> {
    let mut out = Vec::with_capacity(REQUEST_SIZE);
    out.extend_from_slice(ephemeral.as_bytes());
    out.extend_from_slice(&initiator.to_bytes());
    out
}

/// Decode a request body.
///
/// # Errors
///
/// Returns [`Error::MalformedHandshake`] if fewer than 32 bytes are present or
/// the remaining bytes are not a valid public key.
pub fn decode_request(bytes: &[u8]) -> Result<HandshakeRequest> {
    if bytes.len() < EPHEMERAL_PUBLIC_SIZE {
        return Err(Error::malformed("request shorter than ephemeral contribution"));
    }
    let (ephemeral, key) = bytes.split_at(EPHEMERAL_PUBLIC_SIZE);
    let initiator =
        PublicKey::from_slice(key).map_err(|_| Error::malformed("invalid initiator public key"))?;

    Ok(HandshakeRequest {
        initiator,
        ephemeral: EphemeralPublicKey::from_bytes(fixed(ephemeral)),
    })
}

impl HandshakeRequest {
    /// Encode this request
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        encode_request(&self.initiator, &self.ephemeral)
    }

    /// Decode a request
    ///
    /// # Errors
    ///
    /// See [`decode_request`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_request(bytes)
    }
}

impl HandshakeResponse {
    /// Encode this response
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RESPONSE_SIZE);
        out.extend_from_slice(self.ephemeral.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out
    }

    /// Decode a response
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHandshake`] unless exactly 96 bytes are present.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != RESPONSE_SIZE {
            return Err(Error::malformed("response has wrong length"));
        }
        let (ephemeral, signature) = bytes.split_at(EPHEMERAL_PUBLIC_SIZE);
        Ok(Self {
            ephemeral: EphemeralPublicKey::from_bytes(fixed(ephemeral)),
            signature: Signature::from_bytes(fixed(signature)),
        })
    }
}

impl HandshakeFinish {
    /// Encode this finish message
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.signature.as_bytes().to_vec()
    }

    /// Decode a finish message
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHandshake`] unless exactly 64 bytes are present.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let signature =
            Signature::from_slice(bytes).map_err(|_| Error::malformed("finish has wrong length"))?;
        Ok(Self { signature })
    }
}

// Callers have already checked the length.
fn fixed<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_crypto::{EphemeralSecret, Identity};
    use rand_core::OsRng;

    #[test]
    fn test_request_roundtrip() {
        let initiator = Identity::generate(&mut OsRng).public_key();
        let ephemeral = EphemeralSecret::generate(&mut OsRng).public_key();

        let encoded = encode_request(&initiator, &ephemeral);
        assert_eq!(encoded.len(), REQUEST_SIZE);
        assert_eq!(&encoded[..32], ephemeral.as_bytes());

        let decoded = decode_request(&encoded).unwrap();
        assert_eq!(decoded.initiator, initiator);
        assert_eq!(decoded.ephemeral, ephemeral);
    }

    #[test]
    fn test_request_too_short() {
        for len in [0, 1, 16, 31] {
            assert!(matches!(
                decode_request(&vec![7u8; len]),
                Err(Error::MalformedHandshake(_))
            ));
        }
    }

    #[test]
    fn test_request_bad_public_key() {
        // Ephemeral present, key truncated
        assert!(matches!(
            decode_request(&[1u8; 40]),
            Err(Error::MalformedHandshake(_))
        ));
        // Ephemeral present, key over-long
        let mut bytes = encode_request(
            &Identity::generate(&mut OsRng).public_key(),
            &EphemeralPublicKey::from_bytes([9u8; 32]),
        );
        bytes.push(0);
        assert!(decode_request(&bytes).is_err());
    }

    #[test]
    fn test_response_roundtrip() {
        let identity = Identity::generate(&mut OsRng);
        let response = HandshakeResponse {
            ephemeral: EphemeralSecret::generate(&mut OsRng).public_key(),
            signature: identity.sign(b"transcript"),
        };

        let encoded = response.encode();
        assert_eq!(encoded.len(), RESPONSE_SIZE);
        assert_eq!(HandshakeResponse::decode(&encoded).unwrap(), response);
        assert!(HandshakeResponse::decode(&encoded[..95]).is_err());
    }

    #[test]
    fn test_finish_roundtrip() {
        let finish = HandshakeFinish {
            signature: Identity::generate(&mut OsRng).sign(b"transcript"),
        };
        let encoded = finish.encode();
        assert_eq!(encoded.len(), FINISH_SIZE);
        assert_eq!(HandshakeFinish::decode(&encoded).unwrap(), finish);
        assert!(matches!(
            HandshakeFinish::decode(&encoded[1..]),
            Err(Error::MalformedHandshake(_))
        ));
    }
}
