//! Node identifiers used as discovery lookup keys.
//!
//! NodeIds are derived from long-term public keys with BLAKE3, so a peer's
//! directory entry is tied to its cryptographic identity.

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 256-bit node identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId([u8; 32]);

impl NodeId {
    /// Derive a NodeId from a 32-byte public key
    ///
    /// # Examples
    ///
    /// ```
    /// use parley_discovery::NodeId;
    ///
    /// let id = NodeId::from_public_key(&[42u8; 32]);
    /// assert_eq!(id, NodeId::from_public_key(&[42u8; 32]));
    /// ```
    #[must_use]
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(public_key);
        hasher.update(b"parley-node-id"); // Domain separation
        Self(*hasher.finalize().as_bytes())
    }

    /// Get the raw bytes of the NodeId
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create NodeId from raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Full lowercase hex encoding
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl FromStr for NodeId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }
}
