//! Contact list: the authorization table for inbound handshakes.
//!
//! Maps a peer's long-term public key to its last known address. A peer may
//! complete a handshake against this node only if its key is present.
//! Entries are added by the application or after a successful outbound
//! connection and are never removed implicitly.

use crate::error::{Error, Result};
use dashmap::DashMap;
use parley_crypto::PublicKey;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;

/// Persisted form of one contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEntry {
    /// Peer public key (hex)
    pub public_key: PublicKey,
    /// Last known address (`host:port`)
    pub address: String,
}

/// Concurrent contact table.
///
/// All operations take `&self` and are safe to call from any number of tasks.
/// Locks are sharded and held only for the map operation itself, never
/// across I/O.
#[derive(Debug, Default)]
pub struct ContactList {
    entries: DashMap<PublicKey, String>,
}

impl ContactList {
    /// Create an empty contact list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known address for a peer
    #[must_use]
    pub fn lookup(&self, key: &PublicKey) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Insert or overwrite a peer's address
    pub fn upsert(&self, key: PublicKey, address: impl Into<String>) {
        self.entries.insert(key, address.into());
    }

    /// True iff the peer is present
    #[must_use]
    pub fn is_authorized(&self, key: &PublicKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove a peer, returning its address
    pub fn remove(&self, key: &PublicKey) -> Option<String> {
        self.entries.remove(key).map(|(_, address)| address)
    }

    /// Number of contacts
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time copy of all entries, sorted by public key hex
    #[must_use]
    pub fn snapshot(&self) -> Vec<ContactEntry> {
        let mut entries: Vec<ContactEntry> = self
            .entries
            .iter()
            .map(|entry| ContactEntry {
                public_key: *entry.key(),
                address: entry.value().clone(),
            })
            .collect();
        entries.sort_by_key(|entry| entry.public_key.to_bytes());
        entries
    }

    /// Load a contact list from a JSON file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::InvalidConfig`] if it does not parse or contains invalid keys.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let entries: Vec<ContactEntry> = serde_json::from_str(&data)
            .map_err(|e| Error::InvalidConfig(Cow::Owned(format!("contacts file: {e}"))))?;

        let list = Self::new();
        for entry in entries {
            list.upsert(entry.public_key, entry.address);
        }

        tracing::debug!(
            "Loaded {} contacts from {}",
            list.len(),
            path.as_ref().display()
        );
        Ok(list)
    }

    /// Save the contact list as JSON, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| Error::InvalidConfig(Cow::Owned(format!("contacts encode: {e}"))))?;
        std::fs::write(path, data)?;

        tracing::debug!("Saved {} contacts to {}", self.len(), path.display());
        Ok(())
    }
}

impl FromIterator<(PublicKey, String)> for ContactList {
    fn from_iter<I: IntoIterator<Item = (PublicKey, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_crypto::Identity;
    use rand_core::OsRng;
    use std::sync::Arc;

    fn key() -> PublicKey {
        Identity::generate(&mut OsRng).public_key()
    }

    #[test]
    fn test_lookup_upsert() {
        let contacts = ContactList::new();
        let peer = key();

        assert_eq!(contacts.lookup(&peer), None);
        assert!(!contacts.is_authorized(&peer));

        contacts.upsert(peer, "127.0.0.1:9000");
        assert_eq!(contacts.lookup(&peer).as_deref(), Some("127.0.0.1:9000"));
        assert!(contacts.is_authorized(&peer));

        contacts.upsert(peer, "10.0.0.2:9000");
        assert_eq!(contacts.lookup(&peer).as_deref(), Some("10.0.0.2:9000"));
        assert_eq!(contacts.len(), 1);
    }

    #[test]
    fn test_remove() {
        let contacts = ContactList::new();
        let peer = key();
        contacts.upsert(peer, "a:1");

        assert_eq!(contacts.remove(&peer).as_deref(), Some("a:1"));
        assert!(!contacts.is_authorized(&peer));
        assert!(contacts.is_empty());
        assert_eq!(contacts.remove(&peer), None);
    }

    #[test]
    fn test_concurrent_access() {
        let contacts = Arc::new(ContactList::new());
        let peers: Vec<PublicKey> = (0..16).map(|_| key()).collect();

        let handles: Vec<_> = peers
            .iter()
            .copied()
            .enumerate()
            .map(|(i, peer)| {
                let contacts = Arc::clone(&contacts);
                std::thread::spawn(move || {
                    for round in 0..100 {
                        contacts.upsert(peer, format!("10.0.0.{i}:{round}"));
                        let address = contacts.lookup(&peer).unwrap();
                        assert!(address.starts_with(&format!("10.0.0.{i}:")));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(contacts.len(), peers.len());
        for (i, peer) in peers.iter().enumerate() {
            assert_eq!(contacts.lookup(peer).unwrap(), format!("10.0.0.{i}:99"));
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("contacts.json");

        let contacts = ContactList::new();
        let (a, b) = (key(), key());
        contacts.upsert(a, "127.0.0.1:9000");
        contacts.upsert(b, "[::1]:9001");
        contacts.save(&path).unwrap();

        let loaded = ContactList::load(&path).unwrap();
        assert_eq!(loaded.snapshot(), contacts.snapshot());
    }

    #[test]
    fn test_load_rejects_invalid_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.json");
        std::fs::write(
            &path,
            r#"[{"public_key": "not-hex", "address": "127.0.0.1:1"}]"#,
        )
        .unwrap();

        assert!(matches!(
            ContactList::load(&path),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ContactList::load(dir.path().join("absent.json")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_from_iterator() {
        let (a, b) = (key(), key());
        let contacts: ContactList = [(a, "x:1".to_string()), (b, "y:2".to_string())]
            .into_iter()
            .collect();
        assert!(contacts.is_authorized(&a));
        assert!(contacts.is_authorized(&b));
    }
}
