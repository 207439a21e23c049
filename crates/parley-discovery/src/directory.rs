//! In-memory address directory.
//!
//! `StaticDirectory` is the simplest [`Discovery`] implementation: a table of
//! NodeId to addresses filled from configuration or by the application. It is
//! what the CLI uses for statically configured peers and what tests use in
//! place of a live DHT.

use crate::{Discovery, DiscoveryError, NodeId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Static NodeId to address table.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    port: u16,
    entries: RwLock<HashMap<NodeId, Vec<String>>>,
    running: AtomicBool,
}

impl StaticDirectory {
    /// Create an empty directory.
    ///
    /// `port` is the UDP port a DHT-backed directory would bind; it is
    /// recorded for diagnostics only.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Configured directory port
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Add an address for a node. Duplicate addresses are ignored.
    pub async fn insert(&self, id: NodeId, addr: impl Into<String>) {
        let addr = addr.into();
        let mut entries = self.entries.write().await;
        let addrs = entries.entry(id).or_default();
        if !addrs.contains(&addr) {
            addrs.push(addr);
        }
    }

    /// Remove every address for a node, returning them.
    pub async fn remove(&self, id: &NodeId) -> Option<Vec<String>> {
        self.entries.write().await.remove(id)
    }

    /// Number of nodes with at least one address
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the directory has no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Discovery for StaticDirectory {
    async fn start(&self) -> Result<(), DiscoveryError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DiscoveryError::AlreadyRunning);
        }
        tracing::debug!("Static directory started (port {})", self.port);
        Ok(())
    }

    async fn stop(&self) -> Result<(), DiscoveryError> {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DiscoveryError::NotRunning);
        }
        tracing::debug!("Static directory stopped");
        Ok(())
    }

    async fn resolve(&self, id: &NodeId) -> Result<Vec<String>, DiscoveryError> {
        if !self.is_running() {
            return Err(DiscoveryError::NotRunning);
        }
        Ok(self
            .entries
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_requires_start() {
        let directory = StaticDirectory::new(6881);
        let id = NodeId::from_public_key(&[1u8; 32]);

        assert!(matches!(
            directory.resolve(&id).await,
            Err(DiscoveryError::NotRunning)
        ));

        directory.start().await.unwrap();
        assert!(directory.resolve(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_and_resolve() {
        let directory = StaticDirectory::new(0);
        directory.start().await.unwrap();
        let id = NodeId::from_public_key(&[2u8; 32]);

        directory.insert(id, "127.0.0.1:9000").await;
        directory.insert(id, "10.0.0.1:9000").await;
        directory.insert(id, "127.0.0.1:9000").await;

        assert_eq!(
            directory.resolve(&id).await.unwrap(),
            vec!["127.0.0.1:9000".to_string(), "10.0.0.1:9000".to_string()]
        );
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let directory = StaticDirectory::new(0);
        directory.start().await.unwrap();
        let id = NodeId::from_public_key(&[3u8; 32]);

        directory.insert(id, "127.0.0.1:1").await;
        assert_eq!(directory.remove(&id).await.unwrap().len(), 1);
        assert!(directory.is_empty().await);
        assert!(directory.resolve(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let directory = StaticDirectory::new(0);
        assert!(!directory.is_running());

        directory.start().await.unwrap();
        assert!(matches!(
            directory.start().await,
            Err(DiscoveryError::AlreadyRunning)
        ));

        directory.stop().await.unwrap();
        assert!(!directory.is_running());
        assert!(matches!(
            directory.stop().await,
            Err(DiscoveryError::NotRunning)
        ));
    }
}
