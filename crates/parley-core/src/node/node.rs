//! Node implementation - owns the identity, contacts, and discovery handle
//!
//! # Example
//!
//! ```no_run
//! use parley_core::{Node, NodeConfig};
//! use parley_crypto::Identity;
//! use parley_discovery::StaticDirectory;
//! use rand_core::OsRng;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let identity = Identity::generate(&mut OsRng);
//!     let node = Node::new(identity, NodeConfig::default(), Arc::new(StaticDirectory::new(6881))).await?;
//!
//!     let listener = node.listen(9000).await?;
//!     let mut channel = listener.accept().await?;
//!     let message = channel.read_frame().await?;
//!     channel.write(&message).await?;
//!
//!     node.shutdown().await?;
//!     Ok(())
//! }
//! ```

use crate::channel::SecureChannel;
use crate::contacts::ContactList;
use crate::error::{Error, Result};
use crate::handshake::initiate;
use crate::listener::{HandshakeContext, Listener};
use crate::node::config::NodeConfig;
use parley_crypto::{Identity, PublicKey};
use parley_discovery::{Discovery, NodeId};
use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;

/// Inner node state (shared across clones)
struct NodeInner {
    identity: Arc<Identity>,
    public_key: PublicKey,
    node_id: NodeId,
    contacts: Arc<ContactList>,
    discovery: Arc<dyn Discovery>,
    config: NodeConfig,
    running: AtomicBool,
}

/// A parley node.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Validate `config`, seed the contact list, and start discovery.
    ///
    /// Either a running node is returned or nothing is: if discovery fails
    /// to start, no node exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an invalid configuration and
    /// [`Error::Discovery`] if the discovery service fails to start.
    pub async fn new(
        identity: Identity,
        config: NodeConfig,
        discovery: Arc<dyn Discovery>,
    ) -> Result<Self> {
        config.validate()?;

        let public_key = identity.public_key();
        let node_id = NodeId::from_public_key(&public_key.to_bytes());
        let contacts: ContactList = config.contacts.iter().cloned().collect();

        discovery.start().await.map_err(|e| {
            Error::Discovery(Cow::Owned(format!("discovery startup failed: {e}")))
        })?;

        tracing::info!(
            "Node started: {} ({} contacts, discovery port {})",
            node_id,
            contacts.len(),
            config.discovery_port
        );
        if let Some(port) = config.nat.recv_port {
            tracing::debug!("Hole-punch receive port reserved: {}", port);
        }

        Ok(Self {
            inner: Arc::new(NodeInner {
                identity: Arc::new(identity),
                public_key,
                node_id,
                contacts: Arc::new(contacts),
                discovery,
                config,
                running: AtomicBool::new(true),
            }),
        })
    }

    /// Long-term public key
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.inner.public_key
    }

    /// Discovery identifier derived from the public key
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.inner.node_id
    }

    /// Contact list (authorization table)
    #[must_use]
    pub fn contacts(&self) -> &ContactList {
        &self.inner.contacts
    }

    /// Node configuration
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Whether the node has not been shut down
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::invalid_state("node is shut down"))
        }
    }

    /// Bind a listener on `listen_host:port`.
    ///
    /// Use port 0 to let the OS pick; see [`Listener::local_addr`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the port is unavailable.
    pub async fn listen(&self, port: u16) -> Result<Listener> {
        self.ensure_running()?;
        let config = &self.inner.config;
        let context = HandshakeContext {
            identity: Arc::clone(&self.inner.identity),
            contacts: Arc::clone(&self.inner.contacts),
            handshake: config.handshake.clone(),
            channel: config.channel.clone(),
        };
        Listener::bind(config.listen_addr(port), context, &config.listener).await
    }

    /// Connect to a peer by identity.
    ///
    /// Tries the contact list address first, then every address discovery
    /// returns for the peer's [`NodeId`]. On success the peer's contact entry
    /// is updated to the address that worked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeerNotFound`] if no address is known, otherwise the
    /// error from the last address tried.
    pub async fn connect(&self, peer: &PublicKey) -> Result<SecureChannel> {
        self.ensure_running()?;
        if *peer == self.inner.public_key {
            return Err(Error::invalid_state("cannot connect to own identity"));
        }

        let mut tried = Vec::new();
        let mut last_error = None;

        if let Some(addr) = self.inner.contacts.lookup(peer) {
            match self.connect_addr(&addr, peer).await {
                Ok(channel) => return Ok(channel),
                Err(e) => {
                    tracing::debug!("Contact address {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
            tried.push(addr);
        }

        let node_id = NodeId::from_public_key(&peer.to_bytes());
        let candidates = match self.inner.discovery.resolve(&node_id).await {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::debug!("Discovery lookup for {} failed: {}", node_id, e);
                Vec::new()
            }
        };

        for addr in candidates {
            if tried.contains(&addr) {
                continue;
            }
            match self.connect_addr(&addr, peer).await {
                Ok(channel) => return Ok(channel),
                Err(e) => {
                    tracing::debug!("Discovered address {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
            tried.push(addr);
        }

        Err(last_error.unwrap_or(Error::PeerNotFound(*peer)))
    }

    /// Connect to `peer` at a known address (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the TCP connect exceeds `dial_timeout`,
    /// or any handshake error.
    pub async fn connect_addr(&self, addr: &str, peer: &PublicKey) -> Result<SecureChannel> {
        self.ensure_running()?;
        let config = &self.inner.config;

        tracing::debug!(
            "Dialing {} at {}",
            hex::encode(&peer.to_bytes()[..8]),
            addr
        );
        let stream = tokio::time::timeout(config.dial_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::timeout("dial"))??;
        stream.set_nodelay(true)?;

        let channel = initiate(
            stream,
            &self.inner.identity,
            peer,
            &config.handshake,
            &config.channel,
        )
        .await?;

        self.inner.contacts.upsert(*peer, addr);
        tracing::info!(
            "Secure channel established with {} at {}",
            hex::encode(&peer.to_bytes()[..8]),
            addr
        );
        Ok(channel)
    }

    /// Stop the discovery service.
    ///
    /// Listeners and channels already handed out are unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if already shut down, or
    /// [`Error::Discovery`] if discovery fails to stop.
    pub async fn shutdown(&self) -> Result<()> {
        if self
            .inner
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::invalid_state("node already shut down"));
        }

        self.inner.discovery.stop().await?;
        tracing::info!("Node stopped: {}", self.inner.node_id);
        Ok(())
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.inner.node_id)
            .field("public_key", &self.inner.public_key)
            .field("contacts", &self.inner.contacts.len())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_discovery::{DiscoveryError, StaticDirectory};
    use rand_core::OsRng;

    struct FailingDiscovery;

    #[async_trait]
    impl Discovery for FailingDiscovery {
        async fn start(&self) -> std::result::Result<(), DiscoveryError> {
            Err(DiscoveryError::StartFailed("port in use".into()))
        }

        async fn stop(&self) -> std::result::Result<(), DiscoveryError> {
            Err(DiscoveryError::NotRunning)
        }

        async fn resolve(&self, _id: &NodeId) -> std::result::Result<Vec<String>, DiscoveryError> {
            Err(DiscoveryError::NotRunning)
        }

        fn is_running(&self) -> bool {
            false
        }
    }

    fn local_config() -> NodeConfig {
        NodeConfig {
            listen_host: "127.0.0.1".parse().unwrap(),
            ..NodeConfig::default()
        }
    }

    async fn node_with(directory: Arc<StaticDirectory>) -> Node {
        Node::new(Identity::generate(&mut OsRng), local_config(), directory)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_new_fails_when_discovery_fails() {
        let result = Node::new(
            Identity::generate(&mut OsRng),
            local_config(),
            Arc::new(FailingDiscovery),
        )
        .await;
        assert!(matches!(result, Err(Error::Discovery(_))));
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config_before_discovery() {
        let directory = Arc::new(StaticDirectory::new(0));
        let mut config = local_config();
        config.listener.max_pending_handshakes = 0;

        let result = Node::new(Identity::generate(&mut OsRng), config, directory.clone()).await;
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        assert!(!directory.is_running());
    }

    #[tokio::test]
    async fn test_new_seeds_contacts() {
        let peer = Identity::generate(&mut OsRng).public_key();
        let config = NodeConfig {
            contacts: vec![(peer, "127.0.0.1:7000".into())],
            ..local_config()
        };
        let node = Node::new(
            Identity::generate(&mut OsRng),
            config,
            Arc::new(StaticDirectory::new(0)),
        )
        .await
        .unwrap();

        assert!(node.contacts().is_authorized(&peer));
        assert_eq!(
            node.node_id(),
            NodeId::from_public_key(&node.public_key().to_bytes())
        );
    }

    #[tokio::test]
    async fn test_connect_via_contact_list() {
        let server = node_with(Arc::new(StaticDirectory::new(0))).await;
        let client = node_with(Arc::new(StaticDirectory::new(0))).await;
        server.contacts().upsert(client.public_key(), "127.0.0.1:1");

        let listener = server.listen(0).await.unwrap();
        client
            .contacts()
            .upsert(server.public_key(), listener.local_addr().to_string());

        let mut outbound = client.connect(&server.public_key()).await.unwrap();
        let mut inbound = listener.accept().await.unwrap();

        outbound.write(b"ping").await.unwrap();
        assert_eq!(inbound.read_frame().await.unwrap(), b"ping");

        // Inbound handshakes leave stored addresses alone
        assert_eq!(
            server.contacts().lookup(&client.public_key()).as_deref(),
            Some("127.0.0.1:1")
        );
    }

    #[tokio::test]
    async fn test_connect_via_discovery_updates_contacts() {
        let directory = Arc::new(StaticDirectory::new(0));
        let server = node_with(Arc::new(StaticDirectory::new(0))).await;
        let client = node_with(Arc::clone(&directory)).await;
        server.contacts().upsert(client.public_key(), "127.0.0.1:1");

        let listener = server.listen(0).await.unwrap();
        let addr = listener.local_addr().to_string();
        directory.insert(server.node_id(), addr.clone()).await;

        let _channel = client.connect(&server.public_key()).await.unwrap();
        assert_eq!(client.contacts().lookup(&server.public_key()), Some(addr));
    }

    #[tokio::test]
    async fn test_stale_contact_falls_back_to_discovery() {
        let directory = Arc::new(StaticDirectory::new(0));
        let server = node_with(Arc::new(StaticDirectory::new(0))).await;
        let client = node_with(Arc::clone(&directory)).await;
        server.contacts().upsert(client.public_key(), "127.0.0.1:1");

        let listener = server.listen(0).await.unwrap();
        let addr = listener.local_addr().to_string();

        // Nothing listens on the stale port
        let stale = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let stale_addr = stale.local_addr().unwrap().to_string();
        drop(stale);
        client.contacts().upsert(server.public_key(), stale_addr);
        directory.insert(server.node_id(), addr.clone()).await;

        let _channel = client.connect(&server.public_key()).await.unwrap();
        assert_eq!(client.contacts().lookup(&server.public_key()), Some(addr));
    }

    #[tokio::test]
    async fn test_connect_unknown_peer() {
        let node = node_with(Arc::new(StaticDirectory::new(0))).await;
        let stranger = Identity::generate(&mut OsRng).public_key();

        assert!(matches!(
            node.connect(&stranger).await,
            Err(Error::PeerNotFound(k)) if k == stranger
        ));
    }

    #[tokio::test]
    async fn test_connect_self_rejected() {
        let node = node_with(Arc::new(StaticDirectory::new(0))).await;
        assert!(matches!(
            node.connect(&node.public_key()).await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown() {
        let directory = Arc::new(StaticDirectory::new(0));
        let node = node_with(Arc::clone(&directory)).await;
        assert!(directory.is_running());

        node.shutdown().await.unwrap();
        assert!(!node.is_running());
        assert!(!directory.is_running());

        assert!(matches!(
            node.shutdown().await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(node.listen(0).await, Err(Error::InvalidState(_))));
    }
}
