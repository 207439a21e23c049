//! Single-node test fixture
//!
//! A [`TestPeer`] is a running [`Node`] on loopback with its own
//! [`StaticDirectory`], so tests can wire up discovery results directly.
//!
//! # Example
//!
//! ```no_run
//! use parley_integration_tests::fixtures::TestPeer;
//!
//! # async fn run() -> parley_core::Result<()> {
//! let alice = TestPeer::new().await?;
//! let bob = TestPeer::new().await?;
//! bob.trust(&alice);
//!
//! let listener = bob.node.listen(0).await?;
//! let addr = listener.local_addr().to_string();
//! let channel = alice.node.connect_addr(&addr, &bob.public_key()).await?;
//! # Ok(())
//! # }
//! ```

use parley_core::{Node, NodeConfig, Result};
use parley_crypto::{Identity, PublicKey};
use parley_discovery::{NodeId, StaticDirectory};
use rand_core::OsRng;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Loopback node configuration with short timeouts
pub fn localhost_config() -> NodeConfig {
    let mut config = NodeConfig {
        listen_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        listen_port: 0,
        dial_timeout: Duration::from_secs(2),
        ..NodeConfig::default()
    };
    config.handshake.timeout = Duration::from_secs(5);
    config
}

/// A running node plus the directory it resolves peers through
pub struct TestPeer {
    /// The node under test
    pub node: Node,
    /// Discovery backing the node
    pub directory: Arc<StaticDirectory>,
}

impl TestPeer {
    /// Start a peer with a fresh identity and [`localhost_config`]
    ///
    /// # Errors
    ///
    /// Returns any error from [`Node::new`].
    pub async fn new() -> Result<Self> {
        Self::with_config(localhost_config()).await
    }

    /// Start a peer with a fresh identity and a custom configuration
    ///
    /// # Errors
    ///
    /// Returns any error from [`Node::new`].
    pub async fn with_config(config: NodeConfig) -> Result<Self> {
        let directory = Arc::new(StaticDirectory::new(config.discovery_port));
        let node = Node::new(Identity::generate(&mut OsRng), config, directory.clone()).await?;
        Ok(Self { node, directory })
    }

    /// This peer's long-term public key
    pub fn public_key(&self) -> PublicKey {
        self.node.public_key()
    }

    /// Authorize `other` to connect inbound.
    ///
    /// The recorded address is unroutable; outbound dials to `other` rely
    /// on discovery or an explicit address.
    pub fn trust(&self, other: &TestPeer) {
        self.node
            .contacts()
            .upsert(other.public_key(), "127.0.0.1:0");
    }

    /// Make `other` resolvable at `addr` through this peer's directory
    pub async fn learn(&self, other: &TestPeer, addr: SocketAddr) {
        let id = NodeId::from_public_key(&other.public_key().to_bytes());
        self.directory.insert(id, addr.to_string()).await;
    }
}
