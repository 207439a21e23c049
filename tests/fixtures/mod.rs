//! Reusable test peers.

mod test_peer;

pub use test_peer::{TestPeer, localhost_config};
