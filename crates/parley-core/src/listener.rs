//! Inbound connection pipeline.
//!
//! ```text
//! TcpListener ──accept──► worker (respond) ──ok──► delivery queue ──► accept()
//!                              │
//!                              └──err──► tracing::warn! + ListenerStats
//! ```
//!
//! The accept loop is one task that only waits on the socket. Every accepted
//! connection gets its own handshake task, so a slow or silent peer never holds
//! up others. Channels reach `accept()` in handshake completion order.
//!
//! # Close Policy
//!
//! Closing cancels: the accept loop stops, in-flight handshakes are aborted
//! and their connections dropped, channels still queued are discarded, and
//! every pending or later `accept()` returns [`Error::ListenerClosed`].

use crate::channel::SecureChannel;
use crate::contacts::ContactList;
use crate::error::{Error, Result};
use crate::handshake::respond;
use crate::node::config::{ChannelConfig, HandshakeConfig, ListenerConfig};
use parley_crypto::Identity;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

/// Everything a handshake worker needs, shared read-only across workers.
#[derive(Debug, Clone)]
pub struct HandshakeContext {
    /// Local long-term identity
    pub identity: Arc<Identity>,
    /// Authorization table
    pub contacts: Arc<ContactList>,
    /// Handshake limits
    pub handshake: HandshakeConfig,
    /// Settings for established channels
    pub channel: ChannelConfig,
}

/// Listener counters (point-in-time snapshot)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    /// Raw connections accepted
    pub accepted: u64,
    /// Handshakes that produced a channel
    pub established: u64,
    /// Handshakes that failed for any reason
    pub failed: u64,
    /// Failures due to the initiator not being a contact
    pub unauthorized: u64,
    /// Failures due to the handshake timeout
    pub timed_out: u64,
    /// Connections dropped because too many handshakes were in flight
    pub rejected_overload: u64,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    established: AtomicU64,
    failed: AtomicU64,
    unauthorized: AtomicU64,
    timed_out: AtomicU64,
    rejected_overload: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            established: self.established.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            rejected_overload: self.rejected_overload.load(Ordering::Relaxed),
        }
    }
}

/// Accepts raw connections and delivers authenticated channels.
#[derive(Debug)]
pub struct Listener {
    local_addr: SocketAddr,
    channels: Mutex<mpsc::Receiver<SecureChannel>>,
    shutdown: watch::Sender<bool>,
    counters: Arc<Counters>,
    accept_loop: JoinHandle<()>,
}

impl Listener {
    /// Bind `addr` and start the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for invalid listener, handshake or
    /// channel settings, and [`Error::Bind`] if the socket cannot be created,
    /// bound, or put into listening mode.
    pub async fn bind(
        addr: SocketAddr,
        context: HandshakeContext,
        config: &ListenerConfig,
    ) -> Result<Self> {
        config.validate()?;
        context.handshake.validate()?;
        context.channel.validate()?;

        let std_listener =
            bind_socket(addr, config.backlog).map_err(|source| Error::Bind { addr, source })?;
        let listener =
            TcpListener::from_std(std_listener).map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| Error::Bind { addr, source })?;

        let (tx, rx) = mpsc::channel(config.delivery_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let accept_loop = tokio::spawn(accept_loop(
            listener,
            context,
            config.max_pending_handshakes,
            tx,
            shutdown_rx,
            Arc::clone(&counters),
        ));

        tracing::info!("Listening on {}", local_addr);

        Ok(Self {
            local_addr,
            channels: Mutex::new(rx),
            shutdown,
            counters,
            accept_loop,
        })
    }

    /// Bound address (resolves port 0)
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next authenticated channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ListenerClosed`] once [`Self::close`] has been called,
    /// including for callers already waiting.
    pub async fn accept(&self) -> Result<SecureChannel> {
        let shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Err(Error::ListenerClosed);
        }

        tokio::select! {
            biased;
            () = wait_closed(shutdown) => Err(Error::ListenerClosed),
            channel = async { self.channels.lock().await.recv().await } => {
                channel.ok_or(Error::ListenerClosed)
            }
        }
    }

    /// Stop accepting and cancel in-flight handshakes. Idempotent.
    pub fn close(&self) {
        if !self.shutdown.send_replace(true) {
            tracing::info!("Closing listener on {}", self.local_addr);
        }
        self.accept_loop.abort();
    }

    /// Whether [`Self::close`] has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> ListenerStats {
        self.counters.snapshot()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

fn bind_socket(addr: SocketAddr, backlog: i32) -> std::io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

async fn wait_closed(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    context: HandshakeContext,
    max_pending: usize,
    delivery: mpsc::Sender<SecureChannel>,
    shutdown: watch::Receiver<bool>,
    counters: Arc<Counters>,
) {
    let mut workers = JoinSet::new();
    let closed = wait_closed(shutdown);
    tokio::pin!(closed);

    loop {
        tokio::select! {
            () = &mut closed => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    counters.accepted.fetch_add(1, Ordering::Relaxed);
                    if workers.len() >= max_pending {
                        counters.rejected_overload.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            "Dropping connection from {}: {} handshakes in flight",
                            peer_addr,
                            workers.len()
                        );
                        continue;
                    }
                    workers.spawn(handshake_worker(
                        stream,
                        peer_addr,
                        context.clone(),
                        delivery.clone(),
                        Arc::clone(&counters),
                    ));
                }
                Err(e) => {
                    // Usually fd exhaustion; back off instead of spinning
                    tracing::warn!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            },
            Some(joined) = workers.join_next(), if !workers.is_empty() => {
                if let Err(e) = joined {
                    tracing::warn!("Handshake worker ended abnormally: {}", e);
                }
            }
        }
    }

    workers.shutdown().await;
    tracing::debug!("Accept loop stopped");
}

async fn handshake_worker(
    stream: TcpStream,
    peer_addr: SocketAddr,
    context: HandshakeContext,
    delivery: mpsc::Sender<SecureChannel>,
    counters: Arc<Counters>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("set_nodelay failed for {}: {}", peer_addr, e);
    }

    let result = respond(
        stream,
        &context.identity,
        &context.contacts,
        &context.handshake,
        &context.channel,
    )
    .await;

    match result {
        Ok(channel) => {
            counters.established.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                "Secure channel established with {} at {}",
                hex::encode(&channel.peer().to_bytes()[..8]),
                peer_addr
            );
            if delivery.send(channel).await.is_err() {
                tracing::debug!("Listener gone before channel from {} was delivered", peer_addr);
            }
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            match e {
                Error::UnauthorizedPeer(_) => {
                    counters.unauthorized.fetch_add(1, Ordering::Relaxed);
                }
                Error::HandshakeTimeout => {
                    counters.timed_out.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
            tracing::warn!("Handshake with {} failed: {}", peer_addr, e);
        }
    }
}
