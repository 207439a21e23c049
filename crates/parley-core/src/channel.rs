//! Encrypted channel over a raw byte stream.
//!
//! A [`SecureChannel`] is created only by a successful handshake. It owns the
//! raw stream and the two directional cipher states expanded from the
//! handshake's SharedKey; the SharedKey itself is zeroized once expanded.
//!
//! # Frame Format
//!
//! ```text
//! ┌────────────────┬──────────────┬──────────────────────────────┐
//! │ counter (8 BE) │ length (4 BE)│ ciphertext || tag (length B) │
//! └────────────────┴──────────────┴──────────────────────────────┘
//! ```
//!
//! The 12-byte header is authenticated as associated data. Each direction
//! has its own key and counter starting at zero; the receiver accepts only the
//! exact next counter, so replayed, reordered, or dropped frames fail
//! authentication.
//!
//! Any read or write error poisons the channel: the stream is dropped and
//! every later call returns [`Error::ConnectionClosed`].

use crate::error::{Error, Result};
use crate::node::config::ChannelConfig;
use parley_crypto::aead::{CipherState, TAG_SIZE};
use parley_crypto::{ChannelKeys, PublicKey, SharedKey};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

/// Frame header size: counter plus length
pub const FRAME_HEADER_SIZE: usize = 12;

/// Which end of the handshake this channel is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sent the handshake request
    Initiator,
    /// Accepted the handshake request
    Responder,
}

/// Authenticated, encrypted, bidirectional channel.
pub struct SecureChannel<S = TcpStream> {
    stream: Option<S>,
    peer: PublicKey,
    role: Role,
    sender: CipherState,
    receiver: CipherState,
    max_frame_size: usize,
    pending: Vec<u8>,
}

impl<S> SecureChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Bind a stream to the key negotiated with `peer`.
    pub(crate) fn new(
        stream: S,
        key: SharedKey,
        role: Role,
        peer: PublicKey,
        config: &ChannelConfig,
    ) -> Self {
        let ChannelKeys {
            initiator_to_responder,
            responder_to_initiator,
        } = key.channel_keys();
        drop(key);

        let (sender, receiver) = match role {
            Role::Initiator => (initiator_to_responder, responder_to_initiator),
            Role::Responder => (responder_to_initiator, initiator_to_responder),
        };

        Self {
            stream: Some(stream),
            peer,
            role,
            sender,
            receiver,
            max_frame_size: config.max_frame_size,
            pending: Vec::new(),
        }
    }

    /// Authenticated identity of the remote end
    #[must_use]
    pub fn peer(&self) -> &PublicKey {
        &self.peer
    }

    /// Role this end played in the handshake
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the channel can still be used
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Encrypt and send `data`, split into frames of at most `max_frame_size`.
    ///
    /// Returns the number of plaintext bytes written (all of `data`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] on a closed or poisoned channel,
    /// and poisons the channel on any I/O or cipher error.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;
        match send_frames(stream, &mut self.sender, data, self.max_frame_size).await {
            Ok(n) => Ok(n),
            Err(e) => {
                self.stream = None;
                Err(e)
            }
        }
    }

    /// Read decrypted bytes into `buf` with byte-stream semantics.
    ///
    /// Bytes of a frame that do not fit in `buf` are kept for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthenticationFailed`] on a tampered frame and
    /// [`Error::ConnectionClosed`] on EOF; both poison the channel.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pending.is_empty() {
            self.pending = self.read_frame().await?;
        }
        Ok(drain_into(&mut self.pending, buf))
    }

    /// Read the next whole frame (message semantics).
    ///
    /// Bytes left over from a partial [`Self::read`] are returned first.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read`].
    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        if !self.pending.is_empty() {
            return Ok(std::mem::take(&mut self.pending));
        }
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;
        match recv_frame(stream, &mut self.receiver, self.max_frame_size).await {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.stream = None;
                Err(e)
            }
        }
    }

    /// Shut down and release the raw stream. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the stream's shutdown fails; the stream is
    /// released either way.
    pub async fn close(&mut self) -> Result<()> {
        self.pending.clear();
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }

    /// Split into halves usable from separate tasks.
    #[must_use]
    pub fn split(self) -> (ChannelSender<WriteHalf<S>>, ChannelReceiver<ReadHalf<S>>) {
        let (read_half, write_half) = match self.stream {
            Some(stream) => {
                let (r, w) = tokio::io::split(stream);
                (Some(r), Some(w))
            }
            None => (None, None),
        };

        (
            ChannelSender {
                stream: write_half,
                peer: self.peer,
                cipher: self.sender,
                max_frame_size: self.max_frame_size,
            },
            ChannelReceiver {
                stream: read_half,
                peer: self.peer,
                cipher: self.receiver,
                max_frame_size: self.max_frame_size,
                pending: self.pending,
            },
        )
    }
}

impl SecureChannel<TcpStream> {
    /// Remote socket address, if the channel is open
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }
}

impl<S> std::fmt::Debug for SecureChannel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("peer", &self.peer)
            .field("role", &self.role)
            .field("open", &self.stream.is_some())
            .field("sent", &self.sender.counter())
            .field("received", &self.receiver.counter())
            .finish()
    }
}

/// Sending half of a split channel
pub struct ChannelSender<W> {
    stream: Option<W>,
    peer: PublicKey,
    cipher: CipherState,
    max_frame_size: usize,
}

impl<W> ChannelSender<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Authenticated identity of the remote end
    #[must_use]
    pub fn peer(&self) -> &PublicKey {
        &self.peer
    }

    /// See [`SecureChannel::write`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] once closed or poisoned.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;
        match send_frames(stream, &mut self.cipher, data, self.max_frame_size).await {
            Ok(n) => Ok(n),
            Err(e) => {
                self.stream = None;
                Err(e)
            }
        }
    }

    /// Shut down the write direction. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the shutdown fails.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

/// Receiving half of a split channel
pub struct ChannelReceiver<R> {
    stream: Option<R>,
    peer: PublicKey,
    cipher: CipherState,
    max_frame_size: usize,
    pending: Vec<u8>,
}

impl<R> ChannelReceiver<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Authenticated identity of the remote end
    #[must_use]
    pub fn peer(&self) -> &PublicKey {
        &self.peer
    }

    /// See [`SecureChannel::read`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthenticationFailed`] on a tampered frame.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pending.is_empty() {
            self.pending = self.read_frame().await?;
        }
        Ok(drain_into(&mut self.pending, buf))
    }

    /// See [`SecureChannel::read_frame`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthenticationFailed`] on a tampered frame.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        if !self.pending.is_empty() {
            return Ok(std::mem::take(&mut self.pending));
        }
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;
        match recv_frame(stream, &mut self.cipher, self.max_frame_size).await {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.stream = None;
                Err(e)
            }
        }
    }
}

fn drain_into(pending: &mut Vec<u8>, buf: &mut [u8]) -> usize {
    let n = pending.len().min(buf.len());
    buf[..n].copy_from_slice(&pending[..n]);
    pending.drain(..n);
    n
}

async fn send_frames<W>(
    stream: &mut W,
    cipher: &mut CipherState,
    data: &[u8],
    max_frame_size: usize,
) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    for chunk in data.chunks(max_frame_size) {
        let counter = cipher.next_counter()?;
        let len = u32::try_from(chunk.len() + TAG_SIZE)
            .map_err(|_| Error::FrameTooLarge(chunk.len() + TAG_SIZE))?;

        let mut header = [0u8; FRAME_HEADER_SIZE];
        header[..8].copy_from_slice(&counter.to_be_bytes());
        header[8..].copy_from_slice(&len.to_be_bytes());

        let ciphertext = cipher.encrypt(counter, chunk, &header)?;

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + ciphertext.len());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&ciphertext);
        stream.write_all(&frame).await?;
    }
    stream.flush().await?;
    Ok(data.len())
}

async fn recv_frame<R>(
    stream: &mut R,
    cipher: &mut CipherState,
    max_frame_size: usize,
) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    crate::wire::read_exact_or_eof(stream, &mut header, true).await?;

    let mut counter_bytes = [0u8; 8];
    counter_bytes.copy_from_slice(&header[..8]);
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&header[8..]);
    let counter = u64::from_be_bytes(counter_bytes);
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > max_frame_size + TAG_SIZE {
        return Err(Error::FrameTooLarge(len));
    }
    if len < TAG_SIZE {
        return Err(Error::AuthenticationFailed);
    }

    let mut body = vec![0u8; len];
    crate::wire::read_exact_or_eof(stream, &mut body, false).await?;

    if counter != cipher.counter() {
        tracing::debug!(
            "Frame counter {} does not match expected {}",
            counter,
            cipher.counter()
        );
        return Err(Error::AuthenticationFailed);
    }

    let plaintext = cipher
        .decrypt(counter, &body, &header)
        .map_err(|_| Error::AuthenticationFailed)?;
    cipher.next_counter()?;
    Ok(plaintext)
}
