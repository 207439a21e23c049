//! Length-prefixed message I/O over raw byte streams.
//!
//! Handshake messages are `[8-byte BE length N][N bytes]`. A stream that ends
//! before the first header byte is [`Error::ConnectionClosed`]; one that ends
//! part way through a header or body is [`Error::ShortRead`].

use crate::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Handshake length header size
pub const LENGTH_PREFIX_SIZE: usize = 8;

/// Read until `buf` is full or the stream ends, returning the bytes read.
pub(crate) async fn read_full<S>(stream: &mut S, buf: &mut [u8]) -> Result<usize>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read exactly `buf.len()` bytes. `at_boundary` marks a read that may
/// legitimately hit a clean EOF before any byte arrives.
pub(crate) async fn read_exact_or_eof<S>(
    stream: &mut S,
    buf: &mut [u8],
    at_boundary: bool,
) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    let n = read_full(stream, buf).await?;
    if n == buf.len() {
        return Ok(());
    }
    if n == 0 && at_boundary {
        return Err(Error::ConnectionClosed);
    }
    Err(Error::ShortRead {
        expected: buf.len(),
        actual: n,
    })
}

/// Read one length-prefixed message of at most `max_size` bytes.
///
/// # Errors
///
/// Returns [`Error::MalformedHandshake`] if the header announces more than
/// `max_size` bytes (nothing is allocated for the body in that case).
pub async fn read_message<S>(stream: &mut S, max_size: usize) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    read_exact_or_eof(stream, &mut header, true).await?;

    let announced = u64::from_be_bytes(header);
    let len = usize::try_from(announced)
        .ok()
        .filter(|len| *len <= max_size)
        .ok_or_else(|| Error::malformed("message exceeds maximum size"))?;

    let mut body = vec![0u8; len];
    read_exact_or_eof(stream, &mut body, false).await?;
    Ok(body)
}

/// Write one length-prefixed message and flush.
///
/// # Errors
///
/// Returns [`Error::Io`] if the stream rejects the write.
pub async fn write_message<S>(stream: &mut S, body: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut out = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    out.extend_from_slice(&(body.len() as u64).to_be_bytes());
    out.extend_from_slice(body);
    stream.write_all(&out).await?;
    stream.flush().await?;
    Ok(())
}
