//! Handshake state machines.
//!
//! ```text
//! Initiator                                   Responder
//!   seal(responder, [eph_i][initiator]) ──►   open, decode, authorize
//!                                       ◄──   [eph_r][sign_r(transcript)]
//!   verify sign_r
//!   [sign_i(transcript)]                ──►   verify sign_i
//! ```
//!
//! Both sides derive the SharedKey from `X25519(eph_i, eph_r)` and the
//! transcript. The responder sends nothing on failure.

use super::codec::{HandshakeFinish, HandshakeResponse, decode_request, encode_request};
use crate::channel::{Role, SecureChannel};
use crate::contacts::ContactList;
use crate::error::{Error, Result};
use crate::node::config::{ChannelConfig, HandshakeConfig};
use crate::wire::{read_message, write_message};
use parley_crypto::{EphemeralSecret, Identity, PublicKey, SharedKey, Transcript, sealed};
use rand_core::OsRng;
use tokio::io::{AsyncRead, AsyncWrite};

/// Label for the responder's transcript signature
pub const RESPONSE_LABEL: &[u8] = b"parley/response";

/// Label for the initiator's transcript signature
pub const FINISH_LABEL: &[u8] = b"parley/finish";

/// Run the responder side on an accepted stream.
///
/// On success the returned channel's [`SecureChannel::peer`] is an initiator
/// that is in `contacts` and proved possession of its private key.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] for invalid settings,
/// [`Error::HandshakeTimeout`] if the exchange exceeds `config.timeout`, or
/// the error of the step that failed.
pub async fn respond<S>(
    mut stream: S,
    identity: &Identity,
    contacts: &ContactList,
    config: &HandshakeConfig,
    channel: &ChannelConfig,
) -> Result<SecureChannel<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    config.validate()?;
    channel.validate()?;

    let (peer, key) = tokio::time::timeout(
        config.timeout,
        respond_keys(&mut stream, identity, contacts, config.max_message_size),
    )
    .await
    .map_err(|_| Error::HandshakeTimeout)??;

    Ok(SecureChannel::new(stream, key, Role::Responder, peer, channel))
}

/// Run the initiator side against a responder whose identity is known.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] for invalid settings,
/// [`Error::InvalidState`] when dialing one's own identity,
/// [`Error::InvalidSignature`] if the responder cannot prove its identity,
/// and [`Error::HandshakeTimeout`] if the exchange exceeds `config.timeout`.
pub async fn initiate<S>(
    mut stream: S,
    identity: &Identity,
    responder: &PublicKey,
    config: &HandshakeConfig,
    channel: &ChannelConfig,
) -> Result<SecureChannel<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    config.validate()?;
    channel.validate()?;
    if *responder == identity.public_key() {
        return Err(Error::invalid_state("cannot connect to own identity"));
    }

    let key = tokio::time::timeout(
        config.timeout,
        initiate_keys(&mut stream, identity, responder, config.max_message_size),
    )
    .await
    .map_err(|_| Error::HandshakeTimeout)??;

    Ok(SecureChannel::new(
        stream,
        key,
        Role::Initiator,
        *responder,
        channel,
    ))
}

pub(crate) async fn respond_keys<S>(
    stream: &mut S,
    identity: &Identity,
    contacts: &ContactList,
    max_message_size: usize,
) -> Result<(PublicKey, SharedKey)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let sealed_request = read_message(stream, max_message_size).await?;
    let plaintext =
        sealed::open(identity, &sealed_request).map_err(|_| Error::DecryptionFailed)?;
    let request = decode_request(&plaintext)?;

    if !contacts.is_authorized(&request.initiator) {
        return Err(Error::UnauthorizedPeer(request.initiator));
    }

    let local = identity.public_key();
    let ephemeral = EphemeralSecret::generate(&mut OsRng);
    let ephemeral_public = ephemeral.public_key();
    let transcript = Transcript::new(
        &request.initiator,
        &local,
        &request.ephemeral,
        &ephemeral_public,
    );
    let secret = ephemeral
        .agree(&request.ephemeral)
        .ok_or_else(|| Error::malformed("non-contributory ephemeral key"))?;
    let key = SharedKey::derive(&secret, &transcript);

    let response = HandshakeResponse {
        ephemeral: ephemeral_public,
        signature: identity.sign(&transcript.signing_payload(RESPONSE_LABEL)),
    };
    write_message(stream, &response.encode()).await?;

    let finish = HandshakeFinish::decode(&read_message(stream, max_message_size).await?)?;
    request
        .initiator
        .verify(&transcript.signing_payload(FINISH_LABEL), &finish.signature)
        .map_err(|_| Error::InvalidSignature)?;

    tracing::debug!(
        "Responder handshake complete with {}",
        hex::encode(&request.initiator.to_bytes()[..8])
    );
    Ok((request.initiator, key))
}

pub(crate) async fn initiate_keys<S>(
    stream: &mut S,
    identity: &Identity,
    responder: &PublicKey,
    max_message_size: usize,
) -> Result<SharedKey>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let local = identity.public_key();
    let ephemeral = EphemeralSecret::generate(&mut OsRng);
    let ephemeral_public = ephemeral.public_key();

    let body = encode_request(&local, &ephemeral_public);
    let sealed_request = sealed::seal(responder, &body, &mut OsRng)?;
    write_message(stream, &sealed_request).await?;

    let response = HandshakeResponse::decode(&read_message(stream, max_message_size).await?)?;
    let transcript = Transcript::new(&local, responder, &ephemeral_public, &response.ephemeral);
    responder
        .verify(&transcript.signing_payload(RESPONSE_LABEL), &response.signature)
        .map_err(|_| Error::InvalidSignature)?;

    let secret = ephemeral
        .agree(&response.ephemeral)
        .ok_or_else(|| Error::malformed("non-contributory ephemeral key"))?;
    let key = SharedKey::derive(&secret, &transcript);

    let finish = HandshakeFinish {
        signature: identity.sign(&transcript.signing_payload(FINISH_LABEL)),
    };
    write_message(stream, &finish.encode()).await?;

    tracing::debug!(
        "Initiator handshake complete with {}",
        hex::encode(&responder.to_bytes()[..8])
    );
    Ok(key)
}
