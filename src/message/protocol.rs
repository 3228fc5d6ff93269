//! HTTP encoding of peer messages.
//!
//! Outbound messages become `reqwest` requests; inbound `axum` requests are decoded back into
//! `Message` values. Both sides use the same header and path constants.

use axum::http::HeaderMap;
use axum::http::header::HOST;
use std::time::Duration;

use super::types::{Message, MessageKind};
use crate::node::error::{NodeError, NodeResult};
use crate::peer::types::{Peer, PeerKind};

// --- Transport constants ---

/// Header carrying the sender's address.
pub const HEADER_PEER_ADDRESS: &str = "PEER_ADDRESS";
/// Header carrying the sender's port.
pub const HEADER_PEER_PORT: &str = "PEER_PORT";
/// Optional header carrying the sender's kind (`direct` or `streamed`).
pub const HEADER_PEER_KIND: &str = "PEER_KIND";

/// Path serving every message verb.
pub const ENDPOINT_MESSAGES: &str = "/";
/// Path serving the server-push stream for streamed peers.
pub const ENDPOINT_STREAM: &str = "/sse";
/// Query parameter identifying the streamed peer.
pub const STREAM_FROM_PARAM: &str = "from";

/// Builds the outbound request that delivers `message` to `target`.
///
/// Fails before touching the network when the message has no sender, or when a `Direct`
/// message has no recipient.
pub fn encode_request(
    client: &reqwest::Client,
    message: &Message,
    target: &Peer,
    timeout: Duration,
) -> NodeResult<reqwest::RequestBuilder> {
    let from = message.from.as_ref().ok_or_else(|| {
        NodeError::Parsing(format!(
            "{} message has no sender, the requester cannot be identified",
            message.kind
        ))
    })?;

    let body = match message.kind {
        MessageKind::Connect | MessageKind::Disconnect => None,
        MessageKind::Broadcast => Some(message.payload.clone()),
        MessageKind::Direct => {
            if message.to.is_none() {
                return Err(NodeError::Parsing(
                    "direct message has no recipient".to_string(),
                ));
            }
            Some(message.payload.clone())
        }
    };

    let url = format!("{}{}", target.hostname(), ENDPOINT_MESSAGES);
    let mut request = client
        .request(message.kind.method(), url)
        .header(HEADER_PEER_ADDRESS, from.address())
        .header(HEADER_PEER_PORT, from.port().to_string())
        .header(HEADER_PEER_KIND, from.kind().as_str())
        .timeout(timeout);

    if let Some(body) = body {
        request = request.body(body);
    }

    Ok(request)
}

/// Identifies the sender of an inbound request.
///
/// The `PEER_ADDRESS`/`PEER_PORT` headers win; the `Host` header is only consulted when they are
/// absent. Returns `None` when no valid identity can be derived.
pub fn decode_sender(headers: &HeaderMap) -> Option<Peer> {
    let address = header_str(headers, HEADER_PEER_ADDRESS);
    let port = header_str(headers, HEADER_PEER_PORT);

    let peer = match (address, port) {
        (Some(address), Some(port)) => {
            let port: u16 = port.parse().ok()?;
            Peer::new(address, port).ok()?
        }
        (None, None) => Peer::parse(header_str(headers, HOST.as_str())?).ok()?,
        _ => return None,
    };

    let kind = header_str(headers, HEADER_PEER_KIND)
        .and_then(|kind| kind.parse::<PeerKind>().ok())
        .unwrap_or_default();

    Some(peer.with_kind(kind))
}

/// Rebuilds a message from an inbound request already classified as `kind`.
///
/// `local` becomes the recipient of `Direct` messages. Returns `None` when the sender cannot be
/// identified; callers treat that as a protocol violation.
pub fn decode_message(
    kind: MessageKind,
    headers: &HeaderMap,
    body: &[u8],
    local: &Peer,
) -> Option<Message> {
    let from = decode_sender(headers)?;
    let message = Message::new(kind).with_from(from);

    let message = match kind {
        MessageKind::Connect | MessageKind::Disconnect => message,
        MessageKind::Broadcast => message.with_payload(body.to_vec()),
        MessageKind::Direct => message.with_to(local.clone()).with_payload(body.to_vec()),
    };

    Some(message)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
