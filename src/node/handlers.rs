use axum::body::{Body, Bytes};
use axum::extract::{Extension, Query};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Router, middleware};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;

use super::service::NodeShared;
use crate::message::protocol::{ENDPOINT_MESSAGES, ENDPOINT_STREAM, decode_message};
use crate::message::types::{Message, MessageKind};
use crate::node::error::NodeError;
use crate::peer::types::Peer;

const EVENT_STREAM: &str = "text/event-stream";
const KEEP_ALIVE_FRAME: &[u8] = b":\n\n";

pub fn router(node: Arc<NodeShared>) -> Router {
    Router::new()
        .route(ENDPOINT_MESSAGES, any(handle_request))
        .route(ENDPOINT_STREAM, get(handle_stream))
        .layer(middleware::map_response(cors_headers))
        .layer(Extension(node))
}

async fn cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    response
}

/// Entry point for every peer message. The verb selects the message kind.
pub async fn handle_request(
    Extension(node): Extension<Arc<NodeShared>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    let Some(kind) = MessageKind::from_method(&method) else {
        return (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response();
    };

    let Some(message) = decode_message(kind, &headers, &body, &node.local) else {
        tracing::debug!("Rejected {} request without a sender identity", method);
        return (StatusCode::BAD_REQUEST, "No valid message provided").into_response();
    };

    let Some(from) = message.from.clone() else {
        return (StatusCode::BAD_REQUEST, "No valid message provided").into_response();
    };

    if from == node.local {
        return (
            StatusCode::BAD_REQUEST,
            "You can not connect with yourself.",
        )
            .into_response();
    }

    match kind {
        MessageKind::Connect => handle_connect(&node, from),
        MessageKind::Broadcast | MessageKind::Direct => handle_data(&node, message).await,
        MessageKind::Disconnect => handle_disconnect(&node, &from),
    }
}

fn handle_connect(node: &NodeShared, from: Peer) -> Response {
    // The joining peer gets the membership as it was before its own registration
    let members = match node.members.to_wire_format() {
        Ok(members) => members,
        Err(e) => {
            let error = NodeError::parsing("error encoding members", e);
            node.report(error.clone());
            return (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response();
        }
    };

    tracing::info!("{} connected to {} ({})", from, node.local, from.kind().as_str());
    node.register(from);

    (
        StatusCode::OK,
        [(CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
        members,
    )
        .into_response()
}

async fn handle_data(node: &NodeShared, message: Message) -> Response {
    let registered = message
        .from
        .as_ref()
        .is_some_and(|from| node.members.contains(from));
    if !registered {
        return (StatusCode::FORBIDDEN, "Peer not registered").into_response();
    }

    tracing::debug!("{} received {}: {}", node.local, message.kind, message);

    match node.deliver_inbox(message).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            node.report(e.clone());
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

fn handle_disconnect(node: &NodeShared, from: &Peer) -> Response {
    if !node.members.delete(from) {
        return (StatusCode::FORBIDDEN, "Peer not registered").into_response();
    }

    tracing::info!("{} left {}", from, node.local);
    node.mark_disconnected_if_empty();

    StatusCode::OK.into_response()
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    from: Option<String>,
}

/// Holds a server-push stream open for a streamed peer.
pub async fn handle_stream(
    Extension(node): Extension<Arc<NodeShared>>,
    Query(params): Query<StreamParams>,
) -> Response {
    let Some(host) = params.from.filter(|host| !host.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "no from query parameter provided").into_response();
    };

    let Ok(peer) = Peer::parse(&host) else {
        return (
            StatusCode::BAD_REQUEST,
            "error parsing from query parameter provided",
        )
            .into_response();
    };

    if !node.members.contains(&peer) {
        return (StatusCode::FORBIDDEN, "Peer not registered").into_response();
    }

    let Some(stream) = node.members.take_stream(&peer) else {
        return (StatusCode::CONFLICT, "Peer has no available stream").into_response();
    };

    tracing::info!("{} opened a stream on {}", peer, node.local);

    let keep_alive = node.config.stream_keep_alive;
    let guard = StreamGuard {
        node: node.clone(),
        peer: stream.peer.clone(),
        generation: stream.generation,
    };

    // Idle periods emit a comment frame
    let frames = futures::stream::unfold((stream, guard), move |(mut stream, guard)| async move {
        let frame = match tokio::time::timeout(keep_alive, stream.recv()).await {
            Ok(Some(payload)) => event_frame(&payload),
            Ok(None) => return None,
            Err(_) => Bytes::from_static(KEEP_ALIVE_FRAME),
        };
        Some((Ok::<Bytes, Infallible>(frame), (stream, guard)))
    });

    (
        [(CONTENT_TYPE, EVENT_STREAM), (CACHE_CONTROL, "no-cache")],
        Body::from_stream(frames),
    )
        .into_response()
}

/// Frames a payload as one `data:` event. The payload bytes are written untouched.
fn event_frame(payload: &[u8]) -> Bytes {
    let mut frame = Vec::with_capacity(payload.len() + 8);
    frame.extend_from_slice(b"data: ");
    frame.extend_from_slice(payload);
    frame.extend_from_slice(b"\n\n");
    Bytes::from(frame)
}

/// Unregisters a streamed peer once its stream is dropped.
struct StreamGuard {
    node: Arc<NodeShared>,
    peer: Peer,
    generation: u64,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self.node.members.delete_generation(&self.peer, self.generation) {
            tracing::info!("{} closed its stream on {}", self.peer, self.node.local);
        }
        self.node.mark_disconnected_if_empty();
    }
}
