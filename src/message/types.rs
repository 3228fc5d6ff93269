use reqwest::Method;
use std::fmt;

use crate::peer::types::Peer;

/// Closed set of message kinds. Every `match` on it is exhaustive, so adding a kind forces the
/// encoder, the decoder and the dispatcher to be updated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Connect,
    Disconnect,
    Broadcast,
    Direct,
}

impl MessageKind {
    pub fn method(&self) -> Method {
        match self {
            MessageKind::Connect => Method::GET,
            MessageKind::Disconnect => Method::DELETE,
            MessageKind::Broadcast => Method::POST,
            MessageKind::Direct => Method::PUT,
        }
    }

    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(MessageKind::Connect),
            Method::DELETE => Some(MessageKind::Disconnect),
            Method::POST => Some(MessageKind::Broadcast),
            Method::PUT => Some(MessageKind::Direct),
            _ => None,
        }
    }

    /// Whether the request body carries a payload for this kind.
    pub fn carries_payload(&self) -> bool {
        match self {
            MessageKind::Connect | MessageKind::Disconnect => false,
            MessageKind::Broadcast | MessageKind::Direct => true,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Connect => "connect",
            MessageKind::Disconnect => "disconnect",
            MessageKind::Broadcast => "broadcast",
            MessageKind::Direct => "direct",
        };
        f.write_str(name)
    }
}

/// Envelope exchanged between peers.
///
/// `from` and `to` are optional while a message is being assembled; the encoder refuses a
/// message without a sender, and a `Direct` message without a recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub from: Option<Peer>,
    pub to: Option<Peer>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            from: None,
            to: None,
            payload: Vec::new(),
        }
    }

    pub fn connect(from: Peer) -> Self {
        Self::new(MessageKind::Connect).with_from(from)
    }

    pub fn disconnect(from: Peer) -> Self {
        Self::new(MessageKind::Disconnect).with_from(from)
    }

    pub fn broadcast(from: Peer, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(MessageKind::Broadcast)
            .with_from(from)
            .with_payload(payload)
    }

    pub fn direct(from: Peer, to: Peer, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(MessageKind::Direct)
            .with_from(from)
            .with_to(to)
            .with_payload(payload)
    }

    pub fn with_from(mut self, from: Peer) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_to(mut self, to: Peer) -> Self {
        self.to = Some(to);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Payload as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.from {
            Some(from) => write!(f, "[{}] {}", from, self.text()),
            None => write!(f, "[unknown] {}", self.text()),
        }
    }
}
