//! Full-Mesh Peer Messaging Library
//!
//! Every node keeps a direct link to every other node it knows about and talks to them over plain
//! HTTP. The binary (`main.rs`) is a small chat demo built on top of this crate.
//!
//! ## Architecture Modules
//! - **`peer`**: Peer identity (address + port) and the direct/streamed distinction.
//! - **`membership`**: The thread-safe registry of known peers, their delivery queues and the
//!   JSON member list exchanged on join.
//! - **`message`**: The message envelope and its mapping onto HTTP verbs and headers.
//! - **`node`**: The running node: HTTP handlers, the control task, delivery tasks and shutdown.

pub mod membership;
pub mod message;
pub mod node;
pub mod peer;

pub use message::types::{Message, MessageKind};
pub use node::config::NodeConfig;
pub use node::error::{NodeError, NodeResult};
pub use node::service::{Node, NodeEvents};
pub use peer::types::{Peer, PeerKind};
