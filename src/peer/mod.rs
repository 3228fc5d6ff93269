//! Peer Identity Module
//!
//! A `Peer` is the network identity of a mesh participant: the address and port other nodes
//! dial to reach it, plus the way it receives traffic.
//!
//! ## Peer Kinds
//! - **Direct**: reachable by ordinary outbound HTTP requests.
//! - **Streamed**: cannot be dialed (e.g. a browser client); receives pushes over a long-lived
//!   event stream held open against one node.
//!
//! Identity is value-based: two peers are equal when address and port match, whatever their kind.

pub mod types;

#[cfg(test)]
mod tests;
