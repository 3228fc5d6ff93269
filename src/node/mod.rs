//! Mesh Node Module
//!
//! A node is one participant of the full mesh. It serves the peer protocol over HTTP and drives
//! joins, leaves and outbound messages from a single control task.
//!
//! ## Core Concepts
//! - **Control task**: `connect`, `disconnect`, `broadcast` and `send` are queued on one channel and
//!   applied in submission order.
//! - **Delivery tasks**: every outbound request runs on its own task; failures surface on the
//!   error channel of `NodeEvents` instead of failing the caller.
//! - **Streams**: browser peers register as streamed and receive their payloads on `/sse`.
//! - **Shutdown**: a connected node leaves the mesh, closes every stream and stops its server.

pub mod actions;
pub mod config;
pub mod error;
pub mod handlers;
pub mod service;
