//! Message Protocol Module
//!
//! Defines the envelope exchanged between peers and its mapping onto HTTP.
//!
//! ## Wire Mapping
//! | Kind         | Verb     | Body          |
//! |--------------|----------|---------------|
//! | `Connect`    | `GET`    | none          |
//! | `Disconnect` | `DELETE` | none          |
//! | `Broadcast`  | `POST`   | payload bytes |
//! | `Direct`     | `PUT`    | payload bytes |
//!
//! The sender travels in the `PEER_ADDRESS` / `PEER_PORT` headers (with `Host` as fallback), and
//! an optional `PEER_KIND` header lets browser peers register as streamed.

pub mod protocol;
pub mod types;
