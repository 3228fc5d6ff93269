//! Membership Registry Module
//!
//! Keeps the local view of the mesh: every peer this node knows about, keyed by its
//! `address:port` identity.
//!
//! ## Core Mechanisms
//! - **Single Lock**: every operation runs inside one critical section, so appends, deletes and
//!   snapshots never interleave.
//! - **Delivery Queues**: streamed peers cannot be dialed, so the registry allocates a bounded
//!   queue for them on append. The streaming endpoint drains it; broadcasts push into it.
//! - **Wire Format**: the peer list (never the queues) is exchanged as a JSON array during joins.

pub mod registry;

#[cfg(test)]
mod tests;
