//! Outbound node operations.
//!
//! Everything here runs on the control task (or on delivery tasks it spawns). Locks are only held
//! inside registry calls, never across a request.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::error::{NodeError, NodeResult};
use super::service::NodeShared;
use crate::membership::registry::decode_peers;
use crate::message::protocol::encode_request;
use crate::message::types::{Message, MessageKind};
use crate::peer::types::Peer;

impl NodeShared {
    /// Joins the mesh through `entry`.
    ///
    /// Nothing is committed unless the entry point answers with a success status and a valid
    /// member list. Every received direct peer is then introduced to concurrently and added to the
    /// registry whatever the outcome; the entry point is added last.
    pub(crate) async fn connect(self: &Arc<Self>, entry: Peer) -> NodeResult<()> {
        if entry == self.local {
            return Err(NodeError::Connection(
                "can not connect with yourself".to_string(),
            ));
        }

        let message = Message::connect(self.local.clone());
        let response = self.dial_with_retry(&message, &entry).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NodeError::Connection(format!(
                "{} http status received from {}",
                status, entry
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NodeError::parsing("error reading peer response body", e))?;
        let received = decode_peers(&body)
            .map_err(|e| NodeError::parsing("error parsing incoming member list", e))?;

        info!(
            "{} joined through {}, introducing to {} member(s)",
            self.local,
            entry,
            received.len()
        );

        let mut introductions = Vec::new();
        for peer in received {
            if peer == self.local {
                continue;
            }
            if peer.is_streamed() {
                debug!("Skipping streamed peer {} held by {}", peer, entry);
                continue;
            }

            introductions.push(tokio::spawn(
                self.clone().deliver(message.clone(), peer.clone()),
            ));
            self.members.append(peer);
        }

        self.register(entry);

        for joined in join_all(introductions).await {
            if let Err(e) = joined {
                self.report(NodeError::internal("introduction task failed", e));
            }
        }

        Ok(())
    }

    /// Leaves the mesh: tells every direct member, then clears the registry.
    ///
    /// Individual delivery failures are reported and never keep the local state from being
    /// cleared. Clearing also closes every open stream.
    pub(crate) async fn disconnect(self: &Arc<Self>) -> NodeResult<()> {
        if !self.is_connected() {
            return Err(NodeError::not_connected());
        }

        let message = Message::disconnect(self.local.clone());
        let farewells: Vec<_> = self
            .members
            .snapshot()
            .into_iter()
            .filter(|peer| !peer.is_streamed())
            .map(|peer| tokio::spawn(self.clone().deliver(message.clone(), peer)))
            .collect();

        for joined in join_all(farewells).await {
            if let Err(e) = joined {
                self.report(NodeError::internal("disconnection task failed", e));
            }
        }

        self.reset();
        info!("{} left the mesh", self.local);

        Ok(())
    }

    /// Routes an outbound message by kind.
    pub(crate) fn dispatch_outbox(
        self: &Arc<Self>,
        message: Message,
        tasks: &mut JoinSet<()>,
    ) -> NodeResult<()> {
        match message.kind {
            MessageKind::Broadcast => self.broadcast(message, tasks),
            MessageKind::Direct => self.send(message, tasks),
            MessageKind::Connect | MessageKind::Disconnect => Err(NodeError::Internal(format!(
                "{} messages are not accepted by the outbox",
                message.kind
            ))),
        }
    }

    /// Pushes to every streamed member's queue and spawns one request per direct member.
    pub(crate) fn broadcast(
        self: &Arc<Self>,
        message: Message,
        tasks: &mut JoinSet<()>,
    ) -> NodeResult<()> {
        if !self.is_connected() {
            return Err(NodeError::not_connected());
        }
        if message.from.is_none() {
            return Err(NodeError::Parsing(
                "broadcast message has no sender".to_string(),
            ));
        }

        let members = self.members.snapshot();
        debug!("{} broadcasting to {} member(s)", self.local, members.len());

        for peer in members {
            self.deliver_to(&message, peer, tasks);
        }

        Ok(())
    }

    /// Delivers a direct message to exactly one member.
    pub(crate) fn send(
        self: &Arc<Self>,
        message: Message,
        tasks: &mut JoinSet<()>,
    ) -> NodeResult<()> {
        if !self.is_connected() {
            return Err(NodeError::not_connected());
        }
        if message.from.is_none() {
            return Err(NodeError::Parsing("direct message has no sender".to_string()));
        }

        let to = message
            .to
            .as_ref()
            .ok_or_else(|| NodeError::Parsing("direct message has no recipient".to_string()))?;
        let recipient = self.members.get(to).ok_or_else(|| {
            NodeError::Connection(format!("target peer {} is not into the network", to))
        })?;

        self.deliver_to(&message, recipient, tasks);
        Ok(())
    }

    /// Streamed peers get the raw payload on their queue; direct peers get a request task.
    fn deliver_to(self: &Arc<Self>, message: &Message, peer: Peer, tasks: &mut JoinSet<()>) {
        if peer.is_streamed() {
            let pushed = match self.members.queue_for(&peer) {
                Some(queue) => queue
                    .push(message.payload.clone())
                    .map_err(|e| NodeError::connection(&format!("error pushing to {}", peer), e)),
                None => Err(NodeError::Connection(format!(
                    "streamed peer {} has no delivery queue",
                    peer
                ))),
            };

            if let Err(e) = pushed {
                self.report(e);
            }
            return;
        }

        tasks.spawn(self.clone().deliver(message.clone(), peer));
    }

    /// Sends one message to one peer, reporting any failure on the error channel.
    pub(crate) async fn deliver(self: Arc<Self>, message: Message, peer: Peer) {
        let result = async {
            let response = encode_request(&self.client, &message, &peer, self.config.request_timeout)?
                .send()
                .await
                .map_err(|e| {
                    NodeError::connection(&format!("error sending {} to {}", message.kind, peer), e)
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(NodeError::Connection(format!(
                    "{} http status received from {} for {}",
                    status, peer, message.kind
                )));
            }

            Ok::<(), NodeError>(())
        }
        .await;

        match result {
            Ok(()) => debug!("Delivered {} to {}", message.kind, peer),
            Err(e) => self.report(e),
        }
    }

    /// Dials the entry point, retrying transport failures with jittered exponential backoff.
    async fn dial_with_retry(
        &self,
        message: &Message,
        entry: &Peer,
    ) -> NodeResult<reqwest::Response> {
        let attempts = self.config.connect_attempts.max(1);
        let mut delay = self.config.retry_base_delay;

        for attempt in 1..=attempts {
            let request =
                encode_request(&self.client, message, entry, self.config.request_timeout)?;

            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempt == attempts {
                        return Err(NodeError::connection(
                            &format!("error trying to connect to {}", entry),
                            e,
                        ));
                    }

                    debug!(
                        "Dial {}/{} to {} failed: {}",
                        attempt, attempts, entry, e
                    );
                    let jitter = Duration::from_millis(rand::random::<u64>() % 50);
                    tokio::time::sleep(delay + jitter).await;
                    delay = (delay * 2).min(self.config.retry_max_delay);
                }
            }
        }

        Err(NodeError::Connection("retry attempts exhausted".to_string()))
    }
}
