use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify, mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::config::NodeConfig;
use super::error::{NodeError, NodeResult};
use super::handlers::router;
use crate::membership::registry::MembershipRegistry;
use crate::message::types::Message;
use crate::peer::types::Peer;

/// State shared by the control task, the request handlers and the delivery tasks.
pub struct NodeShared {
    pub local: Peer,
    pub members: MembershipRegistry,
    pub config: NodeConfig,
    pub(crate) client: reqwest::Client,
    connected: RwLock<bool>,
    inbox: mpsc::Sender<Message>,
    errors: mpsc::UnboundedSender<NodeError>,
}

impl NodeShared {
    pub fn is_connected(&self) -> bool {
        *self.connected.read().expect("connection flag lock poisoned")
    }

    fn flag(&self) -> RwLockWriteGuard<'_, bool> {
        self.connected.write().expect("connection flag lock poisoned")
    }

    fn transition(&self, flag: &mut bool, connected: bool) {
        if *flag != connected {
            debug!("{} connected: {} -> {}", self.local, *flag, connected);
        }
        *flag = connected;
    }

    // Every membership change that decides the flag runs under the flag's write lock, so the
    // flag always follows the registry. Lock order: flag, then registry.

    /// Registers `peer` and marks the node connected.
    pub(crate) fn register(&self, peer: Peer) {
        let mut flag = self.flag();
        self.members.append(peer);
        self.transition(&mut flag, true);
    }

    /// Drops every member and marks the node disconnected.
    pub(crate) fn reset(&self) {
        let mut flag = self.flag();
        self.members.clear();
        self.transition(&mut flag, false);
    }

    /// Drops the connected flag once the last member is gone.
    pub(crate) fn mark_disconnected_if_empty(&self) {
        let mut flag = self.flag();
        if self.members.is_empty() {
            self.transition(&mut flag, false);
        }
    }

    /// Publishes a background failure for the embedding application.
    pub(crate) fn report(&self, error: NodeError) {
        warn!("[{}] {}", self.local, error);
        if self.errors.send(error).is_err() {
            debug!("Error channel closed, failure only logged");
        }
    }

    /// Hands an inbound message to the application, waiting at most one request timeout.
    pub(crate) async fn deliver_inbox(&self, message: Message) -> NodeResult<()> {
        self.inbox
            .send_timeout(message, self.config.request_timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => {
                    NodeError::Internal("inbox is full".to_string())
                }
                mpsc::error::SendTimeoutError::Closed(_) => {
                    NodeError::Internal("inbox is closed".to_string())
                }
            })
    }
}

/// Receiving side of a node: inbound messages and background failures.
pub struct NodeEvents {
    pub inbox: mpsc::Receiver<Message>,
    pub errors: mpsc::UnboundedReceiver<NodeError>,
}

pub(crate) enum Command {
    Connect {
        entry: Peer,
        reply: oneshot::Sender<NodeResult<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<NodeResult<()>>,
    },
    Outbox {
        message: Message,
        reply: oneshot::Sender<NodeResult<()>>,
    },
}

struct Workers {
    control: JoinHandle<()>,
    server: JoinHandle<()>,
    server_shutdown: Arc<Notify>,
}

/// Handle to a running mesh node.
///
/// Cloning is cheap; every clone talks to the same control task.
#[derive(Clone)]
pub struct Node {
    shared: Arc<NodeShared>,
    commands: mpsc::Sender<Command>,
    shutdown: Arc<Notify>,
    workers: Arc<Mutex<Option<Workers>>>,
}

impl Node {
    /// Binds the local peer's address and starts the node.
    pub async fn start(local: Peer, config: NodeConfig) -> NodeResult<(Node, NodeEvents)> {
        let listener = TcpListener::bind((local.address(), local.port()))
            .await
            .map_err(|e| NodeError::internal(&format!("error listening on {}", local), e))?;

        Self::serve(local, listener, config)
    }

    /// Starts the node on an already bound listener.
    ///
    /// Spawns the HTTP server and the control task on the current tokio runtime.
    pub fn serve(
        local: Peer,
        listener: TcpListener,
        config: NodeConfig,
    ) -> NodeResult<(Node, NodeEvents)> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| NodeError::internal("error building the HTTP client", e))?;

        let (inbox_tx, inbox_rx) = mpsc::channel(config.inbox_capacity.max(1));
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::channel(config.command_capacity.max(1));

        let shared = Arc::new(NodeShared {
            local: local.clone(),
            members: MembershipRegistry::with_queue_capacity(config.stream_queue_capacity),
            config,
            client,
            connected: RwLock::new(false),
            inbox: inbox_tx,
            errors: errors_tx,
        });

        let server_shutdown = Arc::new(Notify::new());
        let server = {
            let shared = shared.clone();
            let signal = server_shutdown.clone();
            let app = router(shared.clone());
            tokio::spawn(async move {
                let result = axum::serve(listener, app)
                    .with_graceful_shutdown(async move { signal.notified().await })
                    .await;

                if let Err(e) = result {
                    shared.reset();
                    shared.report(NodeError::internal("error listening for HTTP requests", e));
                }
            })
        };

        let shutdown = Arc::new(Notify::new());
        let control = {
            let control = ControlLoop {
                shared: shared.clone(),
                commands: commands_rx,
                shutdown: shutdown.clone(),
                tasks: JoinSet::new(),
            };
            tokio::spawn(control.run())
        };

        info!("Node {} listening", local);

        let node = Node {
            shared,
            commands: commands_tx,
            shutdown,
            workers: Arc::new(Mutex::new(Some(Workers {
                control,
                server,
                server_shutdown,
            }))),
        };

        Ok((
            node,
            NodeEvents {
                inbox: inbox_rx,
                errors: errors_rx,
            },
        ))
    }

    pub fn local(&self) -> &Peer {
        &self.shared.local
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Copy of the current membership.
    pub fn members(&self) -> Vec<Peer> {
        self.shared.members.snapshot()
    }

    pub fn registry(&self) -> &MembershipRegistry {
        &self.shared.members
    }

    /// Joins the mesh through `entry`.
    pub async fn connect(&self, entry: Peer) -> NodeResult<()> {
        self.request(|reply| Command::Connect { entry, reply }).await
    }

    /// Leaves the mesh, telling every member first.
    pub async fn disconnect(&self) -> NodeResult<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Sends `payload` to every member.
    pub async fn broadcast(&self, payload: impl Into<Vec<u8>>) -> NodeResult<()> {
        let message = Message::broadcast(self.shared.local.clone(), payload);
        self.submit(message).await
    }

    /// Sends `payload` to a single member.
    pub async fn send(&self, to: Peer, payload: impl Into<Vec<u8>>) -> NodeResult<()> {
        let message = Message::direct(self.shared.local.clone(), to, payload);
        self.submit(message).await
    }

    /// Queues an already assembled `Broadcast` or `Direct` message.
    pub async fn submit(&self, message: Message) -> NodeResult<()> {
        self.request(|reply| Command::Outbox { message, reply })
            .await
    }

    /// Stops the control task, releases every stream and shuts the HTTP server down.
    ///
    /// A connected node leaves the mesh first. Calling it twice is an error.
    pub async fn shutdown(&self) -> NodeResult<()> {
        let workers = self
            .workers
            .lock()
            .await
            .take()
            .ok_or_else(|| NodeError::Internal("node already stopped".to_string()))?;

        self.shutdown.notify_one();
        let control = workers.control.await;

        self.shared.reset();
        workers.server_shutdown.notify_one();
        let server = workers.server.await;

        control.map_err(|e| NodeError::internal("control task failed", e))?;
        server.map_err(|e| NodeError::internal("HTTP server task failed", e))?;

        info!("Node {} stopped", self.shared.local);
        Ok(())
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<NodeResult<()>>) -> Command,
    ) -> NodeResult<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| NodeError::Internal("node control task stopped".to_string()))?;

        response
            .await
            .map_err(|_| NodeError::Internal("node control task dropped the request".to_string()))?
    }
}

/// Single task that serializes connect, disconnect and outbound operations.
struct ControlLoop {
    shared: Arc<NodeShared>,
    commands: mpsc::Receiver<Command>,
    shutdown: Arc<Notify>,
    tasks: JoinSet<()>,
}

impl ControlLoop {
    async fn run(mut self) {
        debug!("Control task started for {}", self.shared.local);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.reap(joined);
                }

                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }

        if self.shared.is_connected()
            && let Err(e) = self.shared.disconnect().await
        {
            self.shared.report(e);
        }

        while let Some(joined) = self.tasks.join_next().await {
            self.reap(joined);
        }

        debug!("Control task stopped for {}", self.shared.local);
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Connect { entry, reply } => {
                let result = self.shared.connect(entry).await;
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                let result = self.shared.disconnect().await;
                let _ = reply.send(result);
            }
            Command::Outbox { message, reply } => {
                let result = self.shared.dispatch_outbox(message, &mut self.tasks);
                let _ = reply.send(result);
            }
        }
    }

    fn reap(&self, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            self.shared
                .report(NodeError::internal("delivery task failed", e));
        }
    }
}
