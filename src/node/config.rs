use std::time::Duration;

use crate::membership::registry::DEFAULT_QUEUE_CAPACITY;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_ATTEMPTS: usize = 3;
pub const DEFAULT_COMMAND_CAPACITY: usize = 32;
pub const DEFAULT_INBOX_CAPACITY: usize = 64;
pub const DEFAULT_STREAM_KEEP_ALIVE: Duration = Duration::from_secs(15);

const RETRY_BASE_DELAY: Duration = Duration::from_millis(150);
const RETRY_MAX_DELAY: Duration = Duration::from_millis(1200);

/// Tunables of a running node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Upper bound for every outbound request, including the join handshake.
    pub request_timeout: Duration,
    /// How many times the entry point is dialed before a join gives up.
    pub connect_attempts: usize,
    /// First backoff delay between entry point dials; doubled per attempt.
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Pending operations accepted by the control task before callers wait.
    pub command_capacity: usize,
    /// Inbound messages buffered before request handlers wait for the application.
    pub inbox_capacity: usize,
    /// Undelivered payloads buffered per streamed peer.
    pub stream_queue_capacity: usize,
    /// Interval of keep-alive comments on open streams.
    pub stream_keep_alive: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            retry_base_delay: RETRY_BASE_DELAY,
            retry_max_delay: RETRY_MAX_DELAY,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            stream_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            stream_keep_alive: DEFAULT_STREAM_KEEP_ALIVE,
        }
    }
}

impl NodeConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_attempts(mut self, attempts: usize) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    pub fn with_stream_keep_alive(mut self, interval: Duration) -> Self {
        self.stream_keep_alive = interval;
        self
    }
}
