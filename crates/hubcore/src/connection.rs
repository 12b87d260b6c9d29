//! # Connections
//!
//! The boundary between the hub and the hosting transport.
//!
//! ## Philosophy
//!
//! - **Message-Oriented**: A `Connection` knows nothing about framing or bytes.
//!   It accepts already-built `Message`s and delivers them best-effort.
//! - **Owned Registry**: The `ConnectionRegistry` is the only shared mutable state of
//!   the hub. Broadcasts iterate a snapshot, never the live map.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;

use crate::error::Failure;
use crate::value::Value;

/// Errors that occur while handing a message to a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The client disconnected or its outbound queue was dropped.
    Closed(String),
    /// The transport could not encode the message.
    Encode(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(msg) => write!(f, "Connection closed: {}", msg),
            Self::Encode(msg) => write!(f, "Encode error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Strong type for connection identifiers.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// How an invocation ended, as seen by its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Finished with no result (no-result methods, or a stream that ran to the end).
    Void,
    /// Finished with a single result.
    Value(Value),
    /// Failed, or a stream ended early.
    Failed(Failure),
}

/// A message from the hub to one client.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Invoke a client-side method.
    Invocation { method: String, args: Vec<Value> },
    /// One item of a streaming result.
    StreamItem { token: String, item: Value },
    /// The end of an invocation the client is waiting on.
    Completion { token: String, completion: Completion },
}

/// A send capability for one connected client.
///
/// This trait is designed to be object-safe (`Arc<dyn Connection>`).
///
/// # invariants
/// - Must not block waiting for the client to process the message.
/// - Must return `Err(Error::Closed)` once the client is gone.
#[async_trait::async_trait]
pub trait Connection: Send + Sync + 'static {
    async fn send(&self, message: Message) -> Result<()>;
}

/// Process-wide mapping from connection identifier to its send capability.
///
/// Uses DashMap so connects, disconnects, and broadcasts never contend on a
/// single global lock.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<dyn Connection>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocates a fresh identifier for a transport that is about to connect.
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a connection. A reused identifier replaces the stale entry.
    pub fn insert(&self, id: ConnectionId, connection: Arc<dyn Connection>) {
        if self.connections.insert(id, connection).is_some() {
            tracing::warn!(connection = %id, "connection id reused; replacing stale entry");
        }
    }

    /// Removes a connection, returning whether it was present.
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<dyn Connection>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Copies out the connections live at call time.
    pub fn snapshot(&self) -> Vec<(ConnectionId, Arc<dyn Connection>)> {
        self.connections
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
