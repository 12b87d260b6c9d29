//! # Caller & Broadcast Send Path
//!
//! Delivers server-initiated invocations, results, and stream items to one
//! connection or to every connection. There is no acknowledgement protocol:
//! delivery is at-most-once and a vanished receiver is an expected race.

use std::sync::Arc;

use crate::connection::ConnectionId;
use crate::connection::ConnectionRegistry;
use crate::connection::Message;
use crate::error::Error;
use crate::error::Result;
use crate::value::Value;

/// A cheap, cloneable view over the connection registry for sending.
#[derive(Clone)]
pub struct Clients {
    connections: Arc<ConnectionRegistry>,
}

impl Clients {
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self { connections }
    }

    /// Sends a message to one connection.
    ///
    /// Returns `Error::ConnectionGone` if the connection is not registered or its
    /// transport refuses the message. The failure is logged here, so callers
    /// that treat delivery as best-effort may ignore it.
    pub async fn send_to(&self, id: ConnectionId, message: Message) -> Result<()> {
        let Some(connection) = self.connections.get(id) else {
            tracing::debug!(connection = %id, "send skipped: connection not registered");
            return Err(Error::ConnectionGone(id));
        };

        connection.send(message).await.map_err(|e| {
            tracing::debug!(connection = %id, error = %e, "send failed");
            Error::ConnectionGone(id)
        })
    }

    /// Invokes a client method on the calling connection.
    pub async fn send_to_caller(&self, caller: ConnectionId, method: &str, args: Vec<Value>) -> Result<()> {
        let message = Message::Invocation { method: method.to_string(), args };
        self.send_to(caller, message).await
    }

    /// Invokes a client method on every connection live at call time.
    ///
    /// Returns the number of connections that accepted the message. Connections
    /// that disconnect mid-broadcast are skipped; nothing is retried.
    pub async fn send_to_all(&self, method: &str, args: Vec<Value>) -> usize {
        let snapshot = self.connections.snapshot();
        let message = Message::Invocation { method: method.to_string(), args };

        let mut delivered = 0;
        for (id, connection) in snapshot {
            match connection.send(message.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(connection = %id, error = %e, method, "broadcast skipped"),
            }
        }
        delivered
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }
}
