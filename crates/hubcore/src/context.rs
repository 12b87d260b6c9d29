//! Per-invocation context handed to method bodies.

use crate::clients::Clients;
use crate::connection::ConnectionId;
use crate::error::Result;
use crate::value::Value;

/// What a method body knows about the invocation it is serving.
///
/// Cloning is cheap; the context holds only ids and a shared handle to the
/// connection registry.
#[derive(Clone)]
pub struct HubContext {
    caller: ConnectionId,
    token: Option<String>,
    clients: Clients,
}

impl HubContext {
    pub(crate) fn new(caller: ConnectionId, token: Option<String>, clients: Clients) -> Self {
        Self { caller, token, clients }
    }

    /// The connection that issued the current invocation.
    pub fn caller(&self) -> ConnectionId {
        self.caller
    }

    /// The caller's correlation token, if it expects a response.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    /// Invokes a client method on the caller.
    pub async fn send_to_caller(&self, method: &str, args: Vec<Value>) -> Result<()> {
        self.clients.send_to_caller(self.caller, method, args).await
    }

    /// Invokes a client method on every connected client.
    pub async fn send_to_all(&self, method: &str, args: Vec<Value>) -> usize {
        self.clients.send_to_all(method, args).await
    }
}
