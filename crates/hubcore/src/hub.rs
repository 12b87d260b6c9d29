//! # Hub Dispatcher
//!
//! Routes inbound invocations to registered methods and delivers their results,
//! and exposes the lifecycle hooks a transport drives.
//!
//! ## Architecture
//!
//! - **Hub**: cheap-to-clone handle over the method registry, the connection registry,
//!   and the stream session table.
//! - **Dispatch**: lookup, shape validation, execution, result delivery. Streaming
//!   methods hand their reader to a session pump and return at once.
//! - **Containment**: every per-request failure stops at `on_invocation` and becomes a
//!   failed completion for the caller. No body failure reaches the registries or other
//!   in-flight invocations.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;

use crate::clients::Clients;
use crate::connection::Completion;
use crate::connection::Connection;
use crate::connection::ConnectionId;
use crate::connection::ConnectionRegistry;
use crate::connection::Message;
use crate::context::HubContext;
use crate::error::Error;
use crate::error::Result;
use crate::error::panic_message;
use crate::registry::MethodBody;
use crate::registry::MethodRegistry;
use crate::stream::StreamSessions;
use crate::value::Value;

/// One inbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub caller: ConnectionId,
    pub method: String,
    pub args: Vec<Value>,
    /// Present when the caller expects a response.
    pub token: Option<String>,
}

impl Invocation {
    /// An invocation whose caller does not wait for a response.
    pub fn notify(caller: ConnectionId, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self { caller, method: method.into(), args, token: None }
    }

    /// An invocation whose caller waits on `token` for a completion.
    pub fn call(caller: ConnectionId, method: impl Into<String>, args: Vec<Value>, token: impl Into<String>) -> Self {
        Self { caller, method: method.into(), args, token: Some(token.into()) }
    }
}

/// What a successful dispatch did.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// A no-result method ran to completion.
    Completed,
    /// A single-result method returned this value.
    Returned(Value),
    /// A streaming method's session was started; items flow in the background.
    Streaming,
}

/// The hub: method registry, connected clients, and live streams.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    methods: MethodRegistry,
    connections: Arc<ConnectionRegistry>,
    streams: Arc<StreamSessions>,
}

impl Hub {
    /// Freezes `methods` and creates an empty hub around it.
    pub fn new(methods: MethodRegistry) -> Self {
        tracing::info!(methods = methods.len(), "hub created");
        Self {
            inner: Arc::new(HubInner {
                methods,
                connections: Arc::new(ConnectionRegistry::new()),
                streams: Arc::new(StreamSessions::new()),
            }),
        }
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.inner.methods
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.inner.connections
    }

    pub fn streams(&self) -> &Arc<StreamSessions> {
        &self.inner.streams
    }

    pub fn clients(&self) -> Clients {
        Clients::new(Arc::clone(&self.inner.connections))
    }

    /// Allocates an identifier for a transport connection about to be announced.
    pub fn next_connection_id(&self) -> ConnectionId {
        self.inner.connections.next_id()
    }

    /// Transport hook: a client connected.
    pub fn on_connect(&self, id: ConnectionId, connection: Arc<dyn Connection>) {
        self.inner.connections.insert(id, connection);
        tracing::info!(connection = %id, clients = self.inner.connections.len(), "client connected");
    }

    /// Transport hook: a client disconnected. Cancels all of its streams.
    ///
    /// The connection is removed before its streams are cancelled, so a stream
    /// registered concurrently is caught either here or by the liveness check
    /// in `dispatch`.
    pub fn on_disconnect(&self, id: ConnectionId) {
        let removed = self.inner.connections.remove(id);
        let cancelled = self.inner.streams.cancel_connection(id);
        tracing::info!(connection = %id, removed, streams_cancelled = cancelled, "client disconnected");
    }

    /// Transport hook: the client cancelled one of its streams.
    pub fn on_cancel(&self, id: ConnectionId, token: &str) -> bool {
        let cancelled = self.inner.streams.cancel(id, token);
        tracing::debug!(connection = %id, token, cancelled, "stream cancellation requested");
        cancelled
    }

    /// Transport hook: an invocation arrived.
    ///
    /// Dispatches on its own task so a slow method never holds up the caller's
    /// other invocations.
    pub fn on_invocation(&self, invocation: Invocation) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move { hub.handle(invocation).await })
    }

    /// Dispatches and reports any failure to the caller.
    async fn handle(&self, invocation: Invocation) {
        let caller = invocation.caller;
        let token = invocation.token.clone();
        let method = invocation.method.clone();

        let Err(e) = self.dispatch(invocation).await else { return };
        tracing::warn!(connection = %caller, method = %method, error = %e, "invocation failed");

        if let Some(token) = token {
            let completion = Completion::Failed(e.to_failure());
            let _ = self.clients().send_to(caller, Message::Completion { token, completion }).await;
        }
    }

    /// Looks up, validates, and executes one invocation, delivering its result.
    ///
    /// Returns `Err` without sending anything when the invocation fails.
    pub async fn dispatch(&self, invocation: Invocation) -> Result<Dispatched> {
        let Invocation { caller, method, args, token } = invocation;

        let descriptor = self.inner.methods.get(&method).ok_or(Error::MethodNotFound(method))?;
        let name = descriptor.name();
        let args = descriptor.validate(args)?;
        let ctx = HubContext::new(caller, token.clone(), self.clients());

        match descriptor.body() {
            MethodBody::Action(body) => {
                execute(name, || body(ctx, args)).await?;
                if let Some(token) = token {
                    let completion = Completion::Void;
                    let _ = self.clients().send_to(caller, Message::Completion { token, completion }).await;
                }
                Ok(Dispatched::Completed)
            }
            MethodBody::Function(body) => {
                let value = execute(name, || body(ctx, args)).await?;
                if let Some(token) = token {
                    let completion = Completion::Value(value.clone());
                    let _ = self.clients().send_to(caller, Message::Completion { token, completion }).await;
                }
                Ok(Dispatched::Returned(value))
            }
            MethodBody::Stream(body) => {
                let token = token.ok_or_else(|| Error::StreamRequiresToken(name.to_string()))?;
                let connection = self.inner.connections.get(caller).ok_or(Error::ConnectionGone(caller))?;

                let reader = match std::panic::catch_unwind(AssertUnwindSafe(|| body(ctx, args))) {
                    Ok(Ok(reader)) => reader,
                    Ok(Err(e)) => return Err(execution_error(name, format!("{:#}", e))),
                    Err(payload) => return Err(execution_error(name, panic_message(payload.as_ref()))),
                };

                self.inner.streams.start(caller, connection, token.clone(), reader);

                // The caller may have left between lookup and registration.
                if !self.inner.connections.contains(caller) {
                    self.inner.streams.cancel(caller, &token);
                }
                Ok(Dispatched::Streaming)
            }
        }
    }
}

fn execution_error(method: &str, message: String) -> Error {
    Error::MethodExecution { method: method.to_string(), message }
}

/// Runs a method body, converting errors and panics into `MethodExecution`.
async fn execute<T, F>(method: &str, body: F) -> Result<T>
where
    F: FnOnce() -> BoxFuture<'static, anyhow::Result<T>>,
{
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(fut) => fut,
        Err(payload) => return Err(execution_error(method, panic_message(payload.as_ref()))),
    };

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(execution_error(method, format!("{:#}", e))),
        Err(payload) => Err(execution_error(method, panic_message(payload.as_ref()))),
    }
}
