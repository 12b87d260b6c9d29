//! # Streaming Results
//!
//! A streaming method returns the read end of a queue instead of a value. Its
//! producer runs on its own task and pushes items; a per-session pump drains
//! them to the caller in order.
//!
//! ## Invariants
//! - **Single Producer, Single Consumer**: one writer per session, one pump per session.
//! - **FIFO**: items reach the connection in production order.
//! - **Cancellation**: disconnecting, client cancellation, or dropping the reader cancels
//!   the shared token. Producers observe it at their next suspension point; at most one
//!   extra item may be attempted and discarded.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::connection::Completion;
use crate::connection::Connection;
use crate::connection::ConnectionId;
use crate::connection::Message;
use crate::error::Failure;
use crate::error::FailureKind;
use crate::error::panic_message;
use crate::value::IntoValue;
use crate::value::Value;

/// Returned by writes once the consumer is gone or the session was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamClosed;

impl std::fmt::Display for StreamClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream closed")
    }
}

impl std::error::Error for StreamClosed {}

/// Queue sizing for a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Unbounded,
    /// Writers wait for room once `n` items are queued.
    Bounded(usize),
}

/// One entry of the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Item(Value),
    /// The producer failed; the stream ends early.
    Fault(String),
}

enum Tx {
    Bounded(mpsc::Sender<StreamEvent>),
    Unbounded(mpsc::UnboundedSender<StreamEvent>),
}

enum Rx {
    Bounded(mpsc::Receiver<StreamEvent>),
    Unbounded(mpsc::UnboundedReceiver<StreamEvent>),
}

/// Creates a connected writer/reader pair sharing one cancellation token.
pub fn channel(capacity: Capacity) -> (StreamWriter, StreamReader) {
    let cancel = CancellationToken::new();
    let (tx, rx) = match capacity {
        Capacity::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Tx::Unbounded(tx), Rx::Unbounded(rx))
        }
        Capacity::Bounded(n) => {
            let (tx, rx) = mpsc::channel(n.max(1));
            (Tx::Bounded(tx), Rx::Bounded(rx))
        }
    };

    let writer = StreamWriter { tx, cancel: cancel.clone() };
    let reader = StreamReader { rx, cancel };
    (writer, reader)
}

/// The producer's end of a stream. Dropping it completes the stream.
pub struct StreamWriter {
    tx: Tx,
    cancel: CancellationToken,
}

impl StreamWriter {
    /// Pushes one item.
    ///
    /// Fails with `StreamClosed` once the session is cancelled or the reader is
    /// gone. A bounded write waiting for room gives up on cancellation.
    pub async fn write(&self, item: impl IntoValue) -> Result<(), StreamClosed> {
        self.push(StreamEvent::Item(item.into_value())).await
    }

    /// Ends the stream early with an error. A no-op if the reader is gone.
    pub async fn fail(self, message: impl Into<String>) {
        let _ = self.push(StreamEvent::Fault(message.into())).await;
    }

    /// Marks the stream complete. Equivalent to dropping the writer.
    pub fn complete(self) {}

    /// Resolves once the session has been cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    async fn push(&self, event: StreamEvent) -> Result<(), StreamClosed> {
        if self.cancel.is_cancelled() {
            return Err(StreamClosed);
        }

        match &self.tx {
            Tx::Unbounded(tx) => tx.send(event).map_err(|_| StreamClosed),
            Tx::Bounded(tx) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(StreamClosed),
                sent = tx.send(event) => sent.map_err(|_| StreamClosed),
            },
        }
    }

    /// A second handle onto the same queue, held by the launcher to report faults.
    fn fault_handle(&self) -> Self {
        let tx = match &self.tx {
            Tx::Bounded(tx) => Tx::Bounded(tx.clone()),
            Tx::Unbounded(tx) => Tx::Unbounded(tx.clone()),
        };
        Self { tx, cancel: self.cancel.clone() }
    }
}

/// The consumer's end of a stream.
///
/// Dropping the reader cancels the session, so the producer stops at its next
/// suspension point instead of producing into the void.
pub struct StreamReader {
    rx: Rx,
    cancel: CancellationToken,
}

impl StreamReader {
    /// Receives the next event, or `None` once the producer has finished.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        match &mut self.rx {
            Rx::Bounded(rx) => rx.recv().await,
            Rx::Unbounded(rx) => rx.recv().await,
        }
    }

    /// The token shared with the writer.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Launches `produce` on its own task and returns the read end immediately.
///
/// The invocation completes without waiting for production. A producer that
/// returns an error or panics ends the stream with a fault instead of a silent
/// truncation.
pub fn spawn_producer<F, Fut>(capacity: Capacity, produce: F) -> StreamReader
where
    F: FnOnce(StreamWriter) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let (writer, reader) = channel(capacity);
    let fault = writer.fault_handle();
    let task = produce(writer);

    tokio::spawn(async move {
        let message = match AssertUnwindSafe(task).catch_unwind().await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{:#}", e),
            Err(payload) => panic_message(payload.as_ref()),
        };
        tracing::warn!(error = %message, "stream producer ended early");
        fault.fail(message).await;
    });

    reader
}

struct Session {
    serial: u64,
    cancel: CancellationToken,
}

/// The table of in-flight streaming results, keyed by connection and token.
pub struct StreamSessions {
    sessions: DashMap<(ConnectionId, String), Session>,
    next_serial: AtomicU64,
}

impl StreamSessions {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_serial: AtomicU64::new(1),
        }
    }

    /// Registers a session and spawns the pump that drains `reader` to `connection`.
    ///
    /// A live session of the same connection reusing `token` is cancelled.
    pub(crate) fn start(
        self: &Arc<Self>,
        id: ConnectionId,
        connection: Arc<dyn Connection>,
        token: String,
        reader: StreamReader,
    ) {
        let cancel = reader.cancellation();
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let key = (id, token.clone());

        let session = Session { serial, cancel: cancel.clone() };
        if let Some(stale) = self.sessions.insert(key.clone(), session) {
            tracing::warn!(connection = %id, token = %token, "invocation id reused; cancelling previous stream");
            stale.cancel.cancel();
        }

        let sessions = Arc::clone(self);
        tokio::spawn(async move {
            pump(id, connection.as_ref(), &token, reader, &cancel).await;
            sessions.sessions.remove_if(&key, |_, session| session.serial == serial);
        });
    }

    /// Cancels one session. Returns whether it was live.
    pub fn cancel(&self, id: ConnectionId, token: &str) -> bool {
        match self.sessions.remove(&(id, token.to_string())) {
            Some((_, session)) => {
                session.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every session owned by a connection. Returns how many were live.
    pub fn cancel_connection(&self, id: ConnectionId) -> usize {
        let mut cancelled = 0;
        self.sessions.retain(|(owner, _), session| {
            if *owner == id {
                session.cancel.cancel();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        cancelled
    }

    /// Number of live sessions owned by a connection.
    pub fn active_for(&self, id: ConnectionId) -> usize {
        self.sessions.iter().filter(|entry| entry.key().0 == id).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for StreamSessions {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains one stream to its connection until completion, fault, or cancellation.
async fn pump(
    id: ConnectionId,
    connection: &dyn Connection,
    token: &str,
    mut reader: StreamReader,
    cancel: &CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(connection = %id, token, "stream cancelled");
                return;
            }
            event = reader.next() => event,
        };

        let (message, done) = match event {
            Some(StreamEvent::Item(item)) => (Message::StreamItem { token: token.to_string(), item }, false),
            Some(StreamEvent::Fault(message)) => {
                let failure = Failure { kind: FailureKind::MethodExecution, message };
                let completion = Completion::Failed(failure);
                (Message::Completion { token: token.to_string(), completion }, true)
            }
            None => (Message::Completion { token: token.to_string(), completion: Completion::Void }, true),
        };

        if let Err(e) = connection.send(message).await {
            tracing::debug!(connection = %id, token, error = %e, "stream consumer gone");
            cancel.cancel();
            return;
        }

        if done {
            tracing::debug!(connection = %id, token, "stream completed");
            return;
        }
    }
}
