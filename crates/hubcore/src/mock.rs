//! In-memory connection for tests.
//!
//! Messages sent to a `RecordingConnection` land in its paired `Inbox`, where a
//! test can await them in order. Used by the test suites of this crate and of
//! the crates built on it; not meant for production transports.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::connection;
use crate::connection::Connection;
use crate::connection::ConnectionId;
use crate::connection::Message;
use crate::hub::Hub;

/// How long `Inbox::recv` waits before giving up.
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// A connection that records every message it accepts.
pub struct RecordingConnection {
    tx: mpsc::UnboundedSender<Message>,
    open: AtomicBool,
}

impl RecordingConnection {
    /// Creates a connection and the inbox its messages are delivered to.
    pub fn new() -> (Arc<Self>, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(Self { tx, open: AtomicBool::new(true) });
        (connection, Inbox { rx })
    }

    /// Creates a connection and announces it to `hub` under a fresh id.
    pub fn attach(hub: &Hub) -> (ConnectionId, Arc<Self>, Inbox) {
        let (connection, inbox) = Self::new();
        let id = hub.next_connection_id();
        hub.on_connect(id, connection.clone());
        (id, connection, inbox)
    }

    /// Simulates the client going away: later sends fail with `Closed`.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connection for RecordingConnection {
    async fn send(&self, message: Message) -> connection::Result<()> {
        if !self.is_open() {
            return Err(connection::Error::Closed("connection closed".into()));
        }
        self.tx
            .send(message)
            .map_err(|_| connection::Error::Closed("inbox dropped".into()))
    }
}

/// The receiving side of a `RecordingConnection`.
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Inbox {
    /// Waits up to two seconds for the next message.
    pub async fn recv(&mut self) -> Option<Message> {
        self.recv_within(RECV_TIMEOUT).await
    }

    pub async fn recv_within(&mut self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.rx.recv()).await.ok().flatten()
    }

    /// Returns a message only if one is already queued.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Returns true if nothing arrives within `window`.
    pub async fn is_quiet_for(&mut self, window: Duration) -> bool {
        self.recv_within(window).await.is_none()
    }
}
