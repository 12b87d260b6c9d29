//! # TCP Server
//!
//! Accepts connections and drives the hub's transport hooks for each one.
//!
//! ## Per-Connection Tasks
//!
//! - **Read loop**: splits the socket into frames on the record separator, decodes
//!   them, and turns them into `on_invocation` / `on_cancel` calls. A malformed
//!   frame is logged and skipped. An oversized frame, a read error, a close
//!   message, or end of stream ends the connection.
//! - **Write pump**: owns the write half. Encoded frames arrive over an unbounded
//!   queue so `Connection::send` never waits on the socket. Emits keep-alive pings
//!   while idle.
//!
//! On shutdown every open connection is sent a close frame before its socket is
//! shut down, and `Server::run` returns once all of them have finished.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use hubcore::Connection;
use hubcore::ConnectionId;
use hubcore::Hub;
use hubcore::Invocation;
use hubcore::Message;
use hubcore::connection;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio_util::codec::AnyDelimiterCodec;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::protocol;
use crate::protocol::Inbound;
use crate::protocol::RECORD_SEPARATOR;

/// Per-connection transport settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Interval between keep-alive pings. `None` sends none.
    pub keep_alive: Option<Duration>,
    /// Inbound frames longer than this close the connection.
    pub max_frame_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self { keep_alive: Some(Duration::from_secs(15)), max_frame_bytes: 1024 * 1024 }
    }
}

pub struct Server {
    listener: TcpListener,
    hub: Hub,
    settings: Settings,
}

impl Server {
    pub async fn bind(addr: SocketAddr, hub: Hub, settings: Settings) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, hub, settings })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` fires.
    ///
    /// Connections already open are told to close at the same time; returns once
    /// they have all been torn down.
    pub async fn run(self, shutdown: CancellationToken) -> io::Result<()> {
        tracing::info!(addr = %self.listener.local_addr()?, methods = ?self.hub.methods().names(), "listening");
        let mut connections = JoinSet::new();

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => continue,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let hub = self.hub.clone();
                    let settings = self.settings.clone();
                    connections.spawn(serve(hub, stream, peer, settings, shutdown.child_token()));
                }
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            }
        }

        tracing::info!(open = connections.len(), "stopped accepting connections");
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

/// The hub's send capability for one socket.
struct SocketConnection {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait::async_trait]
impl Connection for SocketConnection {
    async fn send(&self, message: Message) -> connection::Result<()> {
        let frame = protocol::encode(&message).map_err(|e| connection::Error::Encode(e.to_string()))?;
        self.tx.send(frame).map_err(|_| connection::Error::Closed("socket writer stopped".into()))
    }
}

async fn serve(hub: Hub, stream: TcpStream, peer: SocketAddr, settings: Settings, shutdown: CancellationToken) {
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();

    let (tx, rx) = mpsc::unbounded_channel();
    let control = tx.clone();
    let closed = CancellationToken::new();
    let writer = tokio::spawn(write_pump(write_half, rx, settings.keep_alive, closed.clone()));

    let id = hub.next_connection_id();
    hub.on_connect(id, Arc::new(SocketConnection { tx }));
    tracing::debug!(connection = %id, peer = %peer, "socket attached");

    let codec = AnyDelimiterCodec::new_with_max_length(
        vec![RECORD_SEPARATOR],
        vec![RECORD_SEPARATOR],
        settings.max_frame_bytes,
    );
    let mut frames = FramedRead::new(read_half, codec);

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => {
                match protocol::encode_close(None) {
                    Ok(close) => {
                        let _ = control.send(close);
                    }
                    Err(e) => tracing::error!(connection = %id, error = %e, "close encoding failed"),
                }
                break;
            }
            frame = frames.next() => frame,
        };

        let bytes = match frame {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                tracing::warn!(connection = %id, error = %e, "read failed, closing connection");
                break;
            }
            None => break,
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match protocol::decode(&bytes) {
            Ok(Inbound::Close { error }) => {
                tracing::debug!(connection = %id, error = ?error, "client closed");
                break;
            }
            Ok(inbound) => route(&hub, id, inbound),
            Err(e) => tracing::warn!(connection = %id, error = %e, "malformed frame skipped"),
        }
    }

    hub.on_disconnect(id);
    closed.cancel();
    let _ = writer.await;
}

fn route(hub: &Hub, id: ConnectionId, inbound: Inbound) {
    match inbound {
        Inbound::Invocation { invocation_id, target, arguments } => {
            hub.on_invocation(Invocation { caller: id, method: target, args: arguments, token: invocation_id });
        }
        Inbound::StreamInvocation { invocation_id, target, arguments } => {
            hub.on_invocation(Invocation::call(id, target, arguments, invocation_id));
        }
        Inbound::CancelInvocation { invocation_id } => {
            hub.on_cancel(id, &invocation_id);
        }
        Inbound::Ping => tracing::trace!(connection = %id, "ping"),
        Inbound::Close { .. } => {}
    }
}

async fn write_pump(
    mut socket: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    keep_alive: Option<Duration>,
    closed: CancellationToken,
) {
    let mut ticker = keep_alive.map(|period| tokio::time::interval_at(Instant::now() + period, period));

    loop {
        let frame = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = tick(&mut ticker) => match protocol::encode_ping() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(error = %e, "ping encoding failed");
                    continue;
                }
            },
        };

        if let Err(e) = socket.write_all(&frame).await {
            tracing::debug!(error = %e, "socket write failed");
            return;
        }
    }

    // Flush what was queued before the read side went away.
    while let Ok(frame) = rx.try_recv() {
        if socket.write_all(&frame).await.is_err() {
            return;
        }
    }
    let _ = socket.shutdown().await;
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
