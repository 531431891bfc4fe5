//! TCP server: accepts connections, decodes client frames, and exposes a
//! per-connection send path for the room/tick layer.
//!
//! Decoded [`ClientMessage`]s and connection lifecycle transitions flow to
//! the consumer as [`ServerEvent`]s through an mpsc channel; the tick loop
//! drains it once per tick, so message handling stays synchronous with
//! respect to room mutation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{RwLock, mpsc, watch};

use crate::compression::{CompressionConfig, compress_payload, decompress_payload};
use crate::framing::{FrameConfig, FrameError, read_frame, write_frame};
use crate::messages::{ClientMessage, ServerMessage, deserialize_message, serialize_message};
use crate::tcp_client::SendError;

/// Unique identifier for a TCP connection within a server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Return the next unique [`ConnectionId`].
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Error returned when the connection map is at capacity.
#[derive(Debug)]
pub struct ConnectionLimitReached;

/// Thread-safe map of active connection writers keyed by [`ConnectionId`].
pub struct ConnectionMap {
    inner: RwLock<HashMap<ConnectionId, OwnedWriteHalf>>,
    max_connections: usize,
}

impl ConnectionMap {
    /// Create a new map with the given capacity limit.
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Insert a connection. Returns `Err` if the map is at capacity.
    pub async fn insert(
        &self,
        id: ConnectionId,
        writer: OwnedWriteHalf,
    ) -> Result<(), ConnectionLimitReached> {
        let mut map = self.inner.write().await;
        if map.len() >= self.max_connections {
            return Err(ConnectionLimitReached);
        }
        map.insert(id, writer);
        Ok(())
    }

    /// Remove a connection by ID.
    pub async fn remove(&self, id: &ConnectionId) -> Option<OwnedWriteHalf> {
        self.inner.write().await.remove(id)
    }

    /// Return the number of active connections.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Return whether the map is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// Connection lifecycle and traffic, as seen by the room/tick layer.
#[derive(Debug)]
pub enum ServerEvent {
    /// A connection was accepted.
    Connected(ConnectionId),
    /// A decoded message arrived on a connection.
    Message(ConnectionId, ClientMessage),
    /// A connection closed (EOF, error, or shutdown).
    Disconnected(ConnectionId),
}

/// Configuration for [`RaceServer`].
pub struct ServerConfig {
    /// Address to bind to. Default: `0.0.0.0:7654`.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections. Default: 64.
    pub max_connections: usize,
    /// Framing limits.
    pub frame: FrameConfig,
    /// Outbound payload compression.
    pub compression: CompressionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7654".parse().unwrap(),
            max_connections: 64,
            frame: FrameConfig::default(),
            compression: CompressionConfig::default(),
        }
    }
}

/// TCP server that accepts connections and surfaces decoded traffic.
pub struct RaceServer {
    config: ServerConfig,
    /// Active connection writers (public for test inspection).
    pub connections: Arc<ConnectionMap>,
    id_gen: Arc<IdGenerator>,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RaceServer {
    /// Create a new server. Returns the server handle and the event
    /// receiver the tick loop drains.
    pub fn new(config: ServerConfig) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let server = Self {
            connections: Arc::new(ConnectionMap::new(config.max_connections)),
            id_gen: Arc::new(IdGenerator::new()),
            config,
            events_tx,
            shutdown_tx,
            shutdown_rx,
        };
        (server, events_rx)
    }

    /// Bind to the configured address and run the accept loop.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("server listening on {}", self.config.bind_addr);
        self.run_with_listener(listener).await
    }

    /// Run the accept loop with a pre-bound listener (useful for tests).
    pub async fn run_with_listener(&self, listener: TcpListener) -> std::io::Result<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer_addr) = result?;
                    stream.set_nodelay(true)?;

                    let id = self.id_gen.next_id();
                    let (reader, writer) = stream.into_split();

                    if self.connections.insert(id, writer).await.is_err() {
                        tracing::warn!("connection limit reached, rejecting {peer_addr}");
                        continue;
                    }

                    tracing::info!("accepted connection {id:?} from {peer_addr}");
                    let _ = self.events_tx.send(ServerEvent::Connected(id));

                    let connections = Arc::clone(&self.connections);
                    let events = self.events_tx.clone();
                    let frame = self.config.frame.clone();
                    let mut task_shutdown = self.shutdown_rx.clone();

                    tokio::spawn(async move {
                        Self::handle_connection(id, reader, &frame, &events, &mut task_shutdown)
                            .await;
                        connections.remove(&id).await;
                        let _ = events.send(ServerEvent::Disconnected(id));
                        tracing::info!("connection {id:?} closed");
                    });
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Signal the server to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Encode, compress, frame, and send one message to one connection.
    /// A send failure means the connection is dying; the reader task will
    /// surface the disconnect.
    pub async fn send_to(&self, id: ConnectionId, msg: &ServerMessage) -> Result<(), SendError> {
        let encoded = serialize_message(msg)?;
        let payload = compress_payload(&encoded, &self.config.compression);
        let mut map = self.connections.inner.write().await;
        if let Some(writer) = map.get_mut(&id) {
            write_frame(writer, &payload, &self.config.frame).await?;
        }
        Ok(())
    }

    /// Send one message to many connections, encoding it once.
    pub async fn broadcast(&self, ids: &[ConnectionId], msg: &ServerMessage) {
        let encoded = match serialize_message(msg) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!("failed to encode broadcast: {err}");
                return;
            }
        };
        let payload = compress_payload(&encoded, &self.config.compression);

        let mut map = self.connections.inner.write().await;
        for id in ids {
            if let Some(writer) = map.get_mut(id)
                && let Err(err) = write_frame(writer, &payload, &self.config.frame).await
            {
                tracing::warn!("broadcast to {id:?} failed: {err}");
            }
        }
    }

    /// Per-connection reader loop: decode frames into events.
    async fn handle_connection(
        id: ConnectionId,
        mut reader: tokio::net::tcp::OwnedReadHalf,
        frame: &FrameConfig,
        events: &mpsc::UnboundedSender<ServerEvent>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                result = read_frame(&mut reader, frame) => {
                    match result {
                        Ok(payload) => {
                            match decompress_payload(&payload)
                                .map_err(|e| e.to_string())
                                .and_then(|bytes| {
                                    deserialize_message::<ClientMessage>(&bytes)
                                        .map_err(|e| e.to_string())
                                }) {
                                Ok(msg) => {
                                    if events.send(ServerEvent::Message(id, msg)).is_err() {
                                        break;
                                    }
                                }
                                Err(err) => {
                                    tracing::warn!(
                                        "connection {id:?}: dropping undecodable payload: {err}"
                                    );
                                }
                            }
                        }
                        Err(FrameError::ConnectionClosed) => break,
                        Err(err) => {
                            tracing::warn!("connection {id:?}: read error: {err}");
                            break;
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
