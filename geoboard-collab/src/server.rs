//! WebSocket sync server holding the authoritative record store.
//!
//! Architecture:
//! ```text
//! Client A ──┐
//!             ├── SyncServer ── RecordStore (Vec + JSON file)
//! Client B ──┘        │
//!                     └── BroadcastGroup
//!                              │
//!                   ┌──────────┼──────────┐
//!                   ▼          ▼          ▼
//!                Client A   Client B   Client C
//! ```
//!
//! Mutations are applied under the store's write lock, persisted, and
//! broadcast *before the lock is released*, so every connection observes
//! deltas in exactly the order the store applied them. The broadcast
//! includes the originating connection; mirrors dedup by id.
//!
//! A connection's first frame must be `Hello`. The server subscribes the
//! connection to the broadcast group and only then snapshots the store, so
//! a mutation racing the connect is seen in the snapshot, the stream, or
//! both — never in neither.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

use crate::broadcast::BroadcastGroup;
use crate::protocol::{MessageType, PeerInfo, WireMessage};
use crate::storage::{DeleteOutcome, RecordStore, StoreError, UpdateOutcome};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Broadcast channel capacity per connection
    pub broadcast_capacity: usize,
    /// Records document path (None = in-memory only)
    pub data_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            broadcast_capacity: 256,
            data_path: None,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub applied_mutations: u64,
    pub records: usize,
}

/// The sync server.
pub struct SyncServer {
    config: ServerConfig,
    store: Arc<RwLock<RecordStore>>,
    broadcast: Arc<BroadcastGroup>,
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    /// Create a new sync server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let store = match &config.data_path {
            Some(path) => RecordStore::open(path),
            None => RecordStore::in_memory(),
        };
        let broadcast = Arc::new(BroadcastGroup::new(config.broadcast_capacity));
        Self {
            config,
            store: Arc::new(RwLock::new(store)),
            broadcast,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Create with default configuration (in-memory, no persistence).
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Create with persistence enabled at the given path.
    pub fn with_storage(bind_addr: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(ServerConfig {
            bind_addr: bind_addr.into(),
            data_path: Some(path.into()),
            ..ServerConfig::default()
        })
    }

    /// Start listening for WebSocket connections.
    ///
    /// Runs the accept loop forever. Call from an async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("sync server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("new TCP connection from {addr}");

            let store = self.store.clone();
            let broadcast = self.broadcast.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, store, broadcast, stats).await
                {
                    log::error!("connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        store: Arc<RwLock<RecordStore>>,
        broadcast: Arc<BroadcastGroup>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        log::info!("WebSocket connection established from {addr}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        // Connection state: set once the Hello arrives.
        let mut peer: Option<PeerInfo> = None;
        let mut broadcast_rx: Option<tokio::sync::broadcast::Receiver<Arc<Vec<u8>>>> = None;

        loop {
            tokio::select! {
                // Incoming WebSocket message
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            let bytes: Vec<u8> = data.into();
                            let wire = match WireMessage::decode(&bytes) {
                                Ok(wire) => wire,
                                Err(e) => {
                                    log::warn!("undecodable frame from {addr}: {e}");
                                    continue;
                                }
                            };

                            {
                                let mut s = stats.write().await;
                                s.total_messages += 1;
                                s.total_bytes += bytes.len() as u64;
                            }

                            match wire.msg_type {
                                MessageType::Hello => {
                                    let info = wire.peer_info().unwrap_or_else(|_| {
                                        PeerInfo::with_id(wire.peer_id, "anonymous")
                                    });

                                    // Subscribe before snapshotting so no
                                    // mutation can fall between the two.
                                    let rx = broadcast.add_peer(info.clone()).await;
                                    broadcast_rx = Some(rx);

                                    let records = store.read().await.snapshot();
                                    let snap = WireMessage::snapshot(&records);
                                    ws_sender.send(Message::Binary(snap.encode()?.into())).await?;

                                    let _ = broadcast.broadcast(&WireMessage::peer_joined(&info));
                                    log::info!(
                                        "peer {} ({}) joined with {} records snapshotted",
                                        info.name,
                                        info.peer_id,
                                        records.len()
                                    );
                                    peer = Some(info);
                                }

                                MessageType::Create => {
                                    let record = match wire.record() {
                                        Ok(record) => record,
                                        Err(e) => {
                                            log::warn!("bad create payload from {addr}: {e}");
                                            continue;
                                        }
                                    };
                                    let mut s = store.write().await;
                                    match s.create(record.clone()) {
                                        Ok(seq) => {
                                            // Broadcast under the lock:
                                            // delivery order == application order.
                                            let _ = broadcast.broadcast(
                                                &WireMessage::created(wire.peer_id, seq, &record),
                                            );
                                            let (applied, count) = (s.applied_mutations(), s.len());
                                            drop(s);
                                            let mut st = stats.write().await;
                                            st.applied_mutations = applied;
                                            st.records = count;
                                        }
                                        Err(StoreError::DuplicateId(id)) => {
                                            log::warn!("create from {addr} reused id {id}, ignored");
                                        }
                                        Err(e) => {
                                            log::error!(
                                                "create {} not persisted, broadcast suppressed: {e}",
                                                record.id
                                            );
                                        }
                                    }
                                }

                                MessageType::Update => {
                                    let record = match wire.record() {
                                        Ok(record) => record,
                                        Err(e) => {
                                            log::warn!("bad update payload from {addr}: {e}");
                                            continue;
                                        }
                                    };
                                    let mut s = store.write().await;
                                    match s.update(
                                        record.id,
                                        record.geometry.clone(),
                                        record.label.clone(),
                                    ) {
                                        Ok(UpdateOutcome::Updated(seq)) => {
                                            let _ = broadcast.broadcast(
                                                &WireMessage::updated(wire.peer_id, seq, &record),
                                            );
                                            let applied = s.applied_mutations();
                                            drop(s);
                                            stats.write().await.applied_mutations = applied;
                                        }
                                        Ok(UpdateOutcome::Missing) => {
                                            log::debug!(
                                                "update for missing record {} dropped",
                                                record.id
                                            );
                                        }
                                        Err(e) => {
                                            log::error!(
                                                "update {} not persisted, broadcast suppressed: {e}",
                                                record.id
                                            );
                                        }
                                    }
                                }

                                MessageType::Delete => {
                                    let id = match wire.record_id() {
                                        Ok(id) => id,
                                        Err(e) => {
                                            log::warn!("bad delete payload from {addr}: {e}");
                                            continue;
                                        }
                                    };
                                    let mut s = store.write().await;
                                    match s.delete(id) {
                                        Ok(DeleteOutcome::Deleted(seq)) => {
                                            let _ = broadcast.broadcast(
                                                &WireMessage::deleted(wire.peer_id, seq, id),
                                            );
                                            let (applied, count) = (s.applied_mutations(), s.len());
                                            drop(s);
                                            let mut st = stats.write().await;
                                            st.applied_mutations = applied;
                                            st.records = count;
                                        }
                                        Ok(DeleteOutcome::Missing) => {
                                            log::debug!("delete for missing record {id} dropped");
                                        }
                                        Err(e) => {
                                            log::error!(
                                                "delete {id} not persisted, broadcast suppressed: {e}"
                                            );
                                        }
                                    }
                                }

                                MessageType::Ping => {
                                    let pong = WireMessage::pong(wire.peer_id);
                                    ws_sender.send(Message::Binary(pong.encode()?.into())).await?;
                                }

                                other => {
                                    log::debug!("unhandled message type from {addr}: {other:?}");
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("connection closed from {addr}");
                            break;
                        }

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                // Outgoing broadcast message
                msg = async {
                    match broadcast_rx {
                        Some(ref mut rx) => rx.recv().await,
                        // No Hello yet — nothing to forward.
                        None => std::future::pending().await,
                    }
                } => {
                    match msg {
                        Ok(data) => {
                            // Forwarded verbatim to every connection, the
                            // mutation's originator included.
                            ws_sender.send(Message::Binary(data.to_vec().into())).await?;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("connection {addr} lagged by {n} broadcasts");
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        // Cleanup: deregister the peer and tell the others.
        if let Some(info) = peer {
            broadcast.remove_peer(&info.peer_id).await;
            let _ = broadcast.broadcast(&WireMessage::peer_left(info.peer_id));
            log::info!("peer {} ({}) left", info.name, info.peer_id);
        }
        {
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
        }

        Ok(())
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// The authoritative store handle (tests, embedding).
    pub fn store(&self) -> &Arc<RwLock<RecordStore>> {
        &self.store
    }

    /// The broadcast group handle.
    pub fn broadcast(&self) -> &Arc<BroadcastGroup> {
        &self.broadcast
    }
}
