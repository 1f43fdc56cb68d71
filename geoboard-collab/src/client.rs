//! WebSocket sync client for connecting to the board server.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect)
//! - Create/update/delete mutation sends
//! - Typed events for the snapshot and every broadcast delta
//!
//! Self-originated broadcasts are delivered like any other: the server fans
//! every confirmation out to all connections including the sender, and the
//! mirror's idempotent application collapses the echo. There is no retry
//! and no offline queue — a mutation attempted while disconnected fails
//! with [`ProtocolError::TransportUnavailable`] and stays local-only.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use geoboard_core::FeatureRecord;

use crate::protocol::{MessageType, PeerInfo, ProtocolError, WireMessage};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Connection established
    Connected,
    /// Connection lost
    Disconnected,
    /// Initial full-state baseline (once, after connect)
    SnapshotReceived(Vec<FeatureRecord>),
    /// A record was created somewhere (possibly by this client)
    RecordCreated(FeatureRecord),
    /// A record was updated somewhere
    RecordUpdated(FeatureRecord),
    /// A record was deleted somewhere
    RecordDeleted(Uuid),
    /// A peer joined the board
    PeerJoined(PeerInfo),
    /// A peer left the board
    PeerLeft(Uuid),
}

/// The sync client.
///
/// Manages a WebSocket connection to the board server; mutations go out
/// through [`send_create`](Self::send_create) and friends, remote state
/// arrives as [`SyncEvent`]s on the receiver returned by
/// [`take_event_rx`](Self::take_event_rx).
pub struct SyncClient {
    /// Our peer identity
    peer_info: PeerInfo,

    /// Connection state
    state: Arc<RwLock<ConnectionState>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<Vec<u8>>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<SyncEvent>>,

    /// Event sender (held by the reader task)
    event_tx: mpsc::Sender<SyncEvent>,

    /// Server URL
    server_url: String,
}

impl SyncClient {
    /// Create a new sync client.
    pub fn new(peer_info: PeerInfo, server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            peer_info,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
            server_url: server_url.into(),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Connect to the server.
    ///
    /// Spawns background tasks for reading/writing WebSocket messages and
    /// introduces this peer with a `Hello`; the server answers with the
    /// snapshot baseline.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let ws_stream = match tokio_tungstenite::connect_async(&self.server_url).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                log::warn!("connect to {} failed: {e}", self.server_url);
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };

        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward the outgoing channel to the socket.
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);
        self.outgoing_tx = Some(out_tx.clone());
        tokio::spawn(async move {
            while let Some(data) = out_rx.recv().await {
                if ws_writer
                    .send(tokio_tungstenite::tungstenite::Message::Binary(data.into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            // Outgoing channel closed: say goodbye so the server can clean
            // up the peer promptly.
            let _ = ws_writer.close().await;
        });

        // Introduce ourselves; the server replies with the snapshot.
        let hello = WireMessage::hello(&self.peer_info).encode()?;
        out_tx
            .send(hello)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)?;

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(SyncEvent::Connected).await;

        // Reader task: decode incoming frames into events. Self-originated
        // confirmations pass through unfiltered.
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(tokio_tungstenite::tungstenite::Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        let wire = match WireMessage::decode(&bytes) {
                            Ok(wire) => wire,
                            Err(e) => {
                                log::warn!("undecodable frame from server: {e}");
                                continue;
                            }
                        };

                        let event = match wire.msg_type {
                            MessageType::Snapshot => {
                                wire.records().ok().map(SyncEvent::SnapshotReceived)
                            }
                            MessageType::Created => {
                                wire.record().ok().map(SyncEvent::RecordCreated)
                            }
                            MessageType::Updated => {
                                wire.record().ok().map(SyncEvent::RecordUpdated)
                            }
                            MessageType::Deleted => {
                                wire.record_id().ok().map(SyncEvent::RecordDeleted)
                            }
                            MessageType::PeerJoined => {
                                wire.peer_info().ok().map(SyncEvent::PeerJoined)
                            }
                            MessageType::PeerLeft => Some(SyncEvent::PeerLeft(wire.peer_id)),
                            MessageType::Pong => None,
                            other => {
                                log::debug!("unhandled message type from server: {other:?}");
                                None
                            }
                        };

                        if let Some(event) = event {
                            let _ = event_tx.send(event).await;
                        }
                    }
                    Ok(tokio_tungstenite::tungstenite::Message::Close(_)) | Err(_) => {
                        break;
                    }
                    _ => {}
                }
            }

            // Connection lost
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(SyncEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Ask the server to create a record.
    pub async fn send_create(&self, record: &FeatureRecord) -> Result<(), ProtocolError> {
        self.send_wire(WireMessage::create(self.peer_info.peer_id, record))
            .await
    }

    /// Ask the server to update a record (last write wins).
    pub async fn send_update(&self, record: &FeatureRecord) -> Result<(), ProtocolError> {
        self.send_wire(WireMessage::update(self.peer_info.peer_id, record))
            .await
    }

    /// Ask the server to delete a record.
    pub async fn send_delete(&self, id: Uuid) -> Result<(), ProtocolError> {
        self.send_wire(WireMessage::delete(self.peer_info.peer_id, id))
            .await
    }

    /// Send a heartbeat ping.
    pub async fn send_ping(&self) -> Result<(), ProtocolError> {
        self.send_wire(WireMessage::ping(self.peer_info.peer_id))
            .await
    }

    async fn send_wire(&self, msg: WireMessage) -> Result<(), ProtocolError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Err(ProtocolError::TransportUnavailable);
        }
        let encoded = msg.encode()?;
        match &self.outgoing_tx {
            Some(tx) => tx
                .send(encoded)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::TransportUnavailable),
        }
    }

    /// Disconnect from the server.
    ///
    /// Closes the WebSocket; pending events already decoded remain readable
    /// on the event receiver.
    pub async fn disconnect(&mut self) {
        self.outgoing_tx = None;
        *self.state.write().await = ConnectionState::Disconnected;
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Get our peer info.
    pub fn peer_info(&self) -> &PeerInfo {
        &self.peer_info
    }

    /// Get the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}
