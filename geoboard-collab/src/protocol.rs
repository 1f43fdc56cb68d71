//! Binary wire protocol for record synchronization.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌──────────┬───────────┬──────────┬──────────┐
//! │ msg_type │ peer_id   │ seq      │ payload  │
//! │ 1 byte   │ 16 bytes  │ 8 bytes  │ variable │
//! └──────────┴───────────┴──────────┴──────────┘
//! ```
//!
//! `peer_id` names the connection a message originated from; `seq` carries
//! the store's application sequence on server-stamped deltas (zero on
//! client-originated messages). Payloads are themselves bincode: a record,
//! a record id, a record list, or peer info, depending on `msg_type`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use geoboard_core::FeatureRecord;

/// Message types for the sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Client introduces itself; server answers with Snapshot
    Hello = 1,
    /// Full record set, sent once per connection
    Snapshot = 2,
    /// Client asks to create a record
    Create = 3,
    /// Server confirms an applied create (fanned out to everyone)
    Created = 4,
    /// Client asks to update a record
    Update = 5,
    /// Server confirms an applied update
    Updated = 6,
    /// Client asks to delete a record
    Delete = 7,
    /// Server confirms an applied delete
    Deleted = 8,
    /// A peer joined the board
    PeerJoined = 9,
    /// A peer left the board
    PeerLeft = 10,
    /// Heartbeat ping
    Ping = 11,
    /// Heartbeat pong
    Pong = 12,
}

/// Peer identity with display metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerInfo {
    pub peer_id: Uuid,
    pub name: String,
}

impl PeerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            peer_id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    /// Create with an explicit peer_id (for testing).
    pub fn with_id(peer_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            peer_id,
            name: name.into(),
        }
    }
}

/// Top-level protocol message.
///
/// Serialized with bincode for minimal overhead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub msg_type: MessageType,
    pub peer_id: Uuid,
    /// Store application sequence for server-stamped deltas, 0 otherwise
    pub seq: u64,
    /// Message payload (varies by msg_type)
    pub payload: Vec<u8>,
}

fn encode_payload<T: Serialize>(value: &T) -> Vec<u8> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).unwrap_or_default()
}

impl WireMessage {
    /// Client hello, carrying its peer info.
    pub fn hello(info: &PeerInfo) -> Self {
        Self {
            msg_type: MessageType::Hello,
            peer_id: info.peer_id,
            seq: 0,
            payload: encode_payload(info),
        }
    }

    /// Full-state snapshot for a newly connected client.
    pub fn snapshot(records: &[FeatureRecord]) -> Self {
        Self {
            msg_type: MessageType::Snapshot,
            peer_id: Uuid::nil(),
            seq: 0,
            payload: encode_payload(&records),
        }
    }

    /// Client-originated create request.
    pub fn create(peer_id: Uuid, record: &FeatureRecord) -> Self {
        Self {
            msg_type: MessageType::Create,
            peer_id,
            seq: 0,
            payload: encode_payload(record),
        }
    }

    /// Server-stamped create confirmation.
    pub fn created(peer_id: Uuid, seq: u64, record: &FeatureRecord) -> Self {
        Self {
            msg_type: MessageType::Created,
            peer_id,
            seq,
            payload: encode_payload(record),
        }
    }

    /// Client-originated update request.
    pub fn update(peer_id: Uuid, record: &FeatureRecord) -> Self {
        Self {
            msg_type: MessageType::Update,
            peer_id,
            seq: 0,
            payload: encode_payload(record),
        }
    }

    /// Server-stamped update confirmation.
    pub fn updated(peer_id: Uuid, seq: u64, record: &FeatureRecord) -> Self {
        Self {
            msg_type: MessageType::Updated,
            peer_id,
            seq,
            payload: encode_payload(record),
        }
    }

    /// Client-originated delete request.
    pub fn delete(peer_id: Uuid, id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Delete,
            peer_id,
            seq: 0,
            payload: encode_payload(&id),
        }
    }

    /// Server-stamped delete confirmation.
    pub fn deleted(peer_id: Uuid, seq: u64, id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Deleted,
            peer_id,
            seq,
            payload: encode_payload(&id),
        }
    }

    /// Peer joined notification.
    pub fn peer_joined(info: &PeerInfo) -> Self {
        Self {
            msg_type: MessageType::PeerJoined,
            peer_id: info.peer_id,
            seq: 0,
            payload: encode_payload(info),
        }
    }

    /// Peer left notification.
    pub fn peer_left(peer_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::PeerLeft,
            peer_id,
            seq: 0,
            payload: Vec::new(),
        }
    }

    /// Heartbeat ping.
    pub fn ping(peer_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Ping,
            peer_id,
            seq: 0,
            payload: Vec::new(),
        }
    }

    /// Heartbeat pong.
    pub fn pong(peer_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Pong,
            peer_id,
            seq: 0,
            payload: Vec::new(),
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(msg)
    }

    /// Parse a record payload (Create/Created/Update/Updated).
    pub fn record(&self) -> Result<FeatureRecord, ProtocolError> {
        match self.msg_type {
            MessageType::Create
            | MessageType::Created
            | MessageType::Update
            | MessageType::Updated => decode_payload(&self.payload),
            _ => Err(ProtocolError::InvalidMessageType),
        }
    }

    /// Parse a snapshot payload into the full record list.
    pub fn records(&self) -> Result<Vec<FeatureRecord>, ProtocolError> {
        if self.msg_type != MessageType::Snapshot {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode_payload(&self.payload)
    }

    /// Parse a record-id payload (Delete/Deleted).
    pub fn record_id(&self) -> Result<Uuid, ProtocolError> {
        match self.msg_type {
            MessageType::Delete | MessageType::Deleted => decode_payload(&self.payload),
            _ => Err(ProtocolError::InvalidMessageType),
        }
    }

    /// Parse a peer-info payload (Hello/PeerJoined).
    pub fn peer_info(&self) -> Result<PeerInfo, ProtocolError> {
        match self.msg_type {
            MessageType::Hello | MessageType::PeerJoined => decode_payload(&self.payload),
            _ => Err(ProtocolError::InvalidMessageType),
        }
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
    Ok(value)
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    InvalidMessageType,
    ConnectionClosed,
    /// The channel to the server is down; the mutation was not sent.
    TransportUnavailable,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "deserialization error: {e}"),
            Self::InvalidMessageType => write!(f, "invalid message type"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::TransportUnavailable => write!(f, "transport unavailable"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use geoboard_core::Geometry;

    fn sample_record(label: &str) -> FeatureRecord {
        FeatureRecord::new(
            Geometry::rectangle([4.0, 52.0], [4.2, 52.1]).unwrap(),
            label,
        )
    }

    #[test]
    fn test_hello_roundtrip() {
        let info = PeerInfo::new("Alice");
        let msg = WireMessage::hello(&info);
        let decoded = WireMessage::decode(&msg.encode().unwrap()).unwrap();

        assert_eq!(decoded.msg_type, MessageType::Hello);
        assert_eq!(decoded.peer_id, info.peer_id);
        assert_eq!(decoded.peer_info().unwrap(), info);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let records = vec![sample_record("a"), sample_record("b")];
        let msg = WireMessage::snapshot(&records);
        let decoded = WireMessage::decode(&msg.encode().unwrap()).unwrap();

        assert_eq!(decoded.msg_type, MessageType::Snapshot);
        assert_eq!(decoded.records().unwrap(), records);
    }

    #[test]
    fn test_snapshot_empty() {
        let msg = WireMessage::snapshot(&[]);
        let decoded = WireMessage::decode(&msg.encode().unwrap()).unwrap();
        assert!(decoded.records().unwrap().is_empty());
    }

    #[test]
    fn test_create_created_roundtrip() {
        let peer = Uuid::new_v4();
        let record = sample_record("Zone1");

        let request = WireMessage::create(peer, &record);
        let decoded = WireMessage::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded.msg_type, MessageType::Create);
        assert_eq!(decoded.seq, 0);
        assert_eq!(decoded.record().unwrap(), record);

        let confirm = WireMessage::created(peer, 7, &record);
        let decoded = WireMessage::decode(&confirm.encode().unwrap()).unwrap();
        assert_eq!(decoded.msg_type, MessageType::Created);
        assert_eq!(decoded.seq, 7);
        assert_eq!(decoded.peer_id, peer);
        assert_eq!(decoded.record().unwrap(), record);
    }

    #[test]
    fn test_update_roundtrip() {
        let peer = Uuid::new_v4();
        let record = sample_record("renamed");

        let decoded =
            WireMessage::decode(&WireMessage::updated(peer, 3, &record).encode().unwrap()).unwrap();
        assert_eq!(decoded.msg_type, MessageType::Updated);
        assert_eq!(decoded.record().unwrap(), record);
    }

    #[test]
    fn test_delete_roundtrip() {
        let peer = Uuid::new_v4();
        let id = Uuid::new_v4();

        let decoded =
            WireMessage::decode(&WireMessage::deleted(peer, 9, id).encode().unwrap()).unwrap();
        assert_eq!(decoded.msg_type, MessageType::Deleted);
        assert_eq!(decoded.seq, 9);
        assert_eq!(decoded.record_id().unwrap(), id);
    }

    #[test]
    fn test_peer_notifications_roundtrip() {
        let info = PeerInfo::new("Bob");

        let joined = WireMessage::decode(&WireMessage::peer_joined(&info).encode().unwrap()).unwrap();
        assert_eq!(joined.msg_type, MessageType::PeerJoined);
        assert_eq!(joined.peer_info().unwrap().name, "Bob");

        let left =
            WireMessage::decode(&WireMessage::peer_left(info.peer_id).encode().unwrap()).unwrap();
        assert_eq!(left.msg_type, MessageType::PeerLeft);
        assert_eq!(left.peer_id, info.peer_id);
        assert!(left.payload.is_empty());
    }

    #[test]
    fn test_ping_pong() {
        let peer = Uuid::new_v4();
        let ping = WireMessage::decode(&WireMessage::ping(peer).encode().unwrap()).unwrap();
        let pong = WireMessage::decode(&WireMessage::pong(peer).encode().unwrap()).unwrap();
        assert_eq!(ping.msg_type, MessageType::Ping);
        assert_eq!(pong.msg_type, MessageType::Pong);
    }

    #[test]
    fn test_typed_accessors_reject_wrong_kind() {
        let msg = WireMessage::ping(Uuid::new_v4());
        assert_eq!(msg.record().unwrap_err(), ProtocolError::InvalidMessageType);
        assert_eq!(msg.records().unwrap_err(), ProtocolError::InvalidMessageType);
        assert_eq!(
            msg.record_id().unwrap_err(),
            ProtocolError::InvalidMessageType
        );
        assert_eq!(
            msg.peer_info().unwrap_err(),
            ProtocolError::InvalidMessageType
        );
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let garbage = vec![0xFF, 0xFE, 0xFD];
        assert!(WireMessage::decode(&garbage).is_err());
    }
}
