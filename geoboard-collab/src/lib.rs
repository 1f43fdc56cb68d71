//! # geoboard-collab — Real-time collaboration layer for geoboard
//!
//! Server-authoritative synchronization of named map features over
//! WebSockets.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     WebSocket      ┌──────────────┐
//! │ SyncClient   │ ◄─────────────────► │ SyncServer   │
//! │ (per user)   │    Binary Proto     │ (authority)  │
//! └──────┬───────┘                     └──────┬───────┘
//!        │                                    │
//!        ▼                                    ▼
//! ┌──────────────┐                     ┌──────────────┐
//! │ EditorSession│                     │ RecordStore  │
//! │ + Mirror     │                     │ (JSON file)  │
//! └──────────────┘                     └──────┬───────┘
//!                                             │
//!                                     ┌───────┴───────┐
//!                                     │ BroadcastGroup│
//!                                     │ (fan-out)     │
//!                                     └───────────────┘
//! ```
//!
//! Every accepted mutation is applied to the store, persisted, and fanned
//! out to **all** connections — the originator included. Mirrors are
//! idempotent by record id, so the self-echo collapses into the optimistic
//! local copy instead of duplicating it.
//!
//! ## Modules
//!
//! - [`protocol`] — Binary wire protocol (bincode-encoded WireMessage)
//! - [`broadcast`] — Fan-out group with per-peer buffering
//! - [`storage`] — Authoritative record store with JSON-file persistence
//! - [`server`] — WebSocket sync server
//! - [`client`] — WebSocket sync client
//! - [`session`] — Client-side interaction state machine (draw/edit/delete)

pub mod protocol;
pub mod broadcast;
pub mod storage;
pub mod server;
pub mod client;
pub mod session;

// Re-exports for convenience
pub use broadcast::{BroadcastGroup, BroadcastStats};
pub use client::{ConnectionState, SyncClient, SyncEvent};
pub use protocol::{MessageType, PeerInfo, ProtocolError, WireMessage};
pub use server::{ServerConfig, ServerStats, SyncServer};
pub use session::{
    EditorMode, EditorSession, Emphasis, MutationSender, Prompter, SessionError,
};
pub use storage::{DeleteOutcome, JsonFile, RecordStore, StoreError, UpdateOutcome};
