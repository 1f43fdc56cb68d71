//! Durable storage for the authoritative record collection.
//!
//! Architecture:
//! ```text
//! ┌─────────────┐   create/update/delete   ┌──────────────┐
//! │ SyncServer  │ ───────────────────────► │ RecordStore  │
//! │ (write lock)│                          │ (in-memory)  │
//! └─────────────┘                          └──────┬───────┘
//!                                                 │ every mutation
//!                                                 ▼
//!                                          ┌──────────────┐
//!                                          │ JsonFile     │
//!                                          │ (tmp+rename) │
//!                                          └──────────────┘
//! ```
//!
//! The durable form is a single pretty-printed JSON array of records,
//! rewritten in full on every mutation. The record volume is
//! interactive-scale, so write amplification is a non-issue and the whole
//! store fits in one human-inspectable document.

pub mod file;
pub mod store;

pub use file::JsonFile;
pub use store::{DeleteOutcome, RecordStore, StoreError, UpdateOutcome};
