//! The authoritative record collection.

use std::path::PathBuf;

use uuid::Uuid;

use geoboard_core::{FeatureRecord, Geometry};

use crate::storage::file::JsonFile;

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The durable write failed. In-memory state may now be ahead of disk
    /// until the next successful write.
    Persistence(String),
    /// The collection could not be serialized.
    Serialization(String),
    /// A create named an id the store already holds.
    DuplicateId(Uuid),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persistence(e) => write!(f, "persistence failed: {e}"),
            Self::Serialization(e) => write!(f, "serialization failed: {e}"),
            Self::DuplicateId(id) => write!(f, "duplicate record id {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Result of an update call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record was replaced; carries the store's application sequence.
    Updated(u64),
    /// No record with that id exists. Nothing changed.
    Missing,
}

/// Result of a delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The record was removed; carries the store's application sequence.
    Deleted(u64),
    /// No record with that id exists. Nothing changed.
    Missing,
}

/// The authoritative, ordered record collection.
///
/// A `RecordStore` is an explicitly owned single-writer object: the server
/// holds it behind one `RwLock` and applies mutations strictly one at a
/// time, so operations are linearizable with respect to each other. Every
/// mutation rewrites the durable document before the call returns — a
/// broadcast referencing a record must never precede its persistence.
///
/// Known gap: if the durable write fails, the in-memory change is *not*
/// rolled back. The caller gets the error (and must suppress its
/// broadcast); memory and disk reconverge on the next successful write.
#[derive(Debug)]
pub struct RecordStore {
    records: Vec<FeatureRecord>,
    file: Option<JsonFile>,
    /// Count of accepted mutations, used to stamp broadcasts.
    applied: u64,
}

impl RecordStore {
    /// A store with no durable backing (tests, ephemeral boards).
    pub fn in_memory() -> Self {
        Self {
            records: Vec::new(),
            file: None,
            applied: 0,
        }
    }

    /// Open a store backed by the given JSON document.
    ///
    /// An absent or corrupt document loads as an empty collection.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let file = JsonFile::new(path);
        let records = file.load();
        log::info!(
            "record store opened with {} records from {}",
            records.len(),
            file.path().display()
        );
        Self {
            records,
            file: Some(file),
            applied: 0,
        }
    }

    /// Append a record and persist the collection.
    ///
    /// Returns the mutation sequence number on success. A duplicate id is
    /// rejected outright — the id population must stay collision-free even
    /// if a client misbehaves.
    pub fn create(&mut self, record: FeatureRecord) -> Result<u64, StoreError> {
        if self.records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }
        self.records.push(record);
        self.applied += 1;
        let seq = self.applied;
        self.persist()?;
        Ok(seq)
    }

    /// Replace a record's geometry and label in place and persist.
    ///
    /// A missing target is reported, not swallowed: the caller decides
    /// whether silence is the right answer for its protocol.
    pub fn update(
        &mut self,
        id: Uuid,
        geometry: Geometry,
        label: String,
    ) -> Result<UpdateOutcome, StoreError> {
        let Some(record) = self.records.iter_mut().find(|r| r.id == id) else {
            return Ok(UpdateOutcome::Missing);
        };
        record.geometry = geometry;
        record.label = label;
        self.applied += 1;
        let seq = self.applied;
        self.persist()?;
        Ok(UpdateOutcome::Updated(seq))
    }

    /// Remove a record if present and persist. Idempotent.
    pub fn delete(&mut self, id: Uuid) -> Result<DeleteOutcome, StoreError> {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        if self.records.len() == before {
            return Ok(DeleteOutcome::Missing);
        }
        self.applied += 1;
        let seq = self.applied;
        self.persist()?;
        Ok(DeleteOutcome::Deleted(seq))
    }

    /// The full current collection, for seeding a new connection's mirror.
    pub fn snapshot(&self) -> Vec<FeatureRecord> {
        self.records.clone()
    }

    pub fn get(&self, id: &Uuid) -> Option<&FeatureRecord> {
        self.records.iter().find(|r| r.id == *id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.records.iter().any(|r| r.id == *id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of mutations accepted since the store was opened.
    pub fn applied_mutations(&self) -> u64 {
        self.applied
    }

    fn persist(&self) -> Result<(), StoreError> {
        match &self.file {
            Some(file) => file.save(&self.records),
            None => Ok(()),
        }
    }
}
