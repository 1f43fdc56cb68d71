//! The client-side reflection of the server-held record set.
//!
//! A mirror is derived, disposable state: it must be reconstructible at any
//! moment from a `Snapshot` plus the delta broadcasts that follow it. The
//! server fans every accepted mutation out to *all* connections — the
//! originator included — so the application methods here are deliberately
//! idempotent: the echo of a client's own optimistic insert collapses into
//! the copy that is already present instead of duplicating it.

use std::collections::HashMap;

use uuid::Uuid;

use crate::geometry::Geometry;
use crate::record::FeatureRecord;

/// Per-client in-memory reflection of the record set, keyed by id.
#[derive(Debug, Default)]
pub struct FeatureMirror {
    features: HashMap<Uuid, FeatureRecord>,
}

impl FeatureMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire mirror with a server snapshot (connect-time
    /// baseline).
    pub fn apply_snapshot(&mut self, records: Vec<FeatureRecord>) {
        self.features.clear();
        for record in records {
            self.features.insert(record.id, record);
        }
    }

    /// Apply a `created` event. Idempotent by id: if a representation with
    /// this id already exists (the originator's own optimistic copy, or a
    /// record seen in both the snapshot and a concurrent broadcast), the
    /// event is skipped. Returns whether the record was inserted.
    pub fn apply_created(&mut self, record: FeatureRecord) -> bool {
        if self.features.contains_key(&record.id) {
            log::debug!("mirror: create for {} already present, skipped", record.id);
            return false;
        }
        self.features.insert(record.id, record);
        true
    }

    /// Apply an `updated` event: last write wins. An update for an unknown
    /// id is dropped, consistent with the store treating such updates as
    /// missing-target. Returns whether the update applied.
    pub fn apply_updated(&mut self, record: FeatureRecord) -> bool {
        match self.features.get_mut(&record.id) {
            Some(existing) => {
                *existing = record;
                true
            }
            None => {
                log::debug!("mirror: update for unknown {} dropped", record.id);
                false
            }
        }
    }

    /// Apply a `deleted` event. Idempotent: removing an absent id is a
    /// no-op. Returns the removed record, if any.
    pub fn apply_deleted(&mut self, id: Uuid) -> Option<FeatureRecord> {
        self.features.remove(&id)
    }

    /// Reinstate a record unconditionally. Used by the edit-cancel rollback
    /// path, which must restore the pre-edit copy even though a record with
    /// the same id is (by design) already present.
    pub fn restore(&mut self, record: FeatureRecord) {
        self.features.insert(record.id, record);
    }

    /// Replace only the geometry of a present record (live edit preview).
    /// Returns whether the id was known.
    pub fn set_geometry(&mut self, id: Uuid, geometry: Geometry) -> bool {
        match self.features.get_mut(&id) {
            Some(record) => {
                record.geometry = geometry;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<&FeatureRecord> {
        self.features.get(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.features.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// All mirrored records, in no particular order.
    pub fn records(&self) -> Vec<&FeatureRecord> {
        self.features.values().collect()
    }

    /// Ids currently present, in no particular order.
    pub fn ids(&self) -> Vec<Uuid> {
        self.features.keys().copied().collect()
    }
}
