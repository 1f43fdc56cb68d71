//! The named map feature owned by the record store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::Geometry;

/// A single named geometric shape with globally unique identity.
///
/// Ids are random v4 UUIDs allocated by whichever client creates the record,
/// so independent sessions never collide and an id is never reused after
/// deletion. The server is the sole long-lived owner of record state; every
/// client holds only a disposable mirrored copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub id: Uuid,
    pub geometry: Geometry,
    pub label: String,
}

impl FeatureRecord {
    /// Create a record with a freshly allocated id.
    pub fn new(geometry: Geometry, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            geometry,
            label: label.into(),
        }
    }

    /// Create with an explicit id (mirror reconstruction, tests).
    pub fn with_id(id: Uuid, geometry: Geometry, label: impl Into<String>) -> Self {
        Self {
            id,
            geometry,
            label: label.into(),
        }
    }
}
