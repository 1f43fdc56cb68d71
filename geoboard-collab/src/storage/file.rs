//! The JSON document backing the record store.

use std::fs;
use std::path::{Path, PathBuf};

use geoboard_core::FeatureRecord;

use crate::storage::store::StoreError;

/// A records file: one pretty-printed JSON array, rewritten atomically.
///
/// Loading is lenient — an absent or unparseable file yields an empty
/// collection, so a fresh deployment and a corrupted one both come up
/// serving an empty board rather than refusing to start. Writing goes
/// through a sibling temp file and a rename, so a crash mid-write leaves
/// the previous document intact.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record collection, treating absence and corruption as empty.
    pub fn load(&self) -> Vec<FeatureRecord> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                log::warn!(
                    "records file {} unreadable ({e}), starting empty",
                    self.path.display()
                );
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                log::warn!(
                    "records file {} corrupt ({e}), starting empty",
                    self.path.display()
                );
                Vec::new()
            }
        }
    }

    /// Rewrite the whole document.
    pub fn save(&self, records: &[FeatureRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).map_err(|e| StoreError::Persistence(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::Persistence(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoboard_core::Geometry;

    fn record(label: &str) -> FeatureRecord {
        FeatureRecord::new(
            Geometry::from_ring(vec![[0.0, 0.0], [1.0, 0.0], [0.5, 1.0]]).unwrap(),
            label,
        )
    }

    #[test]
    fn test_absent_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("missing.json"));
        assert!(file.load().is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("records.json"));

        let records = vec![record("a"), record("b")];
        file.save(&records).unwrap();
        assert_eq!(file.load(), records);
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, "{not json!").unwrap();

        let file = JsonFile::new(&path);
        assert!(file.load().is_empty());
    }

    #[test]
    fn test_save_replaces_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("records.json"));

        file.save(&[record("old")]).unwrap();
        let newer = vec![record("new")];
        file.save(&newer).unwrap();
        assert_eq!(file.load(), newer);
    }

    #[test]
    fn test_save_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("no/such/dir/records.json"));
        let err = file.save(&[record("x")]).unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)));
    }

    #[test]
    fn test_document_is_a_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let file = JsonFile::new(&path);
        file.save(&[record("Zone1")]).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array[0]["label"], "Zone1");
    }
}
