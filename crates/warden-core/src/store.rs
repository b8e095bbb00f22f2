//! Embedding store: ordered label → embedding mapping persisted as a JSON blob.
//!
//! Saves replace the whole file (temp file + rename). There is no journaling;
//! a crash between write and rename leaves the previous file in place.

use crate::types::{Embedding, IdentityRecord};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store file is empty: {0}")]
    EmptyFile(String),
    #[error("malformed store: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported store version {0}")]
    UnsupportedVersion(u32),
    #[error("duplicate label in store: {0}")]
    DuplicateLabel(String),
    #[error("label must not be empty")]
    EmptyLabel,
}

/// Ordered set of enrolled identities. Labels are unique; iteration follows
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    records: Vec<IdentityRecord>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the embedding for `label`.
    ///
    /// An existing label keeps its position; a new label is appended.
    pub fn upsert(&mut self, label: &str, embedding: Embedding) -> Result<(), StoreError> {
        if label.trim().is_empty() {
            return Err(StoreError::EmptyLabel);
        }
        match self.records.iter_mut().find(|r| r.label == label) {
            Some(existing) => existing.embedding = embedding,
            None => self.records.push(IdentityRecord {
                label: label.to_string(),
                embedding,
            }),
        }
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&IdentityRecord> {
        self.records.iter().find(|r| r.label == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdentityRecord> {
        self.records.iter()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.label.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn from_records(records: Vec<IdentityRecord>) -> Result<Self, StoreError> {
        let mut gallery = Gallery::new();
        for record in records {
            if gallery.get(&record.label).is_some() {
                return Err(StoreError::DuplicateLabel(record.label));
            }
            if record.label.trim().is_empty() {
                return Err(StoreError::EmptyLabel);
            }
            gallery.records.push(record);
        }
        Ok(gallery)
    }
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    identities: Vec<IdentityRecord>,
}

/// File-backed embedding store.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    path: PathBuf,
}

impl EmbeddingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the gallery from disk.
    ///
    /// A missing file is a fresh install and yields an empty gallery. A
    /// zero-byte or undecodable file is an error so the caller can record it.
    pub fn load(&self) -> Result<Gallery, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no store file; starting empty");
                return Ok(Gallery::new());
            }
            Err(e) => return Err(e.into()),
        };

        if bytes.is_empty() {
            return Err(StoreError::EmptyFile(self.path.display().to_string()));
        }

        let file: StoreFile = serde_json::from_slice(&bytes)?;
        if file.version != STORE_FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion(file.version));
        }
        let gallery = Gallery::from_records(file.identities)?;
        tracing::debug!(path = %self.path.display(), count = gallery.len(), "store loaded");
        Ok(gallery)
    }

    /// Replace the on-disk store with `gallery`.
    pub fn save(&self, gallery: &Gallery) -> Result<(), StoreError> {
        let file = StoreFile {
            version: STORE_FORMAT_VERSION,
            identities: gallery.records.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(path = %self.path.display(), count = gallery.len(), "store saved");
        Ok(())
    }

    /// Remove every identity, persisting an empty store.
    pub fn clear(&self) -> Result<Gallery, StoreError> {
        let empty = Gallery::new();
        self.save(&empty)?;
        Ok(empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn emb(v: &[f32]) -> Embedding {
        Embedding::new(v.to_vec())
    }

    #[test]
    fn test_upsert_overwrites_in_place() {
        let mut g = Gallery::new();
        g.upsert("alice", emb(&[1.0])).unwrap();
        g.upsert("bob", emb(&[2.0])).unwrap();
        g.upsert("alice", emb(&[3.0])).unwrap();

        assert_eq!(g.len(), 2);
        assert_eq!(g.labels(), vec!["alice", "bob"]);
        assert_eq!(g.get("alice").unwrap().embedding, emb(&[3.0]));
    }

    #[test]
    fn test_upsert_rejects_blank_label() {
        let mut g = Gallery::new();
        assert!(matches!(g.upsert("  ", emb(&[1.0])), Err(StoreError::EmptyLabel)));
        assert!(g.is_empty());
    }

    #[test]
    fn test_save_load_preserves_order() {
        let dir = tempdir().unwrap();
        let store = EmbeddingStore::new(dir.path().join("faces.json"));

        let mut g = Gallery::new();
        g.upsert("zed", emb(&[0.1, 0.2])).unwrap();
        g.upsert("amy", emb(&[0.3, 0.4])).unwrap();
        store.save(&g).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, g);
        assert_eq!(loaded.labels(), vec!["zed", "amy"]);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = EmbeddingStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_zero_byte_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("faces.json");
        std::fs::write(&path, b"").unwrap();
        let store = EmbeddingStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::EmptyFile(_))));
    }

    #[test]
    fn test_garbage_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("faces.json");
        std::fs::write(&path, b"\x80\x03}q\x00garbage").unwrap();
        let store = EmbeddingStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Malformed(_))));
    }

    #[test]
    fn test_duplicate_labels_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("faces.json");
        std::fs::write(
            &path,
            r#"{"version":1,"identities":[{"label":"a","embedding":[1.0]},{"label":"a","embedding":[2.0]}]}"#,
        )
        .unwrap();
        let store = EmbeddingStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::DuplicateLabel(l)) if l == "a"));
    }

    #[test]
    fn test_clear_persists_empty_store() {
        let dir = tempdir().unwrap();
        let store = EmbeddingStore::new(dir.path().join("faces.json"));
        let mut g = Gallery::new();
        g.upsert("alice", emb(&[1.0])).unwrap();
        store.save(&g).unwrap();

        assert!(store.clear().unwrap().is_empty());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let store = EmbeddingStore::new(dir.path().join("nested/deeper/faces.json"));
        store.save(&Gallery::new()).unwrap();
        assert!(store.path().exists());
    }
}
