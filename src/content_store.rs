//! Photo content store - resolves queue items to metadata and file bytes.
//!
//! The queue only carries references; everything the upload needs is looked
//! up here at upload time.

use crate::error::GeoCamError;
use crate::upload_queue::QueueItem;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Capture metadata recorded alongside a photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoMetadata {
    pub capture_time_millis: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
}

/// Everything needed to upload one queue item
#[derive(Debug, Clone)]
pub struct PhotoRecord {
    pub file_name: String,
    pub metadata: PhotoMetadata,
    pub bytes: Vec<u8>,
}

pub trait ContentStore: Send + Sync + 'static {
    /// Resolve `item`. `GeoCamError::ContentNotFound` (or any other error)
    /// means the item can never be uploaded.
    fn lookup(&self, item: &QueueItem) -> Result<PhotoRecord, GeoCamError>;
}

/// Photos stored as files under one root, each with a `<name>.json` sidecar
/// holding its [`PhotoMetadata`].
#[derive(Debug, Clone)]
pub struct DirectoryContentStore {
    root: PathBuf,
}

impl DirectoryContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the sidecar for `item`, assigning a uuid when none is set.
    pub fn annotate(
        &self,
        item: &QueueItem,
        mut metadata: PhotoMetadata,
    ) -> Result<PhotoMetadata, GeoCamError> {
        let photo_path = self.photo_path(item)?;
        if !photo_path.is_file() {
            return Err(GeoCamError::ContentNotFound(format!(
                "{} (no photo at {})",
                item,
                photo_path.display()
            )));
        }

        if metadata.uuid.is_none() {
            metadata.uuid = Some(Uuid::new_v4().to_string());
        }

        let content = serde_json::to_string_pretty(&metadata)?;
        fs::write(sidecar_path(&photo_path), content)?;
        debug!(item = %item, "Wrote photo annotation");

        Ok(metadata)
    }

    fn photo_path(&self, item: &QueueItem) -> Result<PathBuf, GeoCamError> {
        let relative = Path::new(item.as_str());
        let is_plain_relative = !item.as_str().is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !is_plain_relative {
            return Err(GeoCamError::ContentNotFound(format!(
                "{} (not a path inside the photo store)",
                item
            )));
        }

        Ok(self.root.join(relative))
    }
}

fn sidecar_path(photo_path: &Path) -> PathBuf {
    let mut name = photo_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".json");
    photo_path.with_file_name(name)
}

impl ContentStore for DirectoryContentStore {
    fn lookup(&self, item: &QueueItem) -> Result<PhotoRecord, GeoCamError> {
        let photo_path = self.photo_path(item)?;

        let metadata_json = fs::read_to_string(sidecar_path(&photo_path)).map_err(|e| {
            GeoCamError::ContentNotFound(format!("{} (metadata unreadable: {})", item, e))
        })?;
        let metadata: PhotoMetadata = serde_json::from_str(&metadata_json).map_err(|e| {
            GeoCamError::ContentNotFound(format!("{} (metadata malformed: {})", item, e))
        })?;

        let bytes = fs::read(&photo_path).map_err(|e| {
            GeoCamError::ContentNotFound(format!("{} (photo unreadable: {})", item, e))
        })?;

        let file_name = photo_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| GeoCamError::ContentNotFound(format!("{} (invalid file name)", item)))?
            .to_string();

        Ok(PhotoRecord {
            file_name,
            metadata,
            bytes,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    pub(crate) fn sample_metadata() -> PhotoMetadata {
        PhotoMetadata {
            capture_time_millis: 1_700_000_000_000,
            latitude: 37.4158,
            longitude: -122.0649,
            roll: 1.5,
            pitch: -3.25,
            yaw: 270.0,
            note: "north ridge".to_string(),
            tag: Some("survey".to_string()),
            uuid: None,
        }
    }

    #[test]
    fn test_annotate_then_lookup() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("photo_abc.jpg"), b"jpeg-bytes").unwrap();
        let store = DirectoryContentStore::new(dir.path());
        let item = QueueItem::new("photo_abc.jpg");

        let written = store.annotate(&item, sample_metadata()).unwrap();
        assert!(written.uuid.is_some());

        let record = store.lookup(&item).unwrap();
        assert_eq!(record.file_name, "photo_abc.jpg");
        assert_eq!(record.bytes, b"jpeg-bytes");
        assert_eq!(record.metadata, written);
    }

    #[test]
    fn test_annotate_keeps_existing_uuid() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        let store = DirectoryContentStore::new(dir.path());

        let mut metadata = sample_metadata();
        metadata.uuid = Some("fixed-uuid".to_string());
        let written = store.annotate(&QueueItem::new("a.jpg"), metadata).unwrap();

        assert_eq!(written.uuid.as_deref(), Some("fixed-uuid"));
    }

    #[test]
    fn test_annotate_requires_photo() {
        let dir = tempdir().unwrap();
        let store = DirectoryContentStore::new(dir.path());

        let err = store
            .annotate(&QueueItem::new("missing.jpg"), sample_metadata())
            .unwrap_err();
        assert!(matches!(err, GeoCamError::ContentNotFound(_)));
    }

    #[test]
    fn test_lookup_missing_entries_are_not_found() {
        let dir = tempdir().unwrap();
        let store = DirectoryContentStore::new(dir.path());

        // No photo and no sidecar
        assert!(matches!(
            store.lookup(&QueueItem::new("nothing.jpg")),
            Err(GeoCamError::ContentNotFound(_))
        ));

        // Photo without sidecar
        fs::write(dir.path().join("bare.jpg"), b"x").unwrap();
        assert!(matches!(
            store.lookup(&QueueItem::new("bare.jpg")),
            Err(GeoCamError::ContentNotFound(_))
        ));

        // Sidecar that is not metadata
        fs::write(dir.path().join("bad.jpg"), b"x").unwrap();
        fs::write(dir.path().join("bad.jpg.json"), "{\"note\": 1}").unwrap();
        assert!(matches!(
            store.lookup(&QueueItem::new("bad.jpg")),
            Err(GeoCamError::ContentNotFound(_))
        ));
    }

    #[test]
    fn test_lookup_rejects_paths_outside_root() {
        let dir = tempdir().unwrap();
        let store = DirectoryContentStore::new(dir.path().join("photos"));

        for reference in ["../secret.jpg", "/etc/passwd", ""] {
            assert!(matches!(
                store.lookup(&QueueItem::new(reference)),
                Err(GeoCamError::ContentNotFound(_))
            ));
        }
    }

    #[test]
    fn test_metadata_json_is_camel_case() {
        let json = serde_json::to_value(sample_metadata()).unwrap();
        assert_eq!(json["captureTimeMillis"], 1_700_000_000_000i64);
        assert_eq!(json["tag"], "survey");
    }
}
