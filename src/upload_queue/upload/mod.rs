//! Per-item upload procedure.
//!
//! Resolves a queue item through the content store, builds the multipart
//! request, and runs one transfer.

pub mod retry;
pub mod transport;

pub use retry::{classify_status, ErrorType, RetryStrategy};
pub use transport::{
    interpret_response, is_confirmed, Credentials, HttpTransport, UploadRequest, UploadTransport,
    CONFIRMATION_MARKER,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::DateTime;

use crate::content_store::{ContentStore, PhotoMetadata, PhotoRecord};
use crate::error::GeoCamError;
use crate::upload_queue::types::{QueueItem, STATUS_OK};

/// Multipart field carrying the photo bytes.
pub const PHOTO_FIELD_NAME: &str = "photo";

/// Where and as whom uploads are sent
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub url: String,
    pub credentials: Option<Credentials>,
}

/// Result of one pass of the per-item procedure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Transfer confirmed; the item can leave the queue
    Uploaded { status: i32 },
    /// The item can never be uploaded; drop it and move on
    Dropped { reason: String },
    /// Transfer failed; keep the item at the head and retry later
    Failed { status: i32 },
}

/// Form fields sent next to the photo.
pub fn build_form_fields(metadata: &PhotoMetadata) -> BTreeMap<String, String> {
    let camera_time = DateTime::from_timestamp_millis(metadata.capture_time_millis)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| metadata.capture_time_millis.to_string());

    let mut fields = BTreeMap::new();
    fields.insert("cameraTime".to_string(), camera_time);
    fields.insert("latitude".to_string(), metadata.latitude.to_string());
    fields.insert("longitude".to_string(), metadata.longitude.to_string());
    fields.insert("roll".to_string(), metadata.roll.to_string());
    fields.insert("pitch".to_string(), metadata.pitch.to_string());
    fields.insert("yaw".to_string(), metadata.yaw.to_string());
    fields.insert("notes".to_string(), metadata.note.clone());
    if let Some(tag) = &metadata.tag {
        fields.insert("tags".to_string(), tag.clone());
    }
    if let Some(uuid) = &metadata.uuid {
        fields.insert("uuid".to_string(), uuid.clone());
    }
    fields
}

pub fn build_request(record: PhotoRecord, target: &UploadTarget) -> UploadRequest {
    UploadRequest {
        url: target.url.clone(),
        form_fields: build_form_fields(&record.metadata),
        file_field_name: PHOTO_FIELD_NAME.to_string(),
        file_name: record.file_name,
        file_bytes: record.bytes,
        credentials: target.credentials.clone(),
    }
}

/// Look up `item`, upload it, and interpret the transport status.
pub async fn process_upload_item<C, T>(
    item: &QueueItem,
    content_store: &Arc<C>,
    transport: &T,
    target: &UploadTarget,
) -> UploadOutcome
where
    C: ContentStore,
    T: UploadTransport,
{
    let record = match lookup_blocking(item, content_store).await {
        Ok(record) => record,
        Err(e) => {
            return UploadOutcome::Dropped {
                reason: e.to_string(),
            }
        }
    };

    let status = transport.post(build_request(record, target)).await;
    if status == STATUS_OK {
        UploadOutcome::Uploaded { status }
    } else {
        UploadOutcome::Failed { status }
    }
}

/// Content lookups read whole photos from disk, so they run off the async workers.
async fn lookup_blocking<C: ContentStore>(
    item: &QueueItem,
    content_store: &Arc<C>,
) -> Result<PhotoRecord, GeoCamError> {
    let store = Arc::clone(content_store);
    let item = item.clone();
    tokio::task::spawn_blocking(move || store.lookup(&item))
        .await
        .map_err(|e| GeoCamError::Other(format!("Content lookup task failed: {}", e)))?
}
