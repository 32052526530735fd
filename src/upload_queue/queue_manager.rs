//! Queue file persistence - load, rewrite, and lock the durable queue file.
//!
//! The file holds one JSON array of item references and is rewritten in full
//! on every mutation.

use crate::error::GeoCamError;
use fs2::FileExt;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::types::QueueItem;

/// Load the queue file. A missing file is an empty queue; unreadable or
/// malformed content is logged and also yields an empty queue.
pub fn load_queue_file(queue_file: &Path) -> VecDeque<QueueItem> {
    let content = match fs::read_to_string(queue_file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %queue_file.display(), "No queue file yet, starting empty");
            return VecDeque::new();
        }
        Err(e) => {
            warn!(path = %queue_file.display(), error = %e, "Failed to read queue file, starting empty");
            return VecDeque::new();
        }
    };

    match serde_json::from_str::<Vec<QueueItem>>(&content) {
        Ok(items) => items.into(),
        Err(e) => {
            warn!(path = %queue_file.display(), error = %e, "Malformed queue file, starting empty");
            VecDeque::new()
        }
    }
}

/// Overwrite the queue file with `items`. The JSON goes to a temp file in the
/// same directory which is then renamed over the target, so a reader sees
/// either the old or the new array.
pub fn persist_queue_file<'a, I>(queue_file: &Path, items: I) -> Result<(), GeoCamError>
where
    I: IntoIterator<Item = &'a QueueItem>,
{
    let items: Vec<&QueueItem> = items.into_iter().collect();
    let json = serde_json::to_vec(&items)?;

    let dir = queue_dir(queue_file);
    fs::create_dir_all(&dir)?;

    let mut temp = NamedTempFile::new_in(&dir)?;
    temp.write_all(&json)?;
    temp.as_file().sync_all()?;
    temp.persist(queue_file).map_err(|e| GeoCamError::Io(e.error))?;

    Ok(())
}

/// Take an exclusive advisory lock on `<queue_file>.lock`. The lock lives as
/// long as the returned file handle.
pub fn lock_queue_file(queue_file: &Path) -> Result<File, GeoCamError> {
    let dir = queue_dir(queue_file);
    fs::create_dir_all(&dir)?;

    let lock_path = lock_file_path(queue_file);
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)?;

    lock_file
        .try_lock_exclusive()
        .map_err(|_| GeoCamError::QueueLocked(lock_path.display().to_string()))?;

    Ok(lock_file)
}

fn lock_file_path(queue_file: &Path) -> PathBuf {
    let mut name = queue_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    queue_file.with_file_name(name)
}

fn queue_dir(queue_file: &Path) -> PathBuf {
    match queue_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
