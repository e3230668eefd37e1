//! Atomic JSON reads and writes for session stores
//!
//! Every mutable store under the session root (config, state, runtime,
//! control, heartbeat) is replaced wholesale: serialize to a temp file in
//! the same directory, fsync, then rename over the target. Readers either
//! see the old payload or the new one, never a torn write.

use crate::io::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

/// Read a JSON file, returning `default()` when the file is absent.
///
/// A missing file is normal for stores that are created lazily; a present
/// but unparsable file is an error the caller must see.
pub fn read_json<T, F>(path: &Path, default: F) -> Result<T, StoreError>
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    if !path.exists() {
        return Ok(default());
    }
    let content = fs::read(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_slice(&content).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Atomically replace `path` with the JSON serialization of `payload`.
pub fn write_json<T: Serialize>(path: &Path, payload: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "store.json".to_string());
    let tmp_path = path.with_file_name(format!(
        ".{file_name}.tmp-{}",
        &Uuid::new_v4().simple().to_string()[..8]
    ));

    let content = serde_json::to_vec_pretty(payload).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;

    {
        let mut tmp_file = fs::File::create(&tmp_path).map_err(|e| StoreError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
        tmp_file.write_all(&content).map_err(|e| StoreError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
        tmp_file.sync_all().map_err(|e| StoreError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })
}
