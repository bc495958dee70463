//! Atomic file I/O: write to a temp file in the target directory, fsync,
//! then rename into place.

use crate::error::{ScoutError, ScoutResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const TEMP_SUFFIX: &str = ".tmp";

/// Temp path next to `path`, unique per write
fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".to_string());
    let temp_name = format!(".{}.{}{}", file_name, uuid::Uuid::new_v4().simple(), TEMP_SUFFIX);
    path.with_file_name(temp_name)
}

/// Whether `path` is an in-progress (or abandoned) atomic write
pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.') && name.ends_with(TEMP_SUFFIX))
}

/// Atomically replace `path` with `bytes`
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> ScoutResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            ScoutError::persistence_at(format!("Failed to create directory: {}", e), parent)
        })?;
    }

    let temp_path = temp_path_for(path);
    let written = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok::<_, std::io::Error>(())
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path).await;
        return Err(ScoutError::persistence_at(
            format!("Failed to write temp file: {}", e),
            &temp_path,
        ));
    }

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(ScoutError::persistence_at(
            format!("Failed to rename temp file: {}", e),
            path,
        ));
    }

    Ok(())
}

/// Blocking variant of [`atomic_write`] for shutdown paths without a runtime
pub fn atomic_write_sync(path: &Path, bytes: &[u8]) -> ScoutResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ScoutError::persistence_at(format!("Failed to create directory: {}", e), parent)
        })?;
    }

    let temp_path = temp_path_for(path);
    let written = (|| {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()
    })();

    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(ScoutError::persistence_at(
            format!("Failed to write temp file: {}", e),
            &temp_path,
        ));
    }

    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        ScoutError::persistence_at(format!("Failed to rename temp file: {}", e), path)
    })
}

/// Serialize `value` as pretty JSON and write it atomically
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> ScoutResult<()> {
    let content = serde_json::to_vec_pretty(value)
        .map_err(|e| ScoutError::persistence_at(format!("Failed to serialize: {}", e), path))?;
    atomic_write(path, &content).await
}

/// Read a JSON document; a missing file yields `None`
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> ScoutResult<Option<T>> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ScoutError::persistence_at(
                format!("Failed to read file: {}", e),
                path,
            ));
        }
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|e| ScoutError::persistence_at(format!("Corrupted JSON document: {}", e), path))
}

/// Remove a file; a missing file is not an error
pub async fn remove_file_if_exists(path: &Path) -> ScoutResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ScoutError::persistence_at(
            format!("Failed to remove file: {}", e),
            path,
        )),
    }
}

/// Delete abandoned temp files in `dir` and its immediate sub-directories
pub async fn remove_stale_temp_files(dir: &Path) -> ScoutResult<usize> {
    let mut removed = 0;
    let mut pending = vec![(dir.to_path_buf(), 0usize)];

    while let Some((current, depth)) = pending.pop() {
        let mut entries = match fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(ScoutError::persistence_at(
                    format!("Failed to read directory: {}", e),
                    &current,
                ));
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() && depth == 0 {
                pending.push((path, depth + 1));
            } else if file_type.is_file() && is_temp_file(&path) {
                if remove_file_if_exists(&path).await? {
                    removed += 1;
                }
            }
        }
    }

    if removed > 0 {
        tracing::info!(removed, dir = %dir.display(), "removed abandoned temp files");
    }
    Ok(removed)
}
