//! Snapshot directory I/O: one pretty-printed `<kind>.json` document per resource kind.

use std::path::{Path, PathBuf};

use cms_sync_core::contract::ResourceKind;
use cms_sync_core::synchronise::KindSnapshot;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not create snapshot directory {}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid JSON", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{} does not hold a {kind} snapshot: {message}", .path.display())]
    Shape {
        path: PathBuf,
        kind: ResourceKind,
        message: String,
    },
}

pub fn snapshot_path(dir: &Path, kind: ResourceKind) -> PathBuf {
    dir.join(kind.file_name())
}

/// Create `dir` and any missing parents.
pub async fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    tokio::fs::create_dir_all(dir).await.map_err(|source| {
        error!(dir = %dir.display(), error = %source, "Failed to create snapshot directory");
        StoreError::CreateDir {
            path: dir.to_path_buf(),
            source,
        }
    })
}

/// Write `snapshot` to `<dir>/<kind>.json` with 2-space indentation and a trailing newline.
pub async fn write_snapshot(dir: &Path, snapshot: &KindSnapshot) -> Result<PathBuf, StoreError> {
    let kind = snapshot.kind();
    let path = snapshot_path(dir, kind);
    let value = snapshot.to_json().map_err(|source| StoreError::Parse {
        path: path.clone(),
        source,
    })?;
    let mut content = serde_json::to_string_pretty(&value).map_err(|source| StoreError::Parse {
        path: path.clone(),
        source,
    })?;
    content.push('\n');

    tokio::fs::write(&path, content)
        .await
        .map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
    debug!(kind = %kind, path = %path.display(), "Snapshot written");
    Ok(path)
}

/// Read and parse `<dir>/<kind>.json`.
pub async fn read_snapshot(dir: &Path, kind: ResourceKind) -> Result<KindSnapshot, StoreError> {
    let path = snapshot_path(dir, kind);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;
    let value: Value = serde_json::from_str(&content).map_err(|source| StoreError::Parse {
        path: path.clone(),
        source,
    })?;
    let snapshot = KindSnapshot::from_json(kind, value).map_err(|e| StoreError::Shape {
        path: path.clone(),
        kind,
        message: e.to_string(),
    })?;
    debug!(kind = %kind, path = %path.display(), "Snapshot read");
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_pretty_json_with_trailing_newline() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_dir(&nested).await.unwrap();

        let snapshot = KindSnapshot::Schema(json!({ "version": 1 }));
        let path = write_snapshot(&nested, &snapshot).await.unwrap();

        assert_eq!(path, nested.join("schema.json"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "{\n  \"version\": 1\n}\n");
        assert_eq!(read_snapshot(&nested, ResourceKind::Schema).await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let dir = tempdir().unwrap();
        let err = read_snapshot(dir.path(), ResourceKind::Folders).await.unwrap_err();
        assert!(matches!(err, StoreError::Read { .. }));
        assert!(err.to_string().ends_with("folders.json"));
    }

    #[tokio::test]
    async fn wrong_shape_names_the_kind() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("translations.json"), "{\"key\": \"x\"}").unwrap();
        let err = read_snapshot(dir.path(), ResourceKind::Translations)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Shape { kind: ResourceKind::Translations, .. }));

        std::fs::write(dir.path().join("translations.json"), "not json").unwrap();
        let err = read_snapshot(dir.path(), ResourceKind::Translations)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }
}
