//! Atomic JSON artifact writes and checkpoint path derivation.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error for {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Serialize `value` to `path` atomically: write to a temp file in the same
/// directory, then rename into place. A crash mid-write never leaves a
/// truncated artifact behind.
pub fn save_json_atomic<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), PersistError> {
    let path = path.as_ref();
    let io_err = |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    serde_json::to_writer_pretty(&tmp, value).map_err(|source| PersistError::Serde {
        path: path.to_path_buf(),
        source,
    })?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Default checkpoint path for a run: `{base}/{dataset}/{model}_autosave.json`.
pub fn autosave_path(base: impl AsRef<Path>, dataset: &str, model: &str) -> PathBuf {
    base.as_ref()
        .join(dataset)
        .join(format!("{model}_autosave.json"))
}
