//! On-disk snapshots of scrape results, one JSON file per operator.
//!
//! A snapshot is the last successfully fetched [`ParserResult`] for an
//! operator. It is read back when a live fetch fails, or instead of any
//! fetch in offline mode.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::timetable::ParserResult;

/// Errors from reading or writing snapshot files.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("snapshot JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Directory of `<operator>-train.json` files.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot file for `operator`.
    pub fn path_for(&self, operator: &str) -> PathBuf {
        self.dir.join(format!("{operator}-train.json"))
    }

    /// Write `data` as pretty JSON, creating the directory if needed.
    ///
    /// The JSON goes to a temporary file in the same directory which is then
    /// renamed over `<operator>-train.json`, so readers never see a partial
    /// file. Blocking; call from `spawn_blocking` inside async code.
    pub fn save(&self, operator: &str, data: &ParserResult) -> Result<(), SnapshotError> {
        let path = self.path_for(operator);
        let dir = if self.dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            self.dir.as_path()
        };

        std::fs::create_dir_all(dir).map_err(|source| SnapshotError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let json = serde_json::to_vec_pretty(data).map_err(|source| SnapshotError::Json {
            path: path.clone(),
            source,
        })?;

        let io_err = |source: std::io::Error| SnapshotError::Io {
            path: path.clone(),
            source,
        };
        let mut file = NamedTempFile::new_in(dir).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.as_file().sync_all().map_err(io_err)?;
        file.persist(&path).map_err(|e| io_err(e.error))?;

        debug!(operator, path = %path.display(), stations = data.len(), "snapshot written");
        Ok(())
    }

    /// Read the snapshot for `operator`.
    ///
    /// Returns `Ok(None)` if no snapshot file exists. A file that exists but
    /// cannot be read or parsed is an error.
    pub fn load(&self, operator: &str) -> Result<Option<ParserResult>, SnapshotError> {
        let path = self.path_for(operator);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SnapshotError::Io { path, source }),
        };

        let data: ParserResult =
            serde_json::from_str(&contents).map_err(|source| SnapshotError::Json {
                path: path.clone(),
                source,
            })?;

        debug!(operator, path = %path.display(), stations = data.len(), "snapshot loaded");
        Ok(Some(data))
    }
}
