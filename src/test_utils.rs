//! Test utilities and fixtures.
//!
//! Provides the temporary-database helper used by most database-backed
//! tests and a scripted in-memory metadata provider, so reconciliation
//! tests never depend on real audio files.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use crate::metadata::{MetadataError, MetadataProvider, SongMetadata};

/// Creates a temporary database for testing.
///
/// The database lives in a temporary directory that is cleaned up when
/// the returned `TempDir` is dropped; keep it alive for the duration of
/// the test. Migrations are run automatically.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Scripted metadata provider.
///
/// Returns whatever was staged with [`set`](StaticProvider::set) for a
/// path (default metadata for unstaged paths), fails for paths marked
/// with [`fail`](StaticProvider::fail), and counts every extraction so
/// tests can assert that hash-unchanged songs never reach the provider.
///
/// Clones share state, so a test can keep a handle after boxing one
/// into a reconciler.
#[derive(Clone)]
pub struct StaticProvider {
    records: Arc<Mutex<HashMap<PathBuf, SongMetadata>>>,
    failing: Arc<Mutex<HashSet<PathBuf>>>,
    calls: Arc<AtomicUsize>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Stage the metadata returned for a path.
    pub fn set(&self, path: &Path, metadata: SongMetadata) {
        self.records
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), metadata);
    }

    /// Make extraction fail for a path.
    pub fn fail(&self, path: &Path) {
        self.failing.lock().unwrap().insert(path.to_path_buf());
    }

    /// Clear a previously staged failure.
    pub fn unfail(&self, path: &Path) {
        self.failing.lock().unwrap().remove(path);
    }

    /// Number of extractions attempted so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StaticProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataProvider for StaticProvider {
    fn extract(&self, path: &Path) -> Result<SongMetadata, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(path) {
            return Err(MetadataError::Read {
                path: path.to_path_buf(),
                message: "staged failure".to_string(),
            });
        }

        Ok(self
            .records
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;

        let archives = crate::db::list_archives(&pool).await.unwrap();
        assert!(archives.is_empty());
    }

    #[test]
    fn test_static_provider_counts_and_fails() {
        let provider = StaticProvider::new();
        let path = Path::new("/music/a.mp3");

        assert!(provider.extract(path).is_ok());
        assert_eq!(provider.call_count(), 1);

        provider.fail(path);
        assert!(provider.extract(path).is_err());

        provider.unfail(path);
        assert!(provider.extract(path).is_ok());
        assert_eq!(provider.call_count(), 3);
    }

    #[test]
    fn test_static_provider_clones_share_state() {
        let provider = StaticProvider::new();
        let handle = provider.clone();
        let path = Path::new("/music/a.mp3");

        provider.set(
            path,
            SongMetadata {
                title: Some("Staged".to_string()),
                ..SongMetadata::default()
            },
        );

        let meta = handle.extract(path).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Staged"));
        assert_eq!(provider.call_count(), 1);
    }
}
