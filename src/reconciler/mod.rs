//! Archive reconciliation: keeping song records in sync with the files
//! on disk.
//!
//! The reconciler owns three operations:
//!
//! - [`Reconciler::quick_scan`]: existence-only reconciliation. Deletes
//!   records whose file is gone, then walks the root folder and creates
//!   bare records for unknown audio files. Metadata is never touched.
//! - [`Reconciler::scan`]: quick_scan followed by a metadata refresh of
//!   every surviving song through the local provider.
//! - [`Reconciler::deep_scan`]: like scan, but refreshes through the
//!   higher-fidelity remote provider when one is configured.
//!
//! Reconciliation is diff-based: existing records are kept so ratings
//! and play counts survive rescans. The deletion pass always completes
//! before the filesystem walk begins, so a path reused by a new file is
//! never mistaken for an existing record mid-scan.
//!
//! The refresh step is the performance-sensitive part: a song whose
//! content hash is unchanged since the last refresh is skipped without
//! re-parsing its tags. Per-song extraction failures are logged and the
//! scan moves on; only database errors abort the whole operation.
//!
//! Callers must serialize operations per archive; concurrent scans of
//! the same archive can race on the record set.

use std::path::Path;

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::db;
use crate::error::Result;
use crate::hash;
use crate::metadata::{MetadataProvider, TagReader};
use crate::model::Archive;
use crate::scanner;

/// Progress callback: (completed_count, total_count), fired exactly once
/// per song with completed_count strictly increasing from 1 to total.
pub type Progress<'a> = &'a mut dyn FnMut(usize, usize);

/// Outcome of the existence-only reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Records created for newly discovered files
    pub added: usize,
    /// Records deleted because their file is gone
    pub removed: usize,
}

/// Outcome of a metadata refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Songs whose metadata was re-extracted and stored
    pub refreshed: usize,
    /// Songs skipped because their content hash was unchanged
    pub skipped: usize,
    /// Songs whose hash or metadata read failed (non-fatal)
    pub failed: usize,
}

/// The archive synchronization engine.
///
/// Holds the injected configuration (supported extensions) and metadata
/// collaborators. The remote provider is optional; deep scans fall back
/// to the local provider when it is absent.
pub struct Reconciler {
    pool: SqlitePool,
    extensions: Vec<String>,
    local: Box<dyn MetadataProvider>,
    remote: Option<Box<dyn MetadataProvider>>,
}

impl Reconciler {
    /// Create a reconciler with the default lofty-backed local provider.
    pub fn new(pool: SqlitePool, extensions: Vec<String>) -> Self {
        Self::with_providers(pool, extensions, Box::new(TagReader), None)
    }

    /// Create a reconciler with injected metadata providers.
    pub fn with_providers(
        pool: SqlitePool,
        extensions: Vec<String>,
        local: Box<dyn MetadataProvider>,
        remote: Option<Box<dyn MetadataProvider>>,
    ) -> Self {
        Self {
            pool,
            extensions,
            local,
            remote,
        }
    }

    /// Existence-only reconciliation of an archive.
    ///
    /// Metadata of existing records is not touched.
    pub async fn quick_scan(&self, archive: &Archive) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();

        // Deletion pass. Must complete before the walk begins.
        for song in db::get_songs_for_archive(&self.pool, archive.id).await? {
            if !Path::new(&song.path).exists() {
                debug!("Removing stale record for {}", song.path);
                db::delete_song(&self.pool, song.id).await?;
                summary.removed += 1;
            }
        }

        // Discovery pass: create bare records for unknown files.
        let root = Path::new(&archive.root_folder);
        for path in scanner::collect_audio_files(root, &self.extensions) {
            let path_str = path.to_string_lossy();
            if db::get_song_by_path(&self.pool, archive.id, &path_str)
                .await?
                .is_none()
            {
                let song = crate::model::Song::new(archive.id, path_str.as_ref());
                db::insert_song(&self.pool, &song).await?;
                summary.added += 1;
            }
        }

        info!(
            "Quick scan of '{}': {} added, {} removed",
            archive.name, summary.added, summary.removed
        );
        Ok(summary)
    }

    /// Full scan: quick_scan followed by a local metadata refresh.
    pub async fn scan(
        &self,
        archive: &Archive,
        progress: Option<Progress<'_>>,
    ) -> Result<(ScanSummary, RefreshSummary)> {
        let scanned = self.quick_scan(archive).await?;
        let refreshed = self
            .refresh_metadata(archive, self.local.as_ref(), progress)
            .await?;
        Ok((scanned, refreshed))
    }

    /// Deep scan: quick_scan followed by a refresh through the remote
    /// provider. Falls back to the local provider when none is set.
    pub async fn deep_scan(
        &self,
        archive: &Archive,
        progress: Option<Progress<'_>>,
    ) -> Result<(ScanSummary, RefreshSummary)> {
        let scanned = self.quick_scan(archive).await?;
        let provider = match &self.remote {
            Some(remote) => remote.as_ref(),
            None => {
                warn!("No remote metadata provider configured, deep scan uses the local one");
                self.local.as_ref()
            }
        };
        let refreshed = self.refresh_metadata(archive, provider, progress).await?;
        Ok((scanned, refreshed))
    }

    /// Refresh the metadata of every song in the archive.
    ///
    /// Per song: hash the file; if the hash matches the stored one, skip
    /// (no tag re-parse). Otherwise extract metadata; on success store
    /// the new fields and hash, on failure keep the prior values and the
    /// stale hash so the song is retried next scan. Extraction failures
    /// never abort the batch.
    pub async fn refresh_metadata(
        &self,
        archive: &Archive,
        provider: &dyn MetadataProvider,
        mut progress: Option<Progress<'_>>,
    ) -> Result<RefreshSummary> {
        let songs = db::get_songs_for_archive(&self.pool, archive.id).await?;
        let total = songs.len();
        let mut summary = RefreshSummary::default();

        for (index, mut song) in songs.into_iter().enumerate() {
            let path = Path::new(&song.path).to_path_buf();

            match hash::hash_file(&path) {
                Ok(current_hash) => {
                    if song.content_hash.as_deref() == Some(current_hash.as_str()) {
                        // Unchanged since the last refresh: skip the
                        // expensive tag parse entirely.
                        summary.skipped += 1;
                    } else {
                        match provider.extract(&path) {
                            Ok(meta) => {
                                meta.apply_to(&mut song);
                                if let Ok(fs_meta) = std::fs::metadata(&path) {
                                    song.file_size = fs_meta.len() as i64;
                                }
                                song.content_hash = Some(current_hash);
                                db::update_song(&self.pool, &song).await?;
                                summary.refreshed += 1;
                            }
                            Err(e) => {
                                warn!("Metadata refresh failed for {}: {e}", song.path);
                                // Prior values (or sentinels) stand; the
                                // record is still saved, and the stale
                                // hash retries it on the next scan.
                                db::update_song(&self.pool, &song).await?;
                                summary.failed += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Could not hash {}: {e}", song.path);
                    summary.failed += 1;
                }
            }

            if let Some(ref mut callback) = progress {
                callback(index + 1, total);
            }
        }

        info!(
            "Metadata refresh of '{}': {} refreshed, {} unchanged, {} failed",
            archive.name, summary.refreshed, summary.skipped, summary.failed
        );
        Ok(summary)
    }
}
