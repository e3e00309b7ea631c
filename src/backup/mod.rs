//! Scheduled archive backups.
//!
//! Each archive carries a transfer target and a backup frequency. A
//! backup is due when the elapsed time since the last successful run
//! exceeds that frequency; the scheduler only records a new timestamp
//! after the transfer reports success, so a failed run stays due.
//!
//! The actual byte shipping is behind [`BackupTransfer`] so the
//! scheduling logic can be tested without touching a network. The
//! production implementation shells out to rsync.

use std::path::Path;
use std::process::Command;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::db;
use crate::error::Result;
use crate::model::Archive;

/// Failure while shipping archive contents to the backup target.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The transfer tool could not be started
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The transfer tool ran but reported failure
    #[error("{tool} failed: {stderr}")]
    Failed { tool: String, stderr: String },
}

/// Moves an archive's files to a backup target.
pub trait BackupTransfer {
    /// Mirror `source` to `destination`. Must only return Ok when the
    /// target is a complete copy.
    fn sync(&self, source: &Path, destination: &str) -> std::result::Result<(), TransferError>;
}

/// rsync-based transfer. Handles local paths and `host:/path` targets
/// alike, which is why archives store the destination as a string.
pub struct RsyncTransfer;

impl BackupTransfer for RsyncTransfer {
    fn sync(&self, source: &Path, destination: &str) -> std::result::Result<(), TransferError> {
        // Trailing slash: sync the folder's contents, not the folder
        let source_arg = format!("{}/", source.display());

        let output = Command::new("rsync")
            .arg("-a")
            .arg("--delete")
            .arg(&source_arg)
            .arg(destination)
            .output()
            .map_err(|e| TransferError::Spawn {
                tool: "rsync".to_string(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransferError::Failed {
                tool: "rsync".to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

/// What a backup attempt did (or why it did nothing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// The transfer ran and `last_backup` was updated
    Ran,
    /// The backup interval has not elapsed yet
    NotDue,
    /// The archive has no transfer target
    Disabled,
}

/// Whether the archive's backup interval has elapsed as of `now`.
///
/// An unparseable or missing last-backup timestamp counts as "never
/// backed up" and is always due.
pub fn backup_due(archive: &Archive, now: DateTime<Utc>) -> bool {
    match archive.last_backup_time() {
        Some(last) => (now - last).num_seconds() > archive.backup_frequency,
        None => true,
    }
}

/// Run a backup for the archive if one is due.
///
/// - Backups disabled (no transfer target): logs and skips, even with
///   `force`.
/// - Not yet due and `force` is false: skips.
/// - Otherwise runs the transfer. On success the last-backup timestamp
///   is updated to now; on failure it is left alone so the next check
///   still sees the backup as due.
pub async fn run_backup(
    pool: &SqlitePool,
    archive: &Archive,
    force: bool,
    transfer: &dyn BackupTransfer,
) -> Result<BackupOutcome> {
    if !archive.backups_enabled() {
        debug!("Backups disabled for archive '{}', skipping", archive.name);
        return Ok(BackupOutcome::Disabled);
    }

    let now = Utc::now();
    if !force && !backup_due(archive, now) {
        debug!("Backup not yet due for archive '{}'", archive.name);
        return Ok(BackupOutcome::NotDue);
    }

    let destination = archive.backup_location.as_deref().unwrap_or_default();
    info!(
        "Backing up archive '{}' to {}",
        archive.name, destination
    );

    if let Err(e) = transfer.sync(Path::new(&archive.root_folder), destination) {
        warn!("Backup of '{}' failed: {}", archive.name, e);
        return Err(e.into());
    }

    db::update_archive_last_backup(pool, archive.id, &now.to_rfc3339()).await?;
    info!("Backup of '{}' complete", archive.name);
    Ok(BackupOutcome::Ran)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_db;
    use chrono::Duration;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Transfer double that records calls instead of shipping bytes.
    struct RecordingTransfer {
        calls: Mutex<Vec<(PathBuf, String)>>,
        fail: bool,
    }

    impl RecordingTransfer {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl BackupTransfer for RecordingTransfer {
        fn sync(
            &self,
            source: &Path,
            destination: &str,
        ) -> std::result::Result<(), TransferError> {
            self.calls
                .lock()
                .unwrap()
                .push((source.to_path_buf(), destination.to_string()));
            if self.fail {
                Err(TransferError::Failed {
                    tool: "test".to_string(),
                    stderr: "forced failure".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn archive_with(frequency: i64, last: DateTime<Utc>) -> Archive {
        Archive {
            id: 1,
            name: "test".to_string(),
            root_folder: "/music".to_string(),
            backup_location: Some("backup-host:/srv/music".to_string()),
            backup_frequency: frequency,
            last_backup: last.to_rfc3339(),
        }
    }

    #[test]
    fn test_backup_due_after_frequency_elapsed() {
        let now = Utc::now();
        // Hourly schedule, last run two hours ago
        let archive = archive_with(3600, now - Duration::seconds(7200));
        assert!(backup_due(&archive, now));
    }

    #[test]
    fn test_backup_not_due_within_frequency() {
        let now = Utc::now();
        let archive = archive_with(3600, now - Duration::seconds(60));
        assert!(!backup_due(&archive, now));
    }

    #[test]
    fn test_backup_due_when_timestamp_unparseable() {
        let mut archive = archive_with(3600, Utc::now());
        archive.last_backup = "not a timestamp".to_string();
        assert!(backup_due(&archive, Utc::now()));
    }

    #[tokio::test]
    async fn test_run_backup_when_due() {
        let (pool, _dir) = temp_db().await;
        let mut archive = db::create_archive(
            &pool,
            "test",
            "/music",
            Some("backup-host:/srv/music"),
            3600,
        )
        .await
        .unwrap();
        archive.last_backup = (Utc::now() - Duration::seconds(7200)).to_rfc3339();

        let transfer = RecordingTransfer::new();
        let outcome = run_backup(&pool, &archive, false, &transfer).await.unwrap();

        assert_eq!(outcome, BackupOutcome::Ran);
        assert_eq!(transfer.call_count(), 1);
        let calls = transfer.calls.lock().unwrap();
        assert_eq!(calls[0].0, PathBuf::from("/music"));
        assert_eq!(calls[0].1, "backup-host:/srv/music");
    }

    #[tokio::test]
    async fn test_run_backup_skips_when_not_due() {
        let (pool, _dir) = temp_db().await;
        let mut archive = db::create_archive(
            &pool,
            "test",
            "/music",
            Some("backup-host:/srv/music"),
            3600,
        )
        .await
        .unwrap();
        archive.last_backup = Utc::now().to_rfc3339();

        let transfer = RecordingTransfer::new();
        let outcome = run_backup(&pool, &archive, false, &transfer).await.unwrap();

        assert_eq!(outcome, BackupOutcome::NotDue);
        assert_eq!(transfer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_run_backup_force_ignores_schedule() {
        let (pool, _dir) = temp_db().await;
        let mut archive = db::create_archive(
            &pool,
            "test",
            "/music",
            Some("backup-host:/srv/music"),
            3600,
        )
        .await
        .unwrap();
        archive.last_backup = Utc::now().to_rfc3339();

        let transfer = RecordingTransfer::new();
        let outcome = run_backup(&pool, &archive, true, &transfer).await.unwrap();

        assert_eq!(outcome, BackupOutcome::Ran);
        assert_eq!(transfer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_run_backup_reports_disabled_archive_distinctly() {
        let (pool, _dir) = temp_db().await;
        let archive = db::create_archive(&pool, "test", "/music", None, 3600)
            .await
            .unwrap();

        let transfer = RecordingTransfer::new();
        // force cannot override a missing target, and the outcome names
        // the real reason rather than "not due"
        let outcome = run_backup(&pool, &archive, true, &transfer).await.unwrap();

        assert_eq!(outcome, BackupOutcome::Disabled);
        assert_ne!(outcome, BackupOutcome::NotDue);
        assert_eq!(transfer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_run_backup_updates_last_backup_on_success() {
        let (pool, _dir) = temp_db().await;
        let mut archive = db::create_archive(
            &pool,
            "test",
            "/music",
            Some("backup-host:/srv/music"),
            3600,
        )
        .await
        .unwrap();
        archive.last_backup = (Utc::now() - Duration::seconds(7200)).to_rfc3339();

        let before = Utc::now();
        run_backup(&pool, &archive, false, &RecordingTransfer::new())
            .await
            .unwrap();

        let stored = db::get_archive_by_name(&pool, "test")
            .await
            .unwrap()
            .unwrap();
        let stamp = stored.last_backup_time().unwrap();
        assert!(stamp >= before);
        // A fresh stamp means the next check is no longer due
        assert!(!backup_due(&stored, Utc::now()));
    }

    #[tokio::test]
    async fn test_run_backup_failure_leaves_timestamp_alone() {
        let (pool, _dir) = temp_db().await;
        let mut archive = db::create_archive(
            &pool,
            "test",
            "/music",
            Some("backup-host:/srv/music"),
            3600,
        )
        .await
        .unwrap();
        let old_stamp = (Utc::now() - Duration::seconds(7200)).to_rfc3339();
        sqlx::query("UPDATE archives SET last_backup = ? WHERE id = ?")
            .bind(&old_stamp)
            .bind(archive.id)
            .execute(&pool)
            .await
            .unwrap();
        archive.last_backup = old_stamp.clone();

        let result = run_backup(&pool, &archive, false, &RecordingTransfer::failing()).await;
        assert!(result.is_err());

        // Still due on the next pass
        let stored = db::get_archive_by_name(&pool, "test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_backup, old_stamp);
        assert!(backup_due(&stored, Utc::now()));
    }
}
