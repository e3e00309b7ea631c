//! Core data models for the music archive.
//!
//! Defines the primary entities: [`Archive`] and [`Song`], plus the
//! [`Rating`] scale. These are derived from SQLx for database mapping.
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `archives` - Managed root folders with backup settings
//! - `songs` - Individual audio files with metadata

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Sentinel for text metadata that could not be read.
pub const UNAVAILABLE: &str = "_UNAVAILABLE_";

/// Sentinel for numeric metadata that could not be read.
pub const UNSET: i64 = -1;

/// A managed root folder and its backup settings.
#[derive(Debug, Clone, FromRow)]
pub struct Archive {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Human-readable name, e.g. "Steve's Music"
    pub name: String,
    /// Absolute root folder owned by this archive. Immutable after creation.
    pub root_folder: String,
    /// rsync-style transfer target. None or empty disables backups.
    pub backup_location: Option<String>,
    /// Seconds between backups.
    pub backup_frequency: i64,
    /// RFC 3339 timestamp of the last successful backup.
    pub last_backup: String,
}

impl Archive {
    /// Parse the stored last-backup timestamp.
    pub fn last_backup_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.last_backup)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Whether backups are enabled (a non-empty transfer target is set).
    pub fn backups_enabled(&self) -> bool {
        self.backup_location
            .as_deref()
            .is_some_and(|loc| !loc.is_empty())
    }
}

/// Song rating on a 0-5 scale. 0 means "never rated".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Default = 0,
    Bad = 1,
    Ok = 2,
    Decent = 3,
    Good = 4,
    Excellent = 5,
}

impl Rating {
    /// Convert a stored integer back to a rating.
    ///
    /// Returns None for out-of-range values.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Rating::Default),
            1 => Some(Rating::Bad),
            2 => Some(Rating::Ok),
            3 => Some(Rating::Decent),
            4 => Some(Rating::Good),
            5 => Some(Rating::Excellent),
            _ => None,
        }
    }
}

/// A song (audio file) in an archive.
///
/// Created by reconciliation with sentinel metadata; populated lazily by
/// a metadata refresh. `path` tracks the file on disk and is kept in sync
/// by the organizer.
#[derive(Debug, Clone, FromRow)]
pub struct Song {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Owning archive (exclusive ownership)
    pub archive_id: i64,
    /// Absolute file path, unique within the archive
    pub path: String,
    pub title: String,
    pub artist: String,
    pub album_artist: String,
    pub album: String,
    pub genre: String,
    pub comment: String,
    pub year: i64,
    pub bpm: i64,
    pub disc_number: i64,
    pub disc_total: i64,
    pub track_number: i64,
    pub track_total: i64,
    /// Bit rate in kbps
    pub bit_rate: i64,
    /// Duration in seconds
    pub duration: f64,
    /// Fingerprint of the file bytes as of the last successful metadata
    /// refresh. None until the first refresh succeeds.
    pub content_hash: Option<String>,
    /// File size in bytes
    pub file_size: i64,
    /// RFC 3339 date this song was first added
    pub add_date: String,
    pub play_count: i64,
    pub skip_count: i64,
    /// Stored [`Rating`] value
    pub rating: i64,
}

impl Song {
    /// Default factory for a newly discovered file.
    ///
    /// All metadata starts at the sentinel values; a later refresh fills
    /// them in. `id` is 0 until the record is inserted.
    pub fn new(archive_id: i64, path: impl Into<String>) -> Self {
        Self {
            id: 0,
            archive_id,
            path: path.into(),
            title: UNAVAILABLE.to_string(),
            artist: UNAVAILABLE.to_string(),
            album_artist: UNAVAILABLE.to_string(),
            album: UNAVAILABLE.to_string(),
            genre: UNAVAILABLE.to_string(),
            comment: UNAVAILABLE.to_string(),
            year: UNSET,
            bpm: UNSET,
            disc_number: UNSET,
            disc_total: UNSET,
            track_number: UNSET,
            track_total: UNSET,
            bit_rate: UNSET,
            duration: UNSET as f64,
            content_hash: None,
            file_size: UNSET,
            add_date: Utc::now().to_rfc3339(),
            play_count: 0,
            skip_count: 0,
            rating: Rating::Default as i64,
        }
    }

    /// The rating as an enum, if the stored value is in range.
    pub fn rating(&self) -> Option<Rating> {
        Rating::from_i64(self.rating)
    }
}
