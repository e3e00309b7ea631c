//! Audio file metadata extraction.
//!
//! The reconciler treats metadata extraction as an external collaborator
//! behind the [`MetadataProvider`] trait: given a file path it returns a
//! structured [`SongMetadata`] record or a failure. The crate ships a
//! lofty-backed local provider ([`TagReader`]); a higher-fidelity remote
//! provider can be injected for deep scans.

use std::path::{Path, PathBuf};

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};

use crate::model::{Song, UNAVAILABLE, UNSET};

/// A structured metadata record extracted from one audio file.
///
/// Every field is optional; absent tags fall back to the model's
/// sentinel values when applied to a [`Song`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub comment: Option<String>,
    pub year: Option<i64>,
    pub bpm: Option<i64>,
    pub disc_number: Option<i64>,
    pub disc_total: Option<i64>,
    pub track_number: Option<i64>,
    pub track_total: Option<i64>,
    /// Bit rate in kbps
    pub bit_rate: Option<i64>,
    /// Duration in seconds
    pub duration: Option<f64>,
}

impl SongMetadata {
    /// Populate a song's metadata fields from this record.
    ///
    /// Absent values fall back to sentinels; identity fields (path,
    /// counters, rating, add_date, hash) are untouched.
    pub fn apply_to(&self, song: &mut Song) {
        let text = |v: &Option<String>| v.clone().unwrap_or_else(|| UNAVAILABLE.to_string());
        let int = |v: Option<i64>| v.unwrap_or(UNSET);

        song.title = text(&self.title);
        song.artist = text(&self.artist);
        song.album_artist = text(&self.album_artist);
        song.album = text(&self.album);
        song.genre = text(&self.genre);
        song.comment = text(&self.comment);
        song.year = int(self.year);
        song.bpm = int(self.bpm);
        song.disc_number = int(self.disc_number);
        song.disc_total = int(self.disc_total);
        song.track_number = int(self.track_number);
        song.track_total = int(self.track_total);
        song.bit_rate = int(self.bit_rate);
        song.duration = self.duration.unwrap_or(UNSET as f64);
    }
}

/// Metadata extraction failures.
///
/// Non-fatal during batch refreshes: the reconciler logs the failure and
/// moves on to the next song.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The file is not a supported audio format
    #[error("unsupported audio format: {0}")]
    NotSupported(PathBuf),

    /// The file could not be read or its tags could not be parsed
    #[error("failed to read metadata from {path}: {message}")]
    Read { path: PathBuf, message: String },
}

/// External collaborator interface for metadata extraction.
pub trait MetadataProvider: Send + Sync {
    /// Extract a metadata record for the file at `path`.
    fn extract(&self, path: &Path) -> Result<SongMetadata, MetadataError>;
}

/// Local metadata provider backed by lofty tag parsing.
#[derive(Debug, Default)]
pub struct TagReader;

impl MetadataProvider for TagReader {
    fn extract(&self, path: &Path) -> Result<SongMetadata, MetadataError> {
        let tagged_file = Probe::open(path)
            .map_err(|e| read_error(path, e))?
            .read()
            .map_err(|e| read_error(path, e))?;

        // Primary tag, or fall back to the first available tag
        let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());

        let text = |v: Option<std::borrow::Cow<'_, str>>| v.map(|s| s.to_string());

        let mut meta = SongMetadata::default();
        if let Some(tag) = tag {
            meta.title = text(tag.title());
            meta.artist = text(tag.artist());
            meta.album = text(tag.album());
            meta.genre = text(tag.genre());
            meta.comment = text(tag.comment());
            meta.album_artist = tag.get_string(&ItemKey::AlbumArtist).map(|s| s.to_string());
            meta.year = tag.year().map(|y| y as i64);
            meta.bpm = tag
                .get_string(&ItemKey::Bpm)
                .and_then(|s| s.parse::<i64>().ok());
            meta.disc_number = tag.disk().map(|n| n as i64);
            meta.disc_total = tag.disk_total().map(|n| n as i64);
            meta.track_number = tag.track().map(|n| n as i64);
            meta.track_total = tag.track_total().map(|n| n as i64);
        }

        let properties = tagged_file.properties();
        meta.duration = Some(properties.duration().as_secs_f64());
        meta.bit_rate = properties.audio_bitrate().map(|b| b as i64);

        Ok(meta)
    }
}

fn read_error(path: &Path, e: lofty::error::LoftyError) -> MetadataError {
    if matches!(e.kind(), lofty::error::ErrorKind::UnknownFormat) {
        MetadataError::NotSupported(path.to_path_buf())
    } else {
        MetadataError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    }
}
