//! File reorganization: relocating an archive's songs into a new
//! directory layout while keeping the database consistent.
//!
//! New paths come from a template of two-character escape tokens
//! substituted from song fields. Each file is moved crash-safely:
//! copy to the new location, point the record at it, and only then
//! delete the original. An interruption at any step leaves the record
//! pointing at a file that exists.
//!
//! # Template tokens
//!
//! | Token | Replaced with                     |
//! |-------|-----------------------------------|
//! | `%a`  | artist                            |
//! | `%A`  | album                             |
//! | `%d`  | disc number                       |
//! | `%e`  | disc total                        |
//! | `%f`  | current filename (with extension) |
//! | `%g`  | current filename (no extension)   |
//! | `%n`  | track number                      |
//! | `%o`  | track total                       |
//! | `%y`  | year                              |
//!
//! Any other `%` sequence is left unchanged.

use std::fs;
use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db;
use crate::error::{Error, Result};
use crate::model::{Archive, Song};

/// Progress callback: (1-based index, total, old path, new path).
/// Fired for every song before any filesystem mutation, dry run or not.
pub type Progress<'a> = &'a mut dyn FnMut(usize, usize, &Path, &Path);

/// Render a naming template for one song.
///
/// Substitution is a single left-to-right pass: tokens are replaced
/// literally, never re-scanned, so a `%` inside a substituted value is
/// not expanded.
pub fn render_template(template: &str, song: &Song) -> String {
    let filename = Path::new(&song.path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    let stem = Path::new(&song.path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('a') => out.push_str(&song.artist),
            Some('A') => out.push_str(&song.album),
            Some('d') => out.push_str(&song.disc_number.to_string()),
            Some('e') => out.push_str(&song.disc_total.to_string()),
            Some('f') => out.push_str(filename),
            Some('g') => out.push_str(stem),
            Some('n') => out.push_str(&song.track_number.to_string()),
            Some('o') => out.push_str(&song.track_total.to_string()),
            Some('y') => out.push_str(&song.year.to_string()),
            _ => {
                // Unknown escape: both characters pass through verbatim
                out.push('%');
                if let Some(&next) = chars.peek() {
                    out.push(next);
                    chars.next();
                }
                continue;
            }
        }
        chars.next(); // consume the token character
    }

    out
}

/// Reorganize every song in the archive according to `template`.
///
/// Per song: compute the new path, report progress, and (unless
/// `dry_run`) create the destination directory, copy the file, update
/// the record's path, then delete the original. Any filesystem error
/// other than an already-existing directory aborts immediately;
/// already-moved songs stay consistent in their new location.
///
/// Returns the number of songs processed.
pub async fn reorganize(
    pool: &SqlitePool,
    archive: &Archive,
    template: &str,
    dry_run: bool,
    mut progress: Option<Progress<'_>>,
) -> Result<usize> {
    let songs = db::get_songs_for_archive(pool, archive.id).await?;
    let total = songs.len();
    let root = Path::new(&archive.root_folder);

    for (index, song) in songs.iter().enumerate() {
        let old_path = PathBuf::from(&song.path);
        let new_path = root.join(render_template(template, song));

        // Progress fires before any mutation so dry runs produce the
        // same report a real run would.
        if let Some(ref mut callback) = progress {
            callback(index + 1, total, &old_path, &new_path);
        }

        if dry_run {
            continue;
        }
        if new_path == old_path {
            debug!("{} already in place", song.path);
            continue;
        }

        // create_dir_all treats existing directories as success
        if let Some(parent) = new_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
        }

        // Copy (not rename): an interruption here leaves the original
        // intact and the record still valid.
        fs::copy(&old_path, &new_path).map_err(|e| Error::filesystem(&new_path, e))?;
        copy_modified_time(&old_path, &new_path)?;

        // The record moves before the original is removed, so there is
        // never a moment where it points at a missing file.
        db::update_song_path(pool, song.id, &new_path.to_string_lossy()).await?;

        fs::remove_file(&old_path).map_err(|e| Error::filesystem(&old_path, e))?;
    }

    if !dry_run {
        info!(
            "Reorganized {} songs in '{}' with template '{}'",
            total, archive.name, template
        );
    }
    Ok(total)
}

/// Carry the source's modified time over to the copied file.
///
/// `fs::copy` preserves permission bits but not timestamps; reorganized
/// files should keep them.
fn copy_modified_time(source: &Path, destination: &Path) -> Result<()> {
    let modified = fs::metadata(source)
        .and_then(|m| m.modified())
        .map_err(|e| Error::filesystem(source, e))?;
    fs::File::options()
        .write(true)
        .open(destination)
        .and_then(|f| f.set_modified(modified))
        .map_err(|e| Error::filesystem(destination, e))?;
    Ok(())
}
