//! Database module for archive, song, and playlist persistence.
//!
//! Uses SQLx with SQLite for lightweight, embedded database storage.
//! Provides async operations for:
//! - Archive CRUD
//! - The song repository (create, update, delete, lookup-by-path)
//! - Playlist storage with its derived membership index
//!
//! # Example
//!
//! ```ignore
//! use music_archivist::db::{init_db, get_songs_for_archive};
//!
//! let pool = init_db("sqlite:music_archivist.db").await?;
//! let songs = get_songs_for_archive(&pool, archive.id).await?;
//! ```

use chrono::Utc;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::{Error, Result};
use crate::model::{Archive, Rating, Song};
use crate::playlist::Playlist;

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "music_archivist.db";

/// Song column list shared by every song SELECT.
const SONG_COLUMNS: &str = "id, archive_id, path, title, artist, album_artist, album, genre, \
     comment, year, bpm, disc_number, disc_total, track_number, track_total, \
     bit_rate, duration, content_hash, file_size, add_date, play_count, skip_count, rating";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
///
/// # Errors
///
/// Returns an error if:
/// - Database creation fails
/// - Connection cannot be established
/// - Migration fails
pub async fn init_db(db_url: &str) -> std::result::Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

// ============================================================================
// Archives
// ============================================================================

/// Create a new archive.
///
/// `last_backup` starts at creation time, so the first backup becomes due
/// one `backup_frequency` later (or immediately with `force`).
pub async fn create_archive(
    pool: &SqlitePool,
    name: &str,
    root_folder: &str,
    backup_location: Option<&str>,
    backup_frequency: i64,
) -> sqlx::Result<Archive> {
    sqlx::query_as::<_, Archive>(
        r#"
        INSERT INTO archives (name, root_folder, backup_location, backup_frequency, last_backup)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, name, root_folder, backup_location, backup_frequency, last_backup
        "#,
    )
    .bind(name)
    .bind(root_folder)
    .bind(backup_location)
    .bind(backup_frequency)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(pool)
    .await
}

/// Look up an archive by name.
pub async fn get_archive_by_name(pool: &SqlitePool, name: &str) -> sqlx::Result<Option<Archive>> {
    sqlx::query_as::<_, Archive>(
        "SELECT id, name, root_folder, backup_location, backup_frequency, last_backup \
         FROM archives WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
}

/// Get all archives.
pub async fn list_archives(pool: &SqlitePool) -> sqlx::Result<Vec<Archive>> {
    sqlx::query_as::<_, Archive>(
        "SELECT id, name, root_folder, backup_location, backup_frequency, last_backup \
         FROM archives ORDER BY name",
    )
    .fetch_all(pool)
    .await
}

/// Record the time of a successful backup.
pub async fn update_archive_last_backup(
    pool: &SqlitePool,
    archive_id: i64,
    last_backup: &str,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE archives SET last_backup = ? WHERE id = ?")
        .bind(last_backup)
        .bind(archive_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ============================================================================
// Songs
// ============================================================================

/// Insert a new song record.
///
/// Returns the database ID of the inserted song.
pub async fn insert_song(pool: &SqlitePool, song: &Song) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO songs (archive_id, path, title, artist, album_artist, album, genre,
                           comment, year, bpm, disc_number, disc_total, track_number,
                           track_total, bit_rate, duration, content_hash, file_size,
                           add_date, play_count, skip_count, rating)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(song.archive_id)
    .bind(&song.path)
    .bind(&song.title)
    .bind(&song.artist)
    .bind(&song.album_artist)
    .bind(&song.album)
    .bind(&song.genre)
    .bind(&song.comment)
    .bind(song.year)
    .bind(song.bpm)
    .bind(song.disc_number)
    .bind(song.disc_total)
    .bind(song.track_number)
    .bind(song.track_total)
    .bind(song.bit_rate)
    .bind(song.duration)
    .bind(&song.content_hash)
    .bind(song.file_size)
    .bind(&song.add_date)
    .bind(song.play_count)
    .bind(song.skip_count)
    .bind(song.rating)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Update a song's metadata fields, content hash, and file size.
///
/// The path is not touched here; path changes go through
/// [`update_song_path`] so reorganization keeps a single write point.
pub async fn update_song(pool: &SqlitePool, song: &Song) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE songs SET
            title = ?, artist = ?, album_artist = ?, album = ?, genre = ?,
            comment = ?, year = ?, bpm = ?, disc_number = ?, disc_total = ?,
            track_number = ?, track_total = ?, bit_rate = ?, duration = ?,
            content_hash = ?, file_size = ?
        WHERE id = ?
        "#,
    )
    .bind(&song.title)
    .bind(&song.artist)
    .bind(&song.album_artist)
    .bind(&song.album)
    .bind(&song.genre)
    .bind(&song.comment)
    .bind(song.year)
    .bind(song.bpm)
    .bind(song.disc_number)
    .bind(song.disc_total)
    .bind(song.track_number)
    .bind(song.track_total)
    .bind(song.bit_rate)
    .bind(song.duration)
    .bind(&song.content_hash)
    .bind(song.file_size)
    .bind(song.id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Update the file path for a single song.
///
/// Used after reorganization to keep the database in sync with the
/// filesystem.
pub async fn update_song_path(pool: &SqlitePool, song_id: i64, new_path: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE songs SET path = ? WHERE id = ?")
        .bind(new_path)
        .bind(song_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a song record.
pub async fn delete_song(pool: &SqlitePool, song_id: i64) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM songs WHERE id = ?")
        .bind(song_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Get a song by its database ID.
pub async fn get_song_by_id(pool: &SqlitePool, song_id: i64) -> sqlx::Result<Option<Song>> {
    sqlx::query_as::<_, Song>(&format!("SELECT {SONG_COLUMNS} FROM songs WHERE id = ?"))
        .bind(song_id)
        .fetch_optional(pool)
        .await
}

/// Look up a song by path within an archive.
pub async fn get_song_by_path(
    pool: &SqlitePool,
    archive_id: i64,
    path: &str,
) -> sqlx::Result<Option<Song>> {
    sqlx::query_as::<_, Song>(&format!(
        "SELECT {SONG_COLUMNS} FROM songs WHERE archive_id = ? AND path = ?"
    ))
    .bind(archive_id)
    .bind(path)
    .fetch_optional(pool)
    .await
}

/// Get all songs belonging to an archive.
pub async fn get_songs_for_archive(pool: &SqlitePool, archive_id: i64) -> sqlx::Result<Vec<Song>> {
    sqlx::query_as::<_, Song>(&format!(
        "SELECT {SONG_COLUMNS} FROM songs WHERE archive_id = ?"
    ))
    .bind(archive_id)
    .fetch_all(pool)
    .await
}

/// Get every song across all archives.
///
/// This is the global song index playlist import resolves paths against.
pub async fn get_all_songs(pool: &SqlitePool) -> sqlx::Result<Vec<Song>> {
    sqlx::query_as::<_, Song>(&format!("SELECT {SONG_COLUMNS} FROM songs"))
        .fetch_all(pool)
        .await
}

/// Set a song's rating.
///
/// # Errors
///
/// `Validation` if the value is outside the 0-5 rating scale, `NotFound`
/// if no song has that id.
pub async fn set_rating(pool: &SqlitePool, song_id: i64, rating: i64) -> Result<()> {
    if Rating::from_i64(rating).is_none() {
        return Err(Error::validation(format!(
            "rating must be between 0 and 5, got {rating}"
        )));
    }

    let result = sqlx::query("UPDATE songs SET rating = ? WHERE id = ?")
        .bind(rating)
        .bind(song_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found(format!("song {song_id}")));
    }
    Ok(())
}

/// Record a completed playthrough.
pub async fn increment_play_count(pool: &SqlitePool, song_id: i64) -> Result<()> {
    let result = sqlx::query("UPDATE songs SET play_count = play_count + 1 WHERE id = ?")
        .bind(song_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found(format!("song {song_id}")));
    }
    Ok(())
}

/// Record a skip.
pub async fn increment_skip_count(pool: &SqlitePool, song_id: i64) -> Result<()> {
    let result = sqlx::query("UPDATE songs SET skip_count = skip_count + 1 WHERE id = ?")
        .bind(song_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found(format!("song {song_id}")));
    }
    Ok(())
}

// ============================================================================
// Playlists
// ============================================================================

/// Create a new, empty playlist.
pub async fn create_playlist(pool: &SqlitePool, name: &str) -> sqlx::Result<Playlist> {
    let row: (i64,) = sqlx::query_as("INSERT INTO playlists (name) VALUES (?) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(Playlist::from_parts(row.0, name.to_string(), Vec::new()))
}

/// Look up a playlist by name.
pub async fn get_playlist_by_name(
    pool: &SqlitePool,
    name: &str,
) -> sqlx::Result<Option<Playlist>> {
    let row: Option<(i64, String, String)> =
        sqlx::query_as("SELECT id, name, entries FROM playlists WHERE name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(id, name, entries)| Playlist::from_parts(id, name, decode_entries(&entries))))
}

/// Get all playlists.
pub async fn list_playlists(pool: &SqlitePool) -> sqlx::Result<Vec<Playlist>> {
    let rows: Vec<(i64, String, String)> =
        sqlx::query_as("SELECT id, name, entries FROM playlists ORDER BY name")
            .fetch_all(pool)
            .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name, entries)| Playlist::from_parts(id, name, decode_entries(&entries)))
        .collect())
}

/// Persist a playlist's ordered entries and rebuild its membership index.
///
/// Both writes happen in one transaction so the `playlist_members` table
/// is never observed out of sync with the ordered sequence.
pub async fn save_playlist(pool: &SqlitePool, playlist: &Playlist) -> sqlx::Result<()> {
    let entries =
        serde_json::to_string(playlist.entries()).expect("Vec<i64> always serializes to JSON");

    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE playlists SET entries = ? WHERE id = ?")
        .bind(&entries)
        .bind(playlist.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM playlist_members WHERE playlist_id = ?")
        .bind(playlist.id)
        .execute(&mut *tx)
        .await?;

    for song_id in playlist.members() {
        sqlx::query("INSERT INTO playlist_members (playlist_id, song_id) VALUES (?, ?)")
            .bind(playlist.id)
            .bind(song_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Read back the stored membership index for a playlist.
pub async fn get_playlist_members(pool: &SqlitePool, playlist_id: i64) -> sqlx::Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT song_id FROM playlist_members WHERE playlist_id = ? ORDER BY song_id",
    )
    .bind(playlist_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

fn decode_entries(raw: &str) -> Vec<i64> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("Corrupt playlist entries column ({e}), treating as empty");
        Vec::new()
    })
}
