//! CLI command definitions and handlers.
//!
//! Each subcommand is implemented as a function that takes the parsed
//! arguments and returns an `anyhow::Result<()>`.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::runtime::Runtime;

use crate::backup::{self, BackupOutcome, RsyncTransfer};
use crate::config;
use crate::db;
use crate::model::Archive;
use crate::organizer;
use crate::playlist::{PlaylistFormat, SongIndex};
use crate::reconciler::Reconciler;

/// Music Archivist CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Manage archives (managed root folders)
    Archive {
        #[command(subcommand)]
        command: ArchiveCommands,
    },
    /// Reconcile an archive with the files on disk
    Scan {
        /// Archive name
        name: String,
        /// Existence-only pass: skip the metadata refresh
        #[arg(long)]
        quick: bool,
        /// Refresh through the remote metadata provider
        #[arg(long, conflicts_with = "quick")]
        deep: bool,
    },
    /// Back up archives whose backup interval has elapsed
    Backup {
        /// Archive name (all archives when omitted)
        name: Option<String>,
        /// Run even if the backup is not yet due
        #[arg(long)]
        force: bool,
    },
    /// Relocate an archive's files according to a naming template
    Reorganize {
        /// Archive name
        name: String,
        /// Naming template, e.g. "%a/%A/%n - %f"
        #[arg(short, long, default_value = "%a/%A/%f")]
        template: String,
        /// Show what would be done without moving files
        #[arg(long)]
        dry_run: bool,
    },
    /// List the songs in an archive
    Songs {
        /// Archive name
        name: String,
    },
    /// Rate a song (0-5)
    Rate {
        /// Song database ID
        song_id: i64,
        /// Rating value, 0 (unrated) through 5
        rating: i64,
    },
    /// Record a completed playthrough of a song
    Played {
        /// Song database ID
        song_id: i64,
    },
    /// Record a skip of a song
    Skipped {
        /// Song database ID
        song_id: i64,
    },
    /// Manage playlists
    Playlist {
        #[command(subcommand)]
        command: PlaylistCommands,
    },
    /// Show or initialize the configuration file
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

/// Archive management subcommands
#[derive(Subcommand)]
pub enum ArchiveCommands {
    /// Register a new archive
    Add {
        /// Human-readable archive name
        name: String,
        /// Root folder the archive owns
        root: PathBuf,
        /// rsync-style backup target, e.g. "host:/srv/music"
        #[arg(long)]
        backup_location: Option<String>,
        /// Seconds between backups
        #[arg(long, default_value = "604800")]
        backup_frequency: i64,
    },
    /// List registered archives
    List,
}

/// Playlist management subcommands
#[derive(Subcommand)]
pub enum PlaylistCommands {
    /// Create a new, empty playlist
    New {
        name: String,
    },
    /// List playlists
    List,
    /// Show a playlist's entries in order
    Show {
        name: String,
    },
    /// Append a song to a playlist
    Add {
        name: String,
        song_id: i64,
    },
    /// Insert a song at a position
    Insert {
        name: String,
        position: usize,
        song_id: i64,
    },
    /// Move an entry to a new position
    Move {
        name: String,
        from: usize,
        to: usize,
    },
    /// Remove the entry at a position
    Remove {
        name: String,
        position: usize,
    },
    /// Export a playlist to a file
    Export {
        name: String,
        /// Output file path
        output: PathBuf,
        /// Playlist format: m3u, pls
        #[arg(long, default_value = "m3u")]
        format: String,
    },
    /// Import playlist contents from a file, replacing current entries
    Import {
        name: String,
        /// Input file path
        input: PathBuf,
    },
}

/// Run the parsed CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;

    match &cli.command {
        Commands::Archive { command } => match command {
            ArchiveCommands::Add {
                name,
                root,
                backup_location,
                backup_frequency,
            } => cmd_archive_add(&rt, name, root, backup_location.as_deref(), *backup_frequency),
            ArchiveCommands::List => cmd_archive_list(&rt),
        },
        Commands::Scan { name, quick, deep } => cmd_scan(&rt, name, *quick, *deep),
        Commands::Backup { name, force } => cmd_backup(&rt, name.as_deref(), *force),
        Commands::Reorganize {
            name,
            template,
            dry_run,
        } => cmd_reorganize(&rt, name, template, *dry_run),
        Commands::Songs { name } => cmd_songs(&rt, name),
        Commands::Rate { song_id, rating } => cmd_rate(&rt, *song_id, *rating),
        Commands::Played { song_id } => cmd_played(&rt, *song_id),
        Commands::Skipped { song_id } => cmd_skipped(&rt, *song_id),
        Commands::Playlist { command } => match command {
            PlaylistCommands::New { name } => cmd_playlist_new(&rt, name),
            PlaylistCommands::List => cmd_playlist_list(&rt),
            PlaylistCommands::Show { name } => cmd_playlist_show(&rt, name),
            PlaylistCommands::Add { name, song_id } => {
                cmd_playlist_insert(&rt, name, None, *song_id)
            }
            PlaylistCommands::Insert {
                name,
                position,
                song_id,
            } => cmd_playlist_insert(&rt, name, Some(*position), *song_id),
            PlaylistCommands::Move { name, from, to } => cmd_playlist_move(&rt, name, *from, *to),
            PlaylistCommands::Remove { name, position } => {
                cmd_playlist_remove(&rt, name, *position)
            }
            PlaylistCommands::Export {
                name,
                output,
                format,
            } => cmd_playlist_export(&rt, name, output, format),
            PlaylistCommands::Import { name, input } => cmd_playlist_import(&rt, name, input),
        },
        Commands::Config { init } => cmd_config(*init),
    }
}

fn cmd_config(init: bool) -> anyhow::Result<()> {
    let path = config::config_path().context("Could not determine config directory")?;

    if init && !path.exists() {
        config::save(&config::Config::default())?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    println!("Config file: {}", path.display());
    let config = config::load();
    println!("Extensions: {}", config.library.extensions.join(", "));
    match config.library.database {
        Some(db) => println!("Database: {}", db.display()),
        None => println!("Database: {} (default)", db::DEFAULT_DB_NAME),
    }
    Ok(())
}

async fn open_pool() -> anyhow::Result<SqlitePool> {
    let config = config::load();
    let url = db::db_url(config.library.database.as_deref());
    db::init_db(&url)
        .await
        .with_context(|| format!("Failed to open database at {url}"))
}

async fn require_archive(pool: &SqlitePool, name: &str) -> anyhow::Result<Archive> {
    db::get_archive_by_name(pool, name)
        .await?
        .with_context(|| format!("No archive named '{name}'"))
}

// ============================================================================
// Archives and scanning
// ============================================================================

fn cmd_archive_add(
    rt: &Runtime,
    name: &str,
    root: &PathBuf,
    backup_location: Option<&str>,
    backup_frequency: i64,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        let root = root
            .canonicalize()
            .with_context(|| format!("Root folder {root:?} is not accessible"))?;

        let archive = db::create_archive(
            &pool,
            name,
            &root.to_string_lossy(),
            backup_location,
            backup_frequency,
        )
        .await
        .with_context(|| format!("Failed to create archive '{name}'"))?;

        println!("Created archive '{}' at {}", archive.name, archive.root_folder);
        Ok(())
    })
}

fn cmd_archive_list(rt: &Runtime) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        let archives = db::list_archives(&pool).await?;
        if archives.is_empty() {
            println!("No archives registered.");
            return Ok(());
        }
        for archive in archives {
            let backup = if archive.backups_enabled() {
                format!(
                    "backup to {} every {}s",
                    archive.backup_location.as_deref().unwrap_or_default(),
                    archive.backup_frequency
                )
            } else {
                "backups disabled".to_string()
            };
            println!("{} [{}] ({backup})", archive.name, archive.root_folder);
        }
        Ok(())
    })
}

fn cmd_scan(rt: &Runtime, name: &str, quick: bool, deep: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let config = config::load();
        let pool = open_pool().await?;
        let archive = require_archive(&pool, name).await?;
        let reconciler = Reconciler::new(pool.clone(), config.library.extensions);

        if quick {
            let summary = reconciler.quick_scan(&archive).await?;
            println!(
                "Quick scan complete: {} added, {} removed",
                summary.added, summary.removed
            );
            return Ok(());
        }

        let mut progress = |done: usize, total: usize| {
            print!("\rRefreshing metadata {done}/{total}...");
            let _ = std::io::stdout().flush();
        };

        let (scanned, refreshed) = if deep {
            reconciler.deep_scan(&archive, Some(&mut progress)).await?
        } else {
            reconciler.scan(&archive, Some(&mut progress)).await?
        };

        println!(
            "\nScan complete: {} added, {} removed, {} refreshed, {} unchanged, {} failed",
            scanned.added, scanned.removed, refreshed.refreshed, refreshed.skipped, refreshed.failed
        );
        Ok(())
    })
}

// ============================================================================
// Backups and reorganization
// ============================================================================

fn cmd_backup(rt: &Runtime, name: Option<&str>, force: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        let archives = match name {
            Some(name) => vec![require_archive(&pool, name).await?],
            None => db::list_archives(&pool).await?,
        };

        let transfer = RsyncTransfer;
        for archive in &archives {
            match backup::run_backup(&pool, archive, force, &transfer).await? {
                BackupOutcome::Ran => println!("Backed up '{}'", archive.name),
                BackupOutcome::NotDue => println!("Skipped '{}' (not due)", archive.name),
                BackupOutcome::Disabled => {
                    println!("Skipped '{}' (backups disabled)", archive.name)
                }
            }
        }
        Ok(())
    })
}

fn cmd_reorganize(rt: &Runtime, name: &str, template: &str, dry_run: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        let archive = require_archive(&pool, name).await?;

        if dry_run {
            println!("[DRY RUN MODE - No files will be moved]\n");
        }

        let mut progress = |done: usize, total: usize, old: &std::path::Path, new: &std::path::Path| {
            let verb = if dry_run { "WOULD MOVE" } else { "MOVE" };
            println!("[{done}/{total}] {verb}: {} -> {}", old.display(), new.display());
        };

        let count = organizer::reorganize(&pool, &archive, template, dry_run, Some(&mut progress))
            .await
            .context("Reorganization aborted")?;

        println!("\nProcessed {count} songs.");
        Ok(())
    })
}

// ============================================================================
// Songs
// ============================================================================

fn cmd_songs(rt: &Runtime, name: &str) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        let archive = require_archive(&pool, name).await?;
        let songs = db::get_songs_for_archive(&pool, archive.id).await?;

        for song in &songs {
            println!(
                "{:>6}  {} - {} [{}]",
                song.id, song.artist, song.title, song.path
            );
        }
        println!("{} songs.", songs.len());
        Ok(())
    })
}

fn cmd_rate(rt: &Runtime, song_id: i64, rating: i64) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        db::set_rating(&pool, song_id, rating).await?;
        println!("Rated song {song_id}: {rating}/5");
        Ok(())
    })
}

fn cmd_played(rt: &Runtime, song_id: i64) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        db::increment_play_count(&pool, song_id).await?;
        Ok(())
    })
}

fn cmd_skipped(rt: &Runtime, song_id: i64) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        db::increment_skip_count(&pool, song_id).await?;
        Ok(())
    })
}

// ============================================================================
// Playlists
// ============================================================================

async fn require_playlist(
    pool: &SqlitePool,
    name: &str,
) -> anyhow::Result<crate::playlist::Playlist> {
    db::get_playlist_by_name(pool, name)
        .await?
        .with_context(|| format!("No playlist named '{name}'"))
}

fn cmd_playlist_new(rt: &Runtime, name: &str) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        let playlist = db::create_playlist(&pool, name)
            .await
            .with_context(|| format!("Failed to create playlist '{name}'"))?;
        println!("Created playlist '{}'", playlist.name);
        Ok(())
    })
}

fn cmd_playlist_list(rt: &Runtime) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        for playlist in db::list_playlists(&pool).await? {
            println!("{} ({} entries)", playlist.name, playlist.len());
        }
        Ok(())
    })
}

fn cmd_playlist_show(rt: &Runtime, name: &str) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        let playlist = require_playlist(&pool, name).await?;
        let index = SongIndex::new(db::get_all_songs(&pool).await?);

        for (position, &song_id) in playlist.entries().iter().enumerate() {
            match index.song_by_id(song_id) {
                Some(song) => {
                    println!("{position:>4}  {} - {}", song.artist, song.title)
                }
                None => println!("{position:>4}  <missing song {song_id}>"),
            }
        }
        Ok(())
    })
}

fn cmd_playlist_insert(
    rt: &Runtime,
    name: &str,
    position: Option<usize>,
    song_id: i64,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        let mut playlist = require_playlist(&pool, name).await?;
        let song = db::get_song_by_id(&pool, song_id)
            .await?
            .with_context(|| format!("No song with id {song_id}"))?;

        match position {
            Some(position) => playlist.insert(position, &song)?,
            None => playlist.append(&song),
        }
        db::save_playlist(&pool, &playlist).await?;
        println!("Added '{}' to '{}'", song.title, playlist.name);
        Ok(())
    })
}

fn cmd_playlist_move(rt: &Runtime, name: &str, from: usize, to: usize) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        let mut playlist = require_playlist(&pool, name).await?;
        playlist.move_entry(from, to)?;
        db::save_playlist(&pool, &playlist).await?;
        Ok(())
    })
}

fn cmd_playlist_remove(rt: &Runtime, name: &str, position: usize) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        let mut playlist = require_playlist(&pool, name).await?;
        if !playlist.remove(position) {
            bail!(
                "Position {position} is past the end of '{}' ({} entries)",
                playlist.name,
                playlist.len()
            );
        }
        db::save_playlist(&pool, &playlist).await?;
        Ok(())
    })
}

fn cmd_playlist_export(
    rt: &Runtime,
    name: &str,
    output: &PathBuf,
    format: &str,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let format: PlaylistFormat = format
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let pool = open_pool().await?;
        let playlist = require_playlist(&pool, name).await?;
        let index = SongIndex::new(db::get_all_songs(&pool).await?);

        let text = playlist.export(format, &index);
        std::fs::write(output, text)
            .with_context(|| format!("Failed to write {output:?}"))?;
        println!("Exported '{}' to {output:?}", playlist.name);
        Ok(())
    })
}

fn cmd_playlist_import(rt: &Runtime, name: &str, input: &PathBuf) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_pool().await?;
        let mut playlist = require_playlist(&pool, name).await?;
        let index = SongIndex::new(db::get_all_songs(&pool).await?);

        let text = std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {input:?}"))?;

        if !playlist.import(&text, &index) {
            bail!("{input:?} is not a recognized playlist format (m3u or pls)");
        }
        db::save_playlist(&pool, &playlist).await?;
        println!(
            "Imported {} entries into '{}'",
            playlist.len(),
            playlist.name
        );
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scan_flags_conflict() {
        let result = Cli::try_parse_from(["music-archivist", "scan", "main", "--quick", "--deep"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_playlist_insert() {
        let cli =
            Cli::try_parse_from(["music-archivist", "playlist", "insert", "driving", "2", "17"])
                .unwrap();
        match cli.command {
            Commands::Playlist {
                command:
                    PlaylistCommands::Insert {
                        name,
                        position,
                        song_id,
                    },
            } => {
                assert_eq!(name, "driving");
                assert_eq!(position, 2);
                assert_eq!(song_id, 17);
            }
            _ => panic!("parsed into the wrong command"),
        }
    }
}
