//! Music Archivist - a personal music library manager.
//!
//! Keeps registered archives of audio files reconciled with the files on
//! disk, refreshes tag metadata incrementally, reorganizes files by
//! naming templates, runs scheduled rsync backups, and manages ordered
//! playlists with m3u/pls import and export.

pub mod backup;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod hash;
pub mod metadata;
pub mod model;
pub mod organizer;
pub mod playlist;
pub mod reconciler;
pub mod scanner;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::from_default_env().add_directive("music_archivist=info".parse().unwrap()),
        )
        .init();

    cli::run_command(&args)
}
