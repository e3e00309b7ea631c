//! Command-line interface module.
//!
//! Provides CLI commands for managing archives, scanning, backups,
//! reorganization, and playlists.

pub mod commands;

pub use commands::{Cli, run_command};
