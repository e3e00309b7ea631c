//! Filesystem discovery of audio files.
//!
//! Walks an archive's root folder recursively and collects every file
//! whose extension is in the configured supported set (case-insensitive).

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Check whether a path has one of the supported audio extensions.
///
/// The match is case-insensitive.
pub fn is_audio_file(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
        return false;
    };
    extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
}

/// Recursively collect all supported audio files under `root`.
///
/// Unreadable directory entries are skipped. The returned order is
/// whatever the directory walk yields; callers must not rely on it.
pub fn collect_audio_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_audio_file(p, extensions))
        .collect()
}
