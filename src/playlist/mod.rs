//! Ordered playlist engine.
//!
//! A playlist is a named, ordered, duplicate-permitting sequence of song
//! ids plus a derived membership index: the set of distinct ids in the
//! sequence. The index is a cache, never the source of truth, and is
//! rebuilt after every structural mutation so it can never be observed
//! stale.
//!
//! Export and import speak the m3u and pls text formats. Both resolve
//! song references through a [`SongIndex`] snapshot of the song table.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use crate::model::Song;

/// Playlist structural failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlaylistError {
    #[error("position {position} is out of range for a playlist of length {len}")]
    PositionOutOfRange { position: usize, len: usize },
}

/// Supported playlist text formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaylistFormat {
    #[default]
    M3u,
    Pls,
}

impl FromStr for PlaylistFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "m3u" => Ok(PlaylistFormat::M3u),
            "pls" => Ok(PlaylistFormat::Pls),
            other => Err(format!("unknown playlist format: {other}")),
        }
    }
}

/// Snapshot of song records used to resolve playlist references.
///
/// Export looks songs up by id; import resolves paths back to ids.
pub struct SongIndex {
    by_id: HashMap<i64, Song>,
    by_path: HashMap<String, i64>,
}

impl SongIndex {
    pub fn new(songs: Vec<Song>) -> Self {
        let mut by_id = HashMap::with_capacity(songs.len());
        let mut by_path = HashMap::with_capacity(songs.len());
        for song in songs {
            by_path.insert(song.path.clone(), song.id);
            by_id.insert(song.id, song);
        }
        Self { by_id, by_path }
    }

    pub fn song_by_id(&self, id: i64) -> Option<&Song> {
        self.by_id.get(&id)
    }

    pub fn id_by_path(&self, path: &str) -> Option<i64> {
        self.by_path.get(path).copied()
    }
}

/// A named, ordered, duplicate-permitting sequence of song ids.
#[derive(Debug, Clone)]
pub struct Playlist {
    /// Database ID (0 for unsaved playlists)
    pub id: i64,
    pub name: String,
    entries: Vec<i64>,
    members: HashSet<i64>,
}

impl Playlist {
    /// Create a new, empty playlist.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            entries: Vec::new(),
            members: HashSet::new(),
        }
    }

    /// Reconstruct a playlist from stored parts, deriving the membership
    /// index from the ordered entries.
    pub fn from_parts(id: i64, name: String, entries: Vec<i64>) -> Self {
        let members = entries.iter().copied().collect();
        Self {
            id,
            name,
            entries,
            members,
        }
    }

    /// The ordered sequence of song ids.
    pub fn entries(&self) -> &[i64] {
        &self.entries
    }

    /// The derived set of distinct song ids in the sequence.
    pub fn members(&self) -> &HashSet<i64> {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a song at `position`, shifting later entries right.
    ///
    /// `position` may equal the current length (append position).
    pub fn insert(&mut self, position: usize, song: &Song) -> Result<(), PlaylistError> {
        if position > self.entries.len() {
            return Err(PlaylistError::PositionOutOfRange {
                position,
                len: self.entries.len(),
            });
        }
        self.entries.insert(position, song.id);
        self.rebuild_members();
        Ok(())
    }

    /// Add a song to the end of the playlist.
    pub fn append(&mut self, song: &Song) {
        self.entries.push(song.id);
        self.rebuild_members();
    }

    /// Move the entry at `original_position` so it lands immediately above
    /// the entry that was at `new_position` before the move.
    ///
    /// Removing the original entry shifts every later index down by one,
    /// so when moving forward the effective insert index is
    /// `new_position - 1`; moving backward it is `new_position` unchanged.
    pub fn move_entry(
        &mut self,
        original_position: usize,
        new_position: usize,
    ) -> Result<(), PlaylistError> {
        let len = self.entries.len();
        if original_position >= len {
            return Err(PlaylistError::PositionOutOfRange {
                position: original_position,
                len,
            });
        }
        if new_position > len {
            return Err(PlaylistError::PositionOutOfRange {
                position: new_position,
                len,
            });
        }
        if original_position == new_position {
            return Ok(());
        }

        let song_id = self.entries.remove(original_position);
        if new_position < original_position {
            self.entries.insert(new_position, song_id);
        } else {
            self.entries.insert(new_position - 1, song_id);
        }
        self.rebuild_members();
        Ok(())
    }

    /// Remove the entry at `position`.
    ///
    /// Returns false (nothing removed) if the position is past the end.
    pub fn remove(&mut self, position: usize) -> bool {
        if position >= self.entries.len() {
            return false;
        }
        self.entries.remove(position);
        self.rebuild_members();
        true
    }

    /// Serialize the playlist to a text format.
    ///
    /// Entries whose song id no longer resolves are skipped with a
    /// warning; a deleted song must not break the whole export.
    pub fn export(&self, format: PlaylistFormat, index: &SongIndex) -> String {
        match format {
            PlaylistFormat::M3u => self.export_m3u(index),
            PlaylistFormat::Pls => self.export_pls(index),
        }
    }

    fn export_m3u(&self, index: &SongIndex) -> String {
        let mut out = String::from("#EXTM3U\n");
        for &song_id in &self.entries {
            let Some(song) = index.song_by_id(song_id) else {
                tracing::warn!("Playlist '{}' references missing song {song_id}", self.name);
                continue;
            };
            out.push_str(&format!(
                "#EXTINF:{},{} - {}\n{}\n\n",
                song.duration, song.artist, song.title, song.path
            ));
        }
        out
    }

    fn export_pls(&self, index: &SongIndex) -> String {
        let mut out = String::from("[playlist]\n");
        let mut n = 0usize;
        for &song_id in &self.entries {
            let Some(song) = index.song_by_id(song_id) else {
                tracing::warn!("Playlist '{}' references missing song {song_id}", self.name);
                continue;
            };
            n += 1;
            out.push_str(&format!("File{n}={}\n", song.path));
            out.push_str(&format!("Title{n}={}\n", song.title));
            out.push_str(&format!("Length{n}={}\n", song.duration));
        }
        out.push_str(&format!("NumberOfEntries={n}\n"));
        out.push_str("Version=2\n");
        out
    }

    /// Import a playlist from m3u or pls text, replacing the current
    /// entries.
    ///
    /// Returns false if the format header is not recognized. Entries whose
    /// path does not resolve against the song index are skipped with a
    /// warning; the import still succeeds.
    pub fn import(&mut self, text: &str, index: &SongIndex) -> bool {
        // Reset before sniffing the header; an unrecognized format leaves
        // the playlist empty rather than half-imported.
        self.entries.clear();
        self.rebuild_members();

        if text.is_empty() {
            return false;
        }

        if text.starts_with("#EXTM3U") {
            let mut lines = text.lines();
            while let Some(line) = lines.next() {
                if !line.starts_with("#EXTINF:") {
                    continue;
                }
                let Some(path) = lines.next().map(str::trim) else {
                    break;
                };
                self.resolve_and_push(path, index);
            }
            self.rebuild_members();
            return true;
        }

        if text.starts_with("[playlist]") {
            for line in text.lines() {
                if let Some(path) = pls_file_value(line) {
                    self.resolve_and_push(path.trim(), index);
                }
            }
            self.rebuild_members();
            return true;
        }

        false
    }

    fn resolve_and_push(&mut self, path: &str, index: &SongIndex) {
        match index.id_by_path(path) {
            Some(id) => self.entries.push(id),
            None => {
                tracing::warn!(
                    "Playlist entry '{path}' could not be found and has not been added \
                     to playlist '{}'",
                    self.name
                );
            }
        }
    }

    fn rebuild_members(&mut self) {
        self.members = self.entries.iter().copied().collect();
    }
}

/// Extract the path from a pls `File<N>=...` line.
///
/// The key match is case-insensitive and the entry index digits are
/// optional, so both canonical `File1=` lines and bare `File=` lines from
/// older exporters are accepted.
fn pls_file_value(line: &str) -> Option<&str> {
    let rest = line
        .get(..4)
        .filter(|prefix| prefix.eq_ignore_ascii_case("file"))
        .map(|_| &line[4..])?;
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());
    rest.strip_prefix('=')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Song;

    fn song(id: i64, path: &str) -> Song {
        let mut song = Song::new(1, path);
        song.id = id;
        song.title = format!("Title {id}");
        song.artist = format!("Artist {id}");
        song.duration = 100.0 + id as f64;
        song
    }

    fn index(songs: &[Song]) -> SongIndex {
        SongIndex::new(songs.to_vec())
    }

    fn playlist_of(ids: &[i64]) -> Playlist {
        Playlist::from_parts(1, "test".to_string(), ids.to_vec())
    }

    #[test]
    fn test_insert_and_append_keep_order() {
        let a = song(1, "/m/a.mp3");
        let b = song(2, "/m/b.mp3");
        let c = song(3, "/m/c.mp3");

        let mut playlist = Playlist::new("test");
        playlist.append(&a);
        playlist.append(&c);
        playlist.insert(1, &b).unwrap();

        assert_eq!(playlist.entries(), &[1, 2, 3]);
    }

    #[test]
    fn test_insert_out_of_range_rejected_before_mutation() {
        let a = song(1, "/m/a.mp3");
        let mut playlist = playlist_of(&[1, 2]);

        let err = playlist.insert(3, &a).unwrap_err();
        assert_eq!(
            err,
            PlaylistError::PositionOutOfRange {
                position: 3,
                len: 2
            }
        );
        assert_eq!(playlist.entries(), &[1, 2]);
    }

    #[test]
    fn test_insert_at_length_appends() {
        let a = song(9, "/m/a.mp3");
        let mut playlist = playlist_of(&[1, 2]);
        playlist.insert(2, &a).unwrap();
        assert_eq!(playlist.entries(), &[1, 2, 9]);
    }

    #[test]
    fn test_move_forward_lands_above_premove_target() {
        // [A,B,C,D]: move(0, 2) puts A immediately above the pre-move C.
        // Removing A shifts C down to index 1, so the insert index is 1.
        let mut playlist = playlist_of(&[10, 20, 30, 40]);
        playlist.move_entry(0, 2).unwrap();
        assert_eq!(playlist.entries(), &[20, 10, 30, 40]);
    }

    #[test]
    fn test_move_forward_to_end() {
        // move(0, len) lands the entry last; the shift adjustment means
        // the insert index is len - 1 after removal
        let mut playlist = playlist_of(&[10, 20, 30, 40]);
        playlist.move_entry(0, 4).unwrap();
        assert_eq!(playlist.entries(), &[20, 30, 40, 10]);
    }

    #[test]
    fn test_move_backward() {
        // [A,B,C,D]: move(3, 0) puts D first
        let mut playlist = playlist_of(&[10, 20, 30, 40]);
        playlist.move_entry(3, 0).unwrap();
        assert_eq!(playlist.entries(), &[40, 10, 20, 30]);
    }

    #[test]
    fn test_move_to_same_position_is_noop() {
        let mut playlist = playlist_of(&[1, 2, 3]);
        playlist.move_entry(1, 1).unwrap();
        assert_eq!(playlist.entries(), &[1, 2, 3]);
    }

    #[test]
    fn test_move_out_of_range() {
        let mut playlist = playlist_of(&[1, 2]);
        assert!(playlist.move_entry(2, 0).is_err());
        assert!(playlist.move_entry(0, 3).is_err());
    }

    #[test]
    fn test_remove() {
        let mut playlist = playlist_of(&[1, 2, 3]);
        assert!(playlist.remove(1));
        assert_eq!(playlist.entries(), &[1, 3]);
        // Past the end is a clean "not removed"
        assert!(!playlist.remove(5));
        assert_eq!(playlist.entries(), &[1, 3]);
    }

    #[test]
    fn test_membership_index_tracks_distinct_entries() {
        let a = song(1, "/m/a.mp3");
        let b = song(2, "/m/b.mp3");

        let mut playlist = Playlist::new("test");
        playlist.append(&a);
        playlist.append(&b);
        playlist.append(&a); // duplicate

        assert_eq!(playlist.entries(), &[1, 2, 1]);
        assert_eq!(playlist.members().len(), 2);

        // Removing one duplicate keeps the member; removing the last
        // occurrence drops it
        playlist.remove(0);
        assert!(playlist.members().contains(&1));
        playlist.remove(1);
        assert!(!playlist.members().contains(&1));
        assert!(playlist.members().contains(&2));
    }

    #[test]
    fn test_export_m3u_layout() {
        let songs = [song(1, "/m/a.mp3"), song(2, "/m/b.mp3")];
        let playlist = playlist_of(&[1, 2]);

        let out = playlist.export(PlaylistFormat::M3u, &index(&songs));
        assert_eq!(
            out,
            "#EXTM3U\n\
             #EXTINF:101,Artist 1 - Title 1\n/m/a.mp3\n\n\
             #EXTINF:102,Artist 2 - Title 2\n/m/b.mp3\n\n"
        );
    }

    #[test]
    fn test_export_pls_layout() {
        let songs = [song(1, "/m/a.mp3"), song(2, "/m/b.mp3")];
        let playlist = playlist_of(&[1, 2]);

        let out = playlist.export(PlaylistFormat::Pls, &index(&songs));
        assert_eq!(
            out,
            "[playlist]\n\
             File1=/m/a.mp3\nTitle1=Title 1\nLength1=101\n\
             File2=/m/b.mp3\nTitle2=Title 2\nLength2=102\n\
             NumberOfEntries=2\nVersion=2\n"
        );
    }

    #[test]
    fn test_export_skips_dangling_ids() {
        let songs = [song(1, "/m/a.mp3")];
        let playlist = playlist_of(&[1, 99]);

        let out = playlist.export(PlaylistFormat::Pls, &index(&songs));
        assert!(out.contains("File1=/m/a.mp3"));
        assert!(out.contains("NumberOfEntries=1\n"));
    }

    #[test]
    fn test_import_m3u_roundtrip() {
        let songs = [song(1, "/m/a.mp3"), song(2, "/m/b.mp3")];
        let idx = index(&songs);
        let playlist = playlist_of(&[1, 2]);
        let text = playlist.export(PlaylistFormat::M3u, &idx);

        let mut fresh = Playlist::new("imported");
        assert!(fresh.import(&text, &idx));
        assert_eq!(fresh.entries(), &[1, 2]);
    }

    #[test]
    fn test_import_pls_roundtrip() {
        let songs = [song(1, "/m/a.mp3"), song(2, "/m/b.mp3")];
        let idx = index(&songs);
        let playlist = playlist_of(&[2, 1]);
        let text = playlist.export(PlaylistFormat::Pls, &idx);

        let mut fresh = Playlist::new("imported");
        assert!(fresh.import(&text, &idx));
        assert_eq!(fresh.entries(), &[2, 1]);
    }

    #[test]
    fn test_import_skips_unresolved_paths() {
        let songs = [song(1, "/m/a.mp3")];
        let text = "#EXTM3U\n\
                    #EXTINF:101,Artist 1 - Title 1\n/m/a.mp3\n\n\
                    #EXTINF:50,Ghost - Gone\n/m/missing.mp3\n\n";

        let mut playlist = Playlist::new("imported");
        // Unresolved entries are non-fatal; the import still succeeds
        assert!(playlist.import(text, &index(&songs)));
        assert_eq!(playlist.entries(), &[1]);
    }

    #[test]
    fn test_import_unrecognized_format() {
        let idx = index(&[]);
        let mut playlist = playlist_of(&[1, 2]);

        assert!(!playlist.import("not a playlist at all", &idx));
        // Reset to empty is the only mutation
        assert!(playlist.is_empty());
        assert!(playlist.members().is_empty());

        let mut playlist = playlist_of(&[1]);
        assert!(!playlist.import("", &idx));
        assert!(playlist.is_empty());
    }

    #[test]
    fn test_pls_file_value() {
        assert_eq!(pls_file_value("File1=/m/a.mp3"), Some("/m/a.mp3"));
        assert_eq!(pls_file_value("file=/m/a.mp3"), Some("/m/a.mp3"));
        assert_eq!(pls_file_value("FILE12=x"), Some("x"));
        assert_eq!(pls_file_value("Title1=x"), None);
        assert_eq!(pls_file_value("NumberOfEntries=2"), None);
        assert_eq!(pls_file_value(""), None);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Insert(usize, i64),
        Append(i64),
        Move(usize, usize),
        Remove(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..16, 1i64..8).prop_map(|(p, id)| Op::Insert(p, id)),
            (1i64..8).prop_map(Op::Append),
            (0usize..16, 0usize..16).prop_map(|(a, b)| Op::Move(a, b)),
            (0usize..16).prop_map(Op::Remove),
        ]
    }

    fn song_with_id(id: i64) -> Song {
        let mut song = Song::new(1, format!("/m/{id}.mp3"));
        song.id = id;
        song
    }

    proptest! {
        /// After any sequence of mutations, the membership index equals
        /// the set of distinct values in the ordered sequence.
        #[test]
        fn membership_index_invariant(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let mut playlist = Playlist::new("prop");
            for op in ops {
                match op {
                    Op::Insert(pos, id) => {
                        let _ = playlist.insert(pos, &song_with_id(id));
                    }
                    Op::Append(id) => playlist.append(&song_with_id(id)),
                    Op::Move(from, to) => {
                        let _ = playlist.move_entry(from, to);
                    }
                    Op::Remove(pos) => {
                        let _ = playlist.remove(pos);
                    }
                }

                let distinct: std::collections::HashSet<i64> =
                    playlist.entries().iter().copied().collect();
                prop_assert_eq!(&distinct, playlist.members());
            }
        }
    }
}
