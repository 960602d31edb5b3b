//! Playlist parsing and membership resolution
//!
//! Playlist files are parsed into candidate entry paths, then resolved
//! against the audio rows already in the catalog by suffix matching: the
//! candidate whose trailing path segments agree with a catalog path the
//! longest wins, with an exact match short-circuiting the search.
//! Membership rows are rewritten wholesale with dense play order.

use log::{debug, warn};
use std::path::Path;

use crate::classify::PlaylistKind;
use crate::error::Result;
use crate::store::{FieldMap, Store, Table, Value};

/// Minimum length of a usable entry path; shorter lines are noise
const MIN_ENTRY_LEN: usize = 3;

/// One candidate playlist line awaiting resolution
#[derive(Debug)]
struct PlaylistEntry {
    path: String,
    best_match_id: i64,
    best_match_level: i32,
}

/// Resolves one playlist file's entries to catalog audio rows
pub struct PlaylistResolver {
    case_insensitive: bool,
    entries: Vec<PlaylistEntry>,
}

impl PlaylistResolver {
    pub fn new(case_insensitive: bool) -> Self {
        Self {
            case_insensitive,
            entries: Vec::new(),
        }
    }

    /// Number of cached candidate entries
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Cache one raw playlist line.
    ///
    /// Trailing whitespace is stripped; entries shorter than three
    /// characters are dropped. A line that is not an absolute path (Unix or
    /// DOS form) is resolved against the playlist's directory.
    pub fn cache_entry(&mut self, line: &str, playlist_dir: &str) {
        let trimmed = line.trim_end();
        if trimmed.len() < MIN_ENTRY_LEN {
            return;
        }
        let bytes = trimmed.as_bytes();
        let absolute = bytes[0] == b'/'
            || (bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'\\');
        let path = if absolute {
            trimmed.to_string()
        } else {
            format!("{}{}", playlist_dir, trimmed)
        };
        self.entries.push(PlaylistEntry {
            path,
            best_match_id: 0,
            best_match_level: 0,
        });
    }

    /// Parse one playlist file into cached entries
    pub fn parse(&mut self, kind: PlaylistKind, contents: &str, playlist_dir: &str) {
        match kind {
            PlaylistKind::M3u => self.parse_m3u(contents, playlist_dir),
            PlaylistKind::Pls => self.parse_pls(contents, playlist_dir),
            PlaylistKind::Wpl => self.parse_wpl(contents, playlist_dir),
        }
    }

    fn parse_m3u(&mut self, contents: &str, playlist_dir: &str) {
        for line in contents.lines() {
            if !line.starts_with('#') {
                self.cache_entry(line, playlist_dir);
            }
        }
    }

    fn parse_pls(&mut self, contents: &str, playlist_dir: &str) {
        for line in contents.lines() {
            if line.starts_with("File") {
                if let Some(equals) = line.find('=') {
                    if equals > 0 {
                        self.cache_entry(&line[equals + 1..], playlist_dir);
                    }
                }
            }
        }
    }

    /// Entry paths live in `src` attributes of media elements
    fn parse_wpl(&mut self, contents: &str, playlist_dir: &str) {
        let mut rest = contents;
        while let Some(pos) = rest.find("src=\"") {
            rest = &rest[pos + 5..];
            if let Some(end) = rest.find('"') {
                let src = &rest[..end];
                self.cache_entry(src, playlist_dir);
                rest = &rest[end + 1..];
            } else {
                break;
            }
        }
    }

    /// Offer one catalog row to every unresolved entry. Returns true once
    /// all entries hold an exact match, so the caller can stop iterating.
    fn match_entries(&mut self, row_id: i64, path: &str) -> bool {
        let case_insensitive = self.case_insensitive;
        let mut done = true;
        for entry in &mut self.entries {
            if entry.best_match_level == i32::MAX {
                continue;
            }
            done = false;
            let exact = if case_insensitive {
                path.eq_ignore_ascii_case(&entry.path)
            } else {
                path == entry.path
            };
            if exact {
                entry.best_match_id = row_id;
                entry.best_match_level = i32::MAX;
                continue;
            }
            let level = match_paths(path, &entry.path, case_insensitive);
            if level > entry.best_match_level {
                entry.best_match_id = row_id;
                entry.best_match_level = level;
            }
        }
        done
    }

    /// Resolve cached entries against the catalog's audio rows and rewrite
    /// the playlist's membership.
    ///
    /// The caller must flush any pending batched writes first, so freshly
    /// scanned audio rows are visible to the membership query. Old
    /// membership rows are removed before the new ones are written; matched
    /// entries get dense play order, unmatched entries are skipped.
    pub fn resolve(&mut self, store: &dyn Store, playlist_id: i64) -> Result<usize> {
        let rows = store.query(
            Table::Audio,
            &["_id", "path"],
            None,
            &[],
            Some("_id"),
            None,
            false,
        )?;
        for row in &rows {
            let (Some(row_id), Some(path)) = (row[0].as_i64(), row[1].as_str()) else {
                continue;
            };
            if self.match_entries(row_id, path) {
                break;
            }
        }

        store.delete(
            Table::PlaylistMembers,
            Some("playlist_id = ?"),
            &[Value::Integer(playlist_id)],
        )?;

        let mut order = 0i64;
        for entry in &self.entries {
            if entry.best_match_level > 0 {
                let mut fields = FieldMap::new();
                fields.insert("playlist_id", playlist_id.into());
                fields.insert("play_order", order.into());
                fields.insert("audio_id", entry.best_match_id.into());
                store.insert(Table::PlaylistMembers, &fields)?;
                order += 1;
            } else {
                debug!("no catalog match for playlist entry {}", entry.path);
            }
        }
        self.entries.clear();
        Ok(order as usize)
    }
}

/// Score one candidate path against a catalog path: the number of trailing
/// path segments that agree. Both `/` and `\` separate segments, so
/// DOS-style entries match Unix catalog paths.
fn match_paths(path1: &str, path2: &str, case_insensitive: bool) -> i32 {
    let mut result = 0;
    let mut end1 = path1.len();
    let mut end2 = path2.len();
    while end1 > 0 && end2 > 0 {
        let start1 = last_separator(path1, end1).map_or(0, |i| i + 1);
        let start2 = last_separator(path2, end2).map_or(0, |i| i + 1);
        let seg1 = &path1[start1..end1];
        let seg2 = &path2[start2..end2];
        if seg1.len() != seg2.len() {
            break;
        }
        let equal = if case_insensitive {
            seg1.eq_ignore_ascii_case(seg2)
        } else {
            seg1 == seg2
        };
        if !equal {
            break;
        }
        result += 1;
        end1 = start1.saturating_sub(1);
        end2 = start2.saturating_sub(1);
    }
    result
}

/// Index of the last `/` or `\` strictly before `end`
fn last_separator(path: &str, end: usize) -> Option<usize> {
    path[..end].rfind(['/', '\\'])
}

/// Directory prefix of a playlist path, including the trailing separator
pub fn playlist_directory(path: &str) -> String {
    match path.rfind(['/', '\\']) {
        Some(i) => path[..=i].to_string(),
        None => String::new(),
    }
}

/// Parse and resolve one playlist file against the catalog
pub fn process_playlist_file(
    store: &dyn Store,
    path: &Path,
    kind: PlaylistKind,
    playlist_id: i64,
    case_insensitive: bool,
) -> Result<usize> {
    let contents = std::fs::read_to_string(path).unwrap_or_else(|e| {
        warn!("unreadable playlist {}: {}", path.display(), e);
        String::new()
    });
    let path_str = path.to_string_lossy();
    let dir = playlist_directory(&path_str);
    let mut resolver = PlaylistResolver::new(case_insensitive);
    resolver.parse(kind, &contents, &dir);
    resolver.resolve(store, playlist_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn insert_audio(store: &SqliteStore, path: &str) -> i64 {
        let mut fields = FieldMap::new();
        fields.insert("path", path.into());
        store.insert(Table::Audio, &fields).unwrap()
    }

    fn members(store: &SqliteStore, playlist_id: i64) -> Vec<(i64, i64)> {
        store
            .query(
                Table::PlaylistMembers,
                &["play_order", "audio_id"],
                Some("playlist_id = ?"),
                &[Value::Integer(playlist_id)],
                Some("play_order"),
                None,
                true,
            )
            .unwrap()
            .into_iter()
            .map(|r| (r[0].as_i64().unwrap(), r[1].as_i64().unwrap()))
            .collect()
    }

    #[test]
    fn test_m3u_parsing_skips_comments_and_short_lines() {
        let mut resolver = PlaylistResolver::new(true);
        resolver.parse(
            PlaylistKind::M3u,
            "#EXTM3U\n#EXTINF:123,Song\nsongs/a.mp3  \n\nab\n/abs/b.mp3\n",
            "/music/",
        );
        assert_eq!(resolver.entry_count(), 2);
        assert_eq!(resolver.entries[0].path, "/music/songs/a.mp3");
        assert_eq!(resolver.entries[1].path, "/abs/b.mp3");
    }

    #[test]
    fn test_pls_parsing() {
        let mut resolver = PlaylistResolver::new(true);
        resolver.parse(
            PlaylistKind::Pls,
            "[playlist]\nFile1=a.mp3\nFile2=/abs/b.mp3\nTitle1=ignored\nNumberOfEntries=2\n",
            "/music/",
        );
        assert_eq!(resolver.entry_count(), 2);
        assert_eq!(resolver.entries[0].path, "/music/a.mp3");
        assert_eq!(resolver.entries[1].path, "/abs/b.mp3");
    }

    #[test]
    fn test_wpl_parsing() {
        let mut resolver = PlaylistResolver::new(true);
        resolver.parse(
            PlaylistKind::Wpl,
            "<smil><body><seq><media src=\"a.mp3\"/><media src=\"sub\\b.mp3\"/></seq></body></smil>",
            "/music/",
        );
        assert_eq!(resolver.entry_count(), 2);
        assert_eq!(resolver.entries[0].path, "/music/a.mp3");
        assert_eq!(resolver.entries[1].path, "/music/sub\\b.mp3");
    }

    #[test]
    fn test_dos_entry_detected_as_absolute() {
        let mut resolver = PlaylistResolver::new(true);
        resolver.cache_entry("C:\\Music\\a.mp3", "/music/");
        assert_eq!(resolver.entries[0].path, "C:\\Music\\a.mp3");
    }

    #[test]
    fn test_match_paths_counts_trailing_segments() {
        assert_eq!(match_paths("/a/b/c.mp3", "/x/b/c.mp3", true), 2);
        assert_eq!(match_paths("/a/b/c.mp3", "/a/b/c.mp3", true), 3);
        assert_eq!(match_paths("/a/b/c.mp3", "/a/b/d.mp3", true), 0);
        // mixed separators agree on segments
        assert_eq!(match_paths("/a/b/c.mp3", "x\\b\\c.mp3", true), 2);
        // case-insensitive only when asked
        assert_eq!(match_paths("/a/B/C.MP3", "/x/b/c.mp3", true), 2);
        assert_eq!(match_paths("/a/B/C.MP3", "/x/b/c.mp3", false), 0);
    }

    #[test]
    fn test_exact_match_wins_over_longer_suffix() {
        let store = SqliteStore::open_memory().unwrap();
        // deep suffix candidate first, exact match second
        let _deep = insert_audio(&store, "/other/music/sub/a.mp3");
        let exact = insert_audio(&store, "/music/a.mp3");
        let playlist_id = 99;

        let mut resolver = PlaylistResolver::new(true);
        resolver.cache_entry("/music/a.mp3", "/music/");
        let matched = resolver.resolve(&store, playlist_id).unwrap();
        assert_eq!(matched, 1);
        assert_eq!(members(&store, playlist_id), vec![(0, exact)]);
    }

    #[test]
    fn test_tie_keeps_first_candidate() {
        let store = SqliteStore::open_memory().unwrap();
        let first = insert_audio(&store, "/x/sub/a.mp3");
        let _second = insert_audio(&store, "/y/sub/a.mp3");

        let mut resolver = PlaylistResolver::new(true);
        resolver.cache_entry("/z/sub/a.mp3", "/z/");
        resolver.resolve(&store, 1).unwrap();
        assert_eq!(members(&store, 1), vec![(0, first)]);
    }

    #[test]
    fn test_dense_play_order_skips_unmatched() {
        let store = SqliteStore::open_memory().unwrap();
        let a = insert_audio(&store, "/music/a.mp3");
        let c = insert_audio(&store, "/music/c.mp3");

        let mut resolver = PlaylistResolver::new(true);
        resolver.parse(
            PlaylistKind::M3u,
            "a.mp3\nmissing.mp3\nc.mp3\n",
            "/music/",
        );
        let matched = resolver.resolve(&store, 7).unwrap();
        assert_eq!(matched, 2);
        assert_eq!(members(&store, 7), vec![(0, a), (1, c)]);
    }

    #[test]
    fn test_membership_rewritten_not_appended() {
        let store = SqliteStore::open_memory().unwrap();
        let a = insert_audio(&store, "/music/a.mp3");

        let mut resolver = PlaylistResolver::new(true);
        resolver.cache_entry("a.mp3", "/music/");
        resolver.resolve(&store, 5).unwrap();

        let mut resolver = PlaylistResolver::new(true);
        resolver.cache_entry("a.mp3", "/music/");
        resolver.resolve(&store, 5).unwrap();

        assert_eq!(members(&store, 5), vec![(0, a)]);
    }
}
