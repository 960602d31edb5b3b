//! Dead thumbnail reconciliation
//!
//! After a scan, thumbnail files on disk that no catalog row references are
//! swept. Deletion is best-effort; a file that cannot be removed is logged
//! and skipped.

use log::{debug, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::store::{Store, Table};

/// Lists and removes files in the thumbnail directory. Split out so tests
/// can drive the sweep without touching a real directory.
pub trait ThumbnailLister {
    /// Files directly inside `dir`; empty when the directory is missing
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>>;
    fn remove(&self, path: &Path) -> Result<()>;
}

/// Filesystem-backed lister
#[derive(Debug, Default)]
pub struct FsThumbnailLister;

impl ThumbnailLister for FsThumbnailLister {
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path)?;
        Ok(())
    }
}

/// Delete thumbnail files no image or video row references.
///
/// Files whose name starts with `index_prefix` form the derived-index
/// family: they are deleted whenever any thumbnail rows existed, and left
/// alone on a catalog with no thumbnail rows at all. Returns the number of
/// files removed.
pub fn prune_dead_thumbnails(
    store: &dyn Store,
    lister: &dyn ThumbnailLister,
    dir: &Path,
    index_prefix: &str,
) -> Result<usize> {
    let candidates = lister.list(dir)?;
    if candidates.is_empty() {
        return Ok(0);
    }

    let mut referenced: HashSet<String> = HashSet::new();
    let mut had_rows = false;
    for table in [Table::Thumbnails, Table::VideoThumbnails] {
        let rows = store.query(table, &["path"], None, &[], None, None, false)?;
        for row in rows {
            had_rows = true;
            if let Some(path) = row[0].as_str() {
                referenced.insert(path.to_string());
            }
        }
    }

    let mut removed = 0;
    for candidate in candidates {
        let name = candidate
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dead = if name.starts_with(index_prefix) {
            // the index family is stale as soon as any real rows exist
            had_rows
        } else {
            !referenced.contains(candidate.to_string_lossy().as_ref())
        };
        if !dead {
            continue;
        }
        match lister.remove(&candidate) {
            Ok(()) => {
                debug!("pruned dead thumbnail {}", candidate.display());
                removed += 1;
            }
            Err(e) => warn!("failed to prune {}: {}", candidate.display(), e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FieldMap, SqliteStore};
    use std::fs;
    use tempfile::TempDir;

    fn reference(store: &SqliteStore, table: Table, path: &str) {
        let mut fields = FieldMap::new();
        fields.insert("path", path.into());
        store.insert(table, &fields).unwrap();
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_unreferenced_thumbnails_removed() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open_memory().unwrap();

        let kept = touch(tmp.path(), "a.jpg");
        let dead1 = touch(tmp.path(), "b.jpg");
        let dead2 = touch(tmp.path(), "c.jpg");
        reference(&store, Table::Thumbnails, kept.to_str().unwrap());

        let removed = prune_dead_thumbnails(
            &store,
            &FsThumbnailLister,
            tmp.path(),
            ".thumbdata",
        )
        .unwrap();
        assert_eq!(removed, 2);
        assert!(kept.exists());
        assert!(!dead1.exists());
        assert!(!dead2.exists());
    }

    #[test]
    fn test_video_thumbnail_references_count() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open_memory().unwrap();

        let kept = touch(tmp.path(), "v.jpg");
        reference(&store, Table::VideoThumbnails, kept.to_str().unwrap());

        let removed = prune_dead_thumbnails(
            &store,
            &FsThumbnailLister,
            tmp.path(),
            ".thumbdata",
        )
        .unwrap();
        assert_eq!(removed, 0);
        assert!(kept.exists());
    }

    #[test]
    fn test_index_family_removed_when_rows_exist() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open_memory().unwrap();

        let kept = touch(tmp.path(), "a.jpg");
        let index = touch(tmp.path(), ".thumbdata4-12345");
        reference(&store, Table::Thumbnails, kept.to_str().unwrap());

        prune_dead_thumbnails(&store, &FsThumbnailLister, tmp.path(), ".thumbdata").unwrap();
        assert!(kept.exists());
        assert!(!index.exists());
    }

    #[test]
    fn test_index_family_kept_when_no_rows() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open_memory().unwrap();

        let index = touch(tmp.path(), ".thumbdata4-12345");
        let dead = touch(tmp.path(), "orphan.jpg");

        let removed =
            prune_dead_thumbnails(&store, &FsThumbnailLister, tmp.path(), ".thumbdata").unwrap();
        assert_eq!(removed, 1);
        assert!(index.exists());
        assert!(!dead.exists());
    }

    #[test]
    fn test_missing_directory_is_noop() {
        let store = SqliteStore::open_memory().unwrap();
        let removed = prune_dead_thumbnails(
            &store,
            &FsThumbnailLister,
            Path::new("/nonexistent/thumbs"),
            ".thumbdata",
        )
        .unwrap();
        assert_eq!(removed, 0);
    }
}
