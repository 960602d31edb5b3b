//! Scan engine: the prescan / scan / postscan pipeline
//!
//! A scan session reconciles a filesystem tree with the catalog in three
//! phases. Prescan pages through existing rows and deletes the ones whose
//! files are gone. The scan phase traverses directories, classifies each
//! file, decides from the modification time whether metadata must be
//! re-extracted, and queues records through the write batcher. Postscan
//! resolves deferred playlists and prunes orphaned thumbnails.
//!
//! A session is single-owner: the engine must not be driven from more than
//! one caller at a time. The only state shared across sessions is the
//! no-media parent cache, which is mutex-guarded and explicitly invalidated.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use walkdir::WalkDir;

use crate::batch::{DeleteBatcher, WriteBatcher};
use crate::classify::{classify, classify_mime, playlist_kind, Classification, ContentType};
use crate::config::{ScanConfig, MTIME_TOLERANCE_SECS};
use crate::error::{Result, ScanErrorKind};
use crate::extract::MetadataExtractor;
use crate::playlist::process_playlist_file;
use crate::record::{build_record, file_name, file_title, AudioCategoryFlags, FileInfo};
use crate::store::{FieldMap, SettingsStore, Store, Table, Value};
use crate::tags::ExtractedMetadata;
use crate::thumbs::{prune_dead_thumbnails, FsThumbnailLister, ThumbnailLister};

/// Format code marking directory (container) rows
pub const CONTAINER_FORMAT: i64 = 0x3001;

/// Setting keys for the default-sound values and their assignment flags
const RINGTONE_KEY: &str = "ringtone";
const RINGTONE_FLAG: &str = "ringtone_set";
const NOTIFICATION_KEY: &str = "notification_sound";
const NOTIFICATION_FLAG: &str = "notification_set";
const ALARM_KEY: &str = "alarm_alert";
const ALARM_FLAG: &str = "alarm_set";

/// Filesystem attributes of one path
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    pub size: i64,
    pub modified_secs: i64,
    pub is_dir: bool,
}

/// Filesystem probing capability, injectable for tests
pub trait FileAttributes {
    fn exists(&self, path: &Path) -> bool;
    fn stat(&self, path: &Path) -> Result<FileStat>;
}

/// std::fs-backed attributes
#[derive(Debug, Default)]
pub struct FsAttributes;

impl FileAttributes for FsAttributes {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn stat(&self, path: &Path) -> Result<FileStat> {
        let meta = std::fs::metadata(path)?;
        let modified_secs = meta
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(FileStat {
            size: meta.len() as i64,
            modified_secs,
            is_dir: meta.is_dir(),
        })
    }
}

/// Cache of directories known to be under a `.nomedia` marker (or known
/// clear of one). Shared across sessions; callers must invalidate it when
/// `.nomedia` files are created or removed.
#[derive(Debug, Default)]
pub struct NoMediaCache {
    media_parents: Mutex<HashSet<String>>,
    no_media_parents: Mutex<HashSet<String>>,
}

impl NoMediaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `path` is hidden from media listings by a dot-segment or an
    /// ancestor `.nomedia` marker. Marker probes are cached per parent.
    pub fn is_no_media_path(&self, path: &str, fs: &dyn FileAttributes) -> bool {
        if path.contains("/.") {
            return true;
        }
        let Some(slash) = path.rfind('/') else {
            return false;
        };
        if slash == 0 {
            return false;
        }
        let parent = &path[..slash];
        if self.lock_no_media().contains(parent) {
            return true;
        }
        if !self.lock_media().contains(parent) {
            let mut offset = 1;
            while offset < path.len() {
                let Some(i) = path[offset..].find('/') else {
                    break;
                };
                let slash_index = offset + i;
                let marker = format!("{}.nomedia", &path[..=slash_index]);
                if fs.exists(Path::new(&marker)) {
                    self.lock_no_media().insert(parent.to_string());
                    return true;
                }
                offset = slash_index + 1;
            }
            self.lock_media().insert(parent.to_string());
        }
        false
    }

    /// Drop everything cached (a `.nomedia` file appeared somewhere)
    pub fn clear(&self) {
        self.lock_media().clear();
        self.lock_no_media().clear();
    }

    /// Drop cached verdicts for `dir` and everything below it (its
    /// `.nomedia` marker went away)
    pub fn unhide(&self, dir: &str) {
        let prefix = format!("{}/", dir);
        for set in [&mut *self.lock_media(), &mut *self.lock_no_media()] {
            set.retain(|p| p != dir && !p.starts_with(&prefix));
        }
    }

    fn lock_media(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.media_parents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_no_media(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.no_media_parents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Filename conventions for files that never count as media: AppleDouble
/// sidecars and Windows Media Player album-art JPEGs.
pub fn is_hidden_filename(path: &str) -> bool {
    let name = file_name(path);
    if name.starts_with("._") {
        return true;
    }
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".jpg") {
        if lower.starts_with("albumart_{") || lower.starts_with("albumart.") {
            return true;
        }
        if lower == "albumartsmall.jpg" || lower == "folder.jpg" {
            return true;
        }
    }
    false
}

/// One catalog row tracked through a scan session
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Row identifier, 0 until persisted
    pub row_id: i64,
    pub path: String,
    /// Freshly observed modification time (seconds)
    pub last_modified: i64,
    pub format: i64,
    /// Whether the modification time moved outside tolerance since the last
    /// catalog read, requiring re-extraction
    pub dirty: bool,
    pub classification: Classification,
    pub no_media: bool,
    pub size: i64,
}

/// Counters reported at the end of a session
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanSummary {
    pub files_seen: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub playlists_resolved: usize,
    pub thumbnails_pruned: usize,
}

/// Default-sound categories, in cascade priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SoundCategory {
    Notification,
    Ringtone,
    Alarm,
}

impl SoundCategory {
    fn keys(self) -> (&'static str, &'static str) {
        match self {
            SoundCategory::Notification => (NOTIFICATION_KEY, NOTIFICATION_FLAG),
            SoundCategory::Ringtone => (RINGTONE_KEY, RINGTONE_FLAG),
            SoundCategory::Alarm => (ALARM_KEY, ALARM_FLAG),
        }
    }
}

/// Orchestrates scan sessions against one catalog
pub struct ScanEngine {
    store: Box<dyn Store>,
    settings: Box<dyn SettingsStore>,
    extractor: Box<dyn MetadataExtractor>,
    fs: Box<dyn FileAttributes>,
    lister: Box<dyn ThumbnailLister>,
    cache: Arc<NoMediaCache>,
    config: ScanConfig,
    batcher: WriteBatcher,
    meta: ExtractedMetadata,

    // per-session state
    summary: ScanSummary,
    original_image_count: i64,
    original_video_count: i64,
    was_empty_prior_to_scan: bool,
    default_ringtone_set: bool,
    default_notification_set: bool,
    default_alarm_set: bool,
    pending_playlists: Vec<CatalogEntry>,
    unhidden_dirs: Vec<String>,
    /// Set while scanning an externally-managed object: (row id, format)
    external_object: Option<(i64, i64)>,
}

impl ScanEngine {
    pub fn new(
        store: Box<dyn Store>,
        settings: Box<dyn SettingsStore>,
        extractor: Box<dyn MetadataExtractor>,
        config: ScanConfig,
    ) -> Self {
        let batcher = WriteBatcher::new(config.insert_batch_size);
        Self {
            store,
            settings,
            extractor,
            fs: Box::new(FsAttributes),
            lister: Box::new(FsThumbnailLister),
            cache: Arc::new(NoMediaCache::new()),
            config,
            batcher,
            meta: ExtractedMetadata::default(),
            summary: ScanSummary::default(),
            original_image_count: 0,
            original_video_count: 0,
            was_empty_prior_to_scan: false,
            default_ringtone_set: false,
            default_notification_set: false,
            default_alarm_set: false,
            pending_playlists: Vec::new(),
            unhidden_dirs: Vec::new(),
            external_object: None,
        }
    }

    /// Replace the filesystem probe (tests)
    pub fn with_file_attributes(mut self, fs: Box<dyn FileAttributes>) -> Self {
        self.fs = fs;
        self
    }

    /// Replace the thumbnail lister (tests)
    pub fn with_thumbnail_lister(mut self, lister: Box<dyn ThumbnailLister>) -> Self {
        self.lister = lister;
        self
    }

    /// Share an externally-owned no-media cache
    pub fn with_no_media_cache(mut self, cache: Arc<NoMediaCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Handle to the engine's no-media cache, for external invalidation
    pub fn no_media_cache(&self) -> Arc<NoMediaCache> {
        Arc::clone(&self.cache)
    }

    /// Scan whole directory trees: full prescan, traversal, postscan
    pub fn scan_tree(&mut self, roots: &[PathBuf]) -> Result<ScanSummary> {
        self.begin_session(None, true)?;
        let result = self.traverse(roots).and_then(|()| self.postscan(true));
        self.flush_on_error(result)?;
        Ok(std::mem::take(&mut self.summary))
    }

    /// Queued writes must not be lost on a failing exit path
    fn flush_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            if let Err(flush_err) = self.batcher.flush_all(self.store.as_ref()) {
                warn!("final flush failed: {}", flush_err);
            }
        }
        result
    }

    /// Batch variant: each folder is scanned as a tree, or each path is
    /// treated as a single file when `single_file_batch` is set.
    pub fn scan_folders(
        &mut self,
        folders: &[PathBuf],
        single_file_batch: bool,
    ) -> Result<ScanSummary> {
        if !single_file_batch {
            return self.scan_tree(folders);
        }
        self.begin_session(None, true)?;
        for path in folders {
            match self.process_file(path, None, false) {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return self.flush_on_error(Err(e)),
                Err(e) => warn!("skipping {}: {}", path.display(), e),
            }
        }
        let result = self.postscan(false);
        self.flush_on_error(result)?;
        Ok(std::mem::take(&mut self.summary))
    }

    /// Scan a single file, returning its row identifier when persisted
    pub fn scan_one(&mut self, path: &Path, mime_hint: Option<&str>) -> Result<Option<i64>> {
        let path_str = path.to_string_lossy().into_owned();
        self.begin_session(Some(&path_str), true)?;
        let result = self.process_file(path, mime_hint, true).and_then(|id| {
            self.postscan(false)?;
            Ok(id)
        });
        let id = self.flush_on_error(result)?;
        if id.is_some() {
            return Ok(id);
        }
        // batched or deferred: the row is visible after postscan's flush
        self.lookup_row_id(&path_str)
    }

    /// Scan an object whose row was created by an external transport.
    ///
    /// Non-media objects only get their size and modification time
    /// refreshed; media objects are rescanned in full with their identity
    /// (row id) and format code preserved.
    pub fn scan_external_object(
        &mut self,
        path: &Path,
        object_id: i64,
        format: i64,
    ) -> Result<Option<i64>> {
        let path_str = path.to_string_lossy().into_owned();
        let classification = classify(&path_str, None);

        if !classification.content_type.is_media() {
            let stat = self.fs.stat(path)?;
            let mut fields = FieldMap::new();
            fields.insert("size", stat.size.into());
            fields.insert("date_modified", stat.modified_secs.into());
            fields.insert("format", format.into());
            self.store.update(Table::Files, object_id, &fields)?;
            return Ok(Some(object_id));
        }

        if classification.content_type.is_playlist() {
            // membership resolution needs the full audio catalog reconciled
            self.begin_session(None, true)?;
            let stat = self.fs.stat(path)?;
            let entry = CatalogEntry {
                row_id: object_id,
                path: path_str,
                last_modified: stat.modified_secs,
                format,
                dirty: true,
                classification,
                no_media: false,
                size: stat.size,
            };
            self.pending_playlists.push(entry);
            let result = self.postscan(false);
            self.flush_on_error(result)?;
            return Ok(Some(object_id));
        }

        self.begin_session(Some(&path_str), false)?;
        self.external_object = Some((object_id, format));
        let result = self.process_file(path, classification.mime.as_deref(), true);
        self.external_object = None;
        let result = result.and_then(|id| {
            self.postscan(false)?;
            Ok(id)
        });
        let id = self.flush_on_error(result)?;
        Ok(id.or(Some(object_id)))
    }

    fn traverse(&mut self, roots: &[PathBuf]) -> Result<()> {
        for root in roots {
            let mut walker = WalkDir::new(root).follow_links(false);
            if let Some(depth) = self.config.max_depth {
                walker = walker.max_depth(depth);
            }
            for entry in walker {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        warn!("traversal error under {}: {}", root.display(), e);
                        continue;
                    }
                };
                let file_type = entry.file_type();
                let outcome = if file_type.is_dir() {
                    self.process_directory(entry.path()).map(|_| ())
                } else if file_type.is_file() {
                    self.process_file(entry.path(), None, false).map(|_| ())
                } else {
                    Ok(())
                };
                match outcome {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!("skipping {}: {}", entry.path().display(), e),
                }
            }
        }
        Ok(())
    }

    /// Start a session: reset per-session state and run prescan
    fn begin_session(&mut self, filter: Option<&str>, check_files: bool) -> Result<()> {
        self.summary = ScanSummary::default();
        self.pending_playlists.clear();
        self.unhidden_dirs.clear();
        self.default_ringtone_set = self.flag_is_set(RINGTONE_FLAG)?;
        self.default_notification_set = self.flag_is_set(NOTIFICATION_FLAG)?;
        self.default_alarm_set = self.flag_is_set(ALARM_FLAG)?;
        self.prescan(filter, check_files)
    }

    fn flag_is_set(&self, key: &str) -> Result<bool> {
        Ok(matches!(self.settings.get(key)?.as_deref(), Some("1")))
    }

    /// Reconcile catalog existence against the filesystem.
    ///
    /// Snapshot counts are always taken. When `check_files` is set, rows are
    /// paged by ascending id and rows whose file is gone are batch-deleted,
    /// except container rows and playlists (playlists carry user edits and
    /// survive file deletion). A deleted `.nomedia` marker unhides its
    /// parent directory: the delete batch is flushed first so the marker row
    /// is gone before anything under the parent is rescanned.
    fn prescan(&mut self, filter: Option<&str>, check_files: bool) -> Result<()> {
        self.was_empty_prior_to_scan = self.store.count(Table::Files)? == 0;
        self.original_image_count = self.store.count(Table::Images)?;
        self.original_video_count = self.store.count(Table::Video)?;
        if !check_files {
            return Ok(());
        }

        let mut deleter = DeleteBatcher::new(self.config.delete_batch_size);
        let columns = ["_id", "path", "format"];
        if let Some(path) = filter {
            let rows = self.store.query(
                Table::Files,
                &columns,
                Some(self.path_predicate()),
                &[path.into()],
                None,
                None,
                false,
            )?;
            for row in rows {
                self.reconcile_row(&mut deleter, &row)?;
            }
        } else {
            let mut last_id = 0i64;
            loop {
                let rows = self.store.query(
                    Table::Files,
                    &columns,
                    Some("_id > ?"),
                    &[Value::Integer(last_id)],
                    Some("_id"),
                    Some(self.config.prescan_page_size),
                    false,
                )?;
                if rows.is_empty() {
                    break;
                }
                for row in &rows {
                    if let Some(id) = row[0].as_i64() {
                        last_id = id;
                    }
                    self.reconcile_row(&mut deleter, row)?;
                }
            }
        }
        deleter.flush(self.store.as_ref())?;
        Ok(())
    }

    fn reconcile_row(&mut self, deleter: &mut DeleteBatcher, row: &[Value]) -> Result<()> {
        let (Some(id), Some(path)) = (row[0].as_i64(), row[1].as_str()) else {
            return Ok(());
        };
        if !path.starts_with('/') {
            return Ok(());
        }
        if self.fs.exists(Path::new(path)) {
            return Ok(());
        }
        if row[2].as_i64() == Some(CONTAINER_FORMAT) {
            return Ok(());
        }
        if classify(path, None).content_type.is_playlist() {
            debug!("missing playlist kept: {}", path);
            return Ok(());
        }
        let path = path.to_string();
        deleter.delete(self.store.as_ref(), id)?;
        self.summary.deleted += 1;

        if path.to_ascii_lowercase().ends_with("/.nomedia") {
            deleter.flush(self.store.as_ref())?;
            if let Some(slash) = path.rfind('/') {
                let parent = &path[..slash];
                info!("unhiding {}", parent);
                self.cache.unhide(parent);
                self.unhidden_dirs.push(parent.to_string());
            }
        }
        Ok(())
    }

    fn path_predicate(&self) -> &'static str {
        if self.config.case_insensitive_paths {
            "path = ? COLLATE NOCASE"
        } else {
            "path = ?"
        }
    }

    fn lookup_row_id(&self, path: &str) -> Result<Option<i64>> {
        let rows = self.store.query(
            Table::Files,
            &["_id"],
            Some(self.path_predicate()),
            &[path.into()],
            None,
            Some(1),
            false,
        )?;
        Ok(rows.first().and_then(|r| r[0].as_i64()))
    }

    fn entry_for(&self, path: &str) -> Result<Option<(i64, i64, i64)>> {
        let rows = self.store.query(
            Table::Files,
            &["_id", "date_modified", "format"],
            Some(self.path_predicate()),
            &[path.into()],
            None,
            Some(1),
            false,
        )?;
        Ok(rows.first().map(|row| {
            (
                row[0].as_i64().unwrap_or(0),
                row[1].as_i64().unwrap_or(0),
                row[2].as_i64().unwrap_or(0),
            )
        }))
    }

    /// Open one file for processing.
    ///
    /// Resolves hidden state and content type, looks up or creates the
    /// catalog entry, and decides whether re-extraction is needed: an
    /// absolute modification-time delta within one second is treated as
    /// unchanged to absorb filesystem clock rounding. Playlists are
    /// deferred to postscan and yield `None`; every other file yields an
    /// entry. The metadata accumulator is reset for the returned entry.
    pub fn begin_file(
        &mut self,
        path: &str,
        declared_mime: Option<&str>,
        mtime: i64,
        size: i64,
        is_dir: bool,
        no_media_hint: bool,
    ) -> Result<Option<CatalogEntry>> {
        let classification = if is_dir {
            Classification {
                content_type: ContentType::Other,
                mime: None,
            }
        } else {
            classify(path, declared_mime)
        };

        let mut no_media = no_media_hint;
        if !no_media && !is_dir {
            no_media =
                is_hidden_filename(path) || self.cache.is_no_media_path(path, self.fs.as_ref());
        }

        let existing = self.entry_for(path)?;
        let (mut row_id, stored_mtime, mut format) = existing.unwrap_or((0, 0, 0));
        let unhidden = self
            .unhidden_dirs
            .iter()
            .any(|dir| path.starts_with(&format!("{}/", dir)));
        let mut dirty =
            existing.is_none() || (mtime - stored_mtime).abs() > MTIME_TOLERANCE_SECS || unhidden;

        if is_dir {
            format = CONTAINER_FORMAT;
        }
        if let Some((object_id, object_format)) = self.external_object {
            row_id = object_id;
            format = object_format;
            dirty = true;
        }

        let entry = CatalogEntry {
            row_id,
            path: path.to_string(),
            last_modified: mtime,
            format,
            dirty,
            classification,
            no_media,
            size,
        };

        if !is_dir
            && entry.classification.content_type.is_playlist()
            && self.config.process_playlists
        {
            self.pending_playlists.push(entry);
            return Ok(None);
        }

        self.meta.clear();
        self.meta.base_mime = entry.classification.mime.clone();
        Ok(Some(entry))
    }

    /// Close one file after tag extraction: build the record and write it.
    ///
    /// New entries are queued through the batcher (directories with
    /// priority), so the returned id is `None` until a flush unless a
    /// default-sound assignment forces an immediate insert. Updates never
    /// rewrite the path and recompute the media type from the final MIME
    /// type unless the entry is hidden.
    pub fn end_file(&mut self, entry: &CatalogEntry) -> Result<Option<i64>> {
        let info = FileInfo {
            path: &entry.path,
            size: entry.size,
            last_modified: entry.last_modified,
        };
        let mut fields = build_record(info, &entry.classification, &self.meta, entry.no_media);
        if entry.format != 0 {
            fields.insert("format", entry.format.into());
        }
        let table = if entry.no_media {
            Table::Files
        } else {
            Table::for_content_type(entry.classification.content_type)
        };

        if entry.row_id == 0 {
            if table == Table::Audio {
                AudioCategoryFlags::from_path(&entry.path).apply(&mut fields);
            }
            if entry.format == CONTAINER_FORMAT {
                self.batcher
                    .insert_priority(self.store.as_ref(), table, fields)?;
                self.summary.inserted += 1;
                return Ok(None);
            }
            if table == Table::Audio && !entry.no_media {
                if let Some(category) = self.cascade_candidate(&entry.path)? {
                    // the setting stores a row id, so this insert cannot wait
                    // in the batch queue
                    self.batcher.flush_table(self.store.as_ref(), table)?;
                    let row_id = self.store.insert(table, &fields)?;
                    self.assign_default_sound(category, row_id)?;
                    self.summary.inserted += 1;
                    return Ok(Some(row_id));
                }
            }
            self.batcher.insert(self.store.as_ref(), table, fields)?;
            self.summary.inserted += 1;
            Ok(None)
        } else {
            // never rewrite the stored path: it may carry casing the
            // traversal lost
            fields.remove("path");
            // an externally-managed object is a re-import, not an edit, so
            // it gets the category flags a fresh insert would; plain updates
            // leave user reassignments alone
            let reimport = self.external_object.is_some();
            if reimport && table == Table::Audio {
                AudioCategoryFlags::from_path(&entry.path).apply(&mut fields);
            }
            if !entry.no_media {
                let media_type = self
                    .meta
                    .effective_mime()
                    .or(entry.classification.mime.as_deref())
                    .map(classify_mime)
                    .unwrap_or(ContentType::Other);
                fields.insert("media_type", media_type.media_type_code().into());
            }
            self.store.update(Table::Files, entry.row_id, &fields)?;
            self.summary.updated += 1;
            if reimport && table == Table::Audio && !entry.no_media {
                if let Some(category) = self.cascade_candidate(&entry.path)? {
                    self.assign_default_sound(category, entry.row_id)?;
                }
            }
            Ok(Some(entry.row_id))
        }
    }

    fn process_directory(&mut self, path: &Path) -> Result<Option<i64>> {
        let path_str = path.to_string_lossy().into_owned();
        let stat = self.fs.stat(path)?;
        let Some(entry) =
            self.begin_file(&path_str, None, stat.modified_secs, 0, true, false)?
        else {
            return Ok(None);
        };
        if entry.row_id != 0 {
            return Ok(Some(entry.row_id));
        }
        self.end_file(&entry)
    }

    fn process_file(
        &mut self,
        path: &Path,
        declared_mime: Option<&str>,
        scan_always: bool,
    ) -> Result<Option<i64>> {
        let path_str = path.to_string_lossy().into_owned();
        let stat = match self.fs.stat(path) {
            Ok(stat) => stat,
            Err(e) if e.kind == ScanErrorKind::NotFound => {
                // disappeared between traversal and processing; the next
                // prescan reconciles it
                debug!("vanished before processing: {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        self.summary.files_seen += 1;

        let Some(mut entry) = self.begin_file(
            &path_str,
            declared_mime,
            stat.modified_secs,
            stat.size,
            false,
            false,
        )?
        else {
            return Ok(None);
        };
        if scan_always {
            entry.dirty = true;
        }
        if !entry.dirty {
            self.summary.skipped += 1;
            return Ok(Some(entry.row_id));
        }

        let wants_tags = matches!(
            entry.classification.content_type,
            ContentType::Audio | ContentType::Video | ContentType::Image
        );
        if wants_tags && !entry.no_media {
            let mut meta = std::mem::take(&mut self.meta);
            let decode_genres = self.config.process_genres;
            if let Err(e) = self
                .extractor
                .extract(path, &mut |name, value| meta.handle(name, value, decode_genres))
            {
                // existence and size/mtime bookkeeping still proceed
                warn!("extraction failed for {}: {}", path.display(), e);
            }
            self.meta = meta;
        }
        self.end_file(&entry)
    }

    /// First category in notification → ringtone → alarm order whose
    /// directory flag applies and whose persisted flag is still unset; the
    /// file must match the configured default filename (when one is
    /// configured), and either the catalog was empty before this scan or
    /// the setting value itself is still unset.
    fn cascade_candidate(&self, path: &str) -> Result<Option<SoundCategory>> {
        let flags = AudioCategoryFlags::from_path(path);
        let candidates = [
            (
                flags.notification,
                self.default_notification_set,
                &self.config.default_notification_filename,
                SoundCategory::Notification,
            ),
            (
                flags.ringtone,
                self.default_ringtone_set,
                &self.config.default_ringtone_filename,
                SoundCategory::Ringtone,
            ),
            (
                flags.alarm,
                self.default_alarm_set,
                &self.config.default_alarm_filename,
                SoundCategory::Alarm,
            ),
        ];
        for (in_dir, already_set, default_filename, category) in candidates {
            if !in_dir || already_set {
                continue;
            }
            // only the first live category is ever attempted for a file
            let filename_ok = match default_filename {
                Some(filename) => file_name(path) == filename,
                None => true,
            };
            if !filename_ok {
                return Ok(None);
            }
            let (value_key, _) = category.keys();
            let value_unset = self
                .settings
                .get(value_key)?
                .map_or(true, |v| v.is_empty());
            if self.was_empty_prior_to_scan || value_unset {
                return Ok(Some(category));
            }
            return Ok(None);
        }
        Ok(None)
    }

    /// Assign a default sound exactly once per category: the value is only
    /// written while unset, the persisted flag is recorded regardless.
    fn assign_default_sound(&mut self, category: SoundCategory, row_id: i64) -> Result<()> {
        let (value_key, flag_key) = category.keys();
        let current = self.settings.get(value_key)?;
        if current.map_or(true, |v| v.is_empty()) {
            self.settings.set(value_key, &row_id.to_string())?;
            info!("default {} assigned to row {}", value_key, row_id);
        }
        self.settings.set(flag_key, "1")?;
        match category {
            SoundCategory::Notification => self.default_notification_set = true,
            SoundCategory::Ringtone => self.default_ringtone_set = true,
            SoundCategory::Alarm => self.default_alarm_set = true,
        }
        Ok(())
    }

    /// Close a session: flush everything, resolve deferred playlists, and
    /// prune thumbnails when the catalog looked freshly wiped at prescan.
    fn postscan(&mut self, prune_thumbnails: bool) -> Result<()> {
        self.batcher.flush_all(self.store.as_ref())?;

        if self.config.process_playlists {
            let pending = std::mem::take(&mut self.pending_playlists);
            for entry in pending {
                match self.process_playlist(&entry) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!("playlist {} failed: {}", entry.path, e),
                }
            }
        } else {
            self.pending_playlists.clear();
        }

        if prune_thumbnails
            && (self.original_image_count == 0 || self.original_video_count == 0)
        {
            self.summary.thumbnails_pruned = prune_dead_thumbnails(
                self.store.as_ref(),
                self.lister.as_ref(),
                &self.config.thumbnail_dir,
                &self.config.thumbnail_index_prefix,
            )?;
        }

        self.batcher.flush_all(self.store.as_ref())
    }

    /// Write the playlist's own catalog row, then rewrite its membership.
    /// Unchanged playlists are left alone entirely.
    fn process_playlist(&mut self, entry: &CatalogEntry) -> Result<()> {
        if !entry.dirty {
            self.summary.skipped += 1;
            return Ok(());
        }
        let mut fields = FieldMap::new();
        fields.insert("path", entry.path.as_str().into());
        fields.insert("name", file_name(&entry.path).into());
        fields.insert("title", file_title(&entry.path).into());
        fields.insert("mime_type", entry.classification.mime.clone().into());
        fields.insert("date_modified", entry.last_modified.into());
        fields.insert("size", entry.size.into());
        if entry.format != 0 {
            fields.insert("format", entry.format.into());
        }
        let row_id = if entry.row_id == 0 {
            self.summary.inserted += 1;
            self.store.insert(Table::Playlists, &fields)?
        } else {
            fields.remove("path");
            self.store.update(Table::Playlists, entry.row_id, &fields)?;
            self.summary.updated += 1;
            entry.row_id
        };

        let Some(kind) = playlist_kind(&entry.path) else {
            return Ok(());
        };
        let matched = process_playlist_file(
            self.store.as_ref(),
            Path::new(&entry.path),
            kind,
            row_id,
            self.config.case_insensitive_paths,
        )?;
        debug!("{}: {} entries resolved", entry.path, matched);
        self.summary.playlists_resolved += 1;
        Ok(())
    }
}
