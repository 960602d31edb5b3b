//! Catalog store capability and its SQLite implementation
//!
//! The engine talks to the catalog through the [`Store`] trait: generic
//! query/insert/update/delete over logical tables with simple `?`-placeholder
//! predicates. [`SqliteStore`] backs it with a single wide `files` table;
//! the audio/video/images/playlists logical tables are views onto it that
//! stamp and filter the `media_type` column, the way per-category inserts
//! all land in one provider table.

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use crate::classify::ContentType;
use crate::error::Result;

/// A single dynamically-typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Integer(v) => ToSqlOutput::from(*v),
            Value::Real(v) => ToSqlOutput::from(*v),
            Value::Text(v) => ToSqlOutput::from(v.as_str()),
        })
    }
}

/// Ordered column-name → value map for one pending row
pub type FieldMap = BTreeMap<&'static str, Value>;

/// Logical destination tables the engine writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// All tracked files regardless of category
    Files,
    Audio,
    Video,
    Images,
    Playlists,
    /// (playlist_id, play_order, audio_id) membership rows
    PlaylistMembers,
    /// Derived image thumbnails
    Thumbnails,
    /// Derived video thumbnails
    VideoThumbnails,
}

impl Table {
    /// Physical SQLite table backing this logical table
    pub fn physical(&self) -> &'static str {
        match self {
            Table::Files | Table::Audio | Table::Video | Table::Images | Table::Playlists => {
                "files"
            }
            Table::PlaylistMembers => "playlist_members",
            Table::Thumbnails => "thumbnails",
            Table::VideoThumbnails => "video_thumbnails",
        }
    }

    /// media_type code stamped/filtered for category tables
    pub fn media_type(&self) -> Option<i64> {
        match self {
            Table::Audio => Some(ContentType::Audio.media_type_code()),
            Table::Video => Some(ContentType::Video.media_type_code()),
            Table::Images => Some(ContentType::Image.media_type_code()),
            Table::Playlists => Some(ContentType::Playlist.media_type_code()),
            _ => None,
        }
    }

    /// Destination table for a content category
    pub fn for_content_type(content_type: ContentType) -> Table {
        match content_type {
            ContentType::Audio => Table::Audio,
            ContentType::Video => Table::Video,
            ContentType::Image => Table::Images,
            ContentType::Playlist => Table::Playlists,
            ContentType::Other => Table::Files,
        }
    }
}

/// Catalog store capability.
///
/// Predicates are SQL fragments with `?` placeholders bound from `args`.
/// `notify` is advisory: lookups that must not trigger observer callbacks
/// pass false. The SQLite store has no observers and ignores it.
pub trait Store {
    #[allow(clippy::too_many_arguments)]
    fn query(
        &self,
        table: Table,
        columns: &[&str],
        predicate: Option<&str>,
        args: &[Value],
        order_by: Option<&str>,
        limit: Option<usize>,
        notify: bool,
    ) -> Result<Vec<Vec<Value>>>;

    /// Insert one row, returning its identifier
    fn insert(&self, table: Table, fields: &FieldMap) -> Result<i64>;

    /// Update the row with the given identifier
    fn update(&self, table: Table, id: i64, fields: &FieldMap) -> Result<()>;

    /// Delete rows matching the predicate, returning the count removed
    fn delete(&self, table: Table, predicate: Option<&str>, args: &[Value]) -> Result<usize>;

    /// Count rows in a logical table
    fn count(&self, table: Table) -> Result<i64>;
}

/// Settings capability for default-sound values and assignment flags
pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// SQLite-backed catalog store
pub struct SqliteStore {
    conn: Rc<Connection>,
}

impl SqliteStore {
    /// Open or create the catalog database
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Rc::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory catalog (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Rc::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Settings handle sharing this store's connection
    pub fn settings(&self) -> SqliteSettings {
        SqliteSettings {
            conn: Rc::clone(&self.conn),
        }
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS files (
                _id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT UNIQUE,
                name TEXT,
                title TEXT,
                mime_type TEXT,
                format INTEGER NOT NULL DEFAULT 0,
                media_type INTEGER NOT NULL DEFAULT 0,
                date_modified INTEGER,
                size INTEGER,
                is_drm INTEGER NOT NULL DEFAULT 0,
                artist TEXT,
                album_artist TEXT,
                album TEXT,
                composer TEXT,
                genre TEXT,
                writer TEXT,
                track INTEGER,
                year INTEGER,
                duration INTEGER,
                compilation INTEGER,
                width INTEGER,
                height INTEGER,
                resolution TEXT,
                is_ringtone INTEGER,
                is_notification INTEGER,
                is_alarm INTEGER,
                is_music INTEGER,
                is_podcast INTEGER,
                latitude REAL,
                longitude REAL,
                date_taken INTEGER,
                orientation INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_files_path ON files(path);
            CREATE INDEX IF NOT EXISTS idx_files_media_type ON files(media_type);

            CREATE TABLE IF NOT EXISTS playlist_members (
                playlist_id INTEGER NOT NULL,
                play_order INTEGER NOT NULL,
                audio_id INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_members_playlist
                ON playlist_members(playlist_id);

            CREATE TABLE IF NOT EXISTS thumbnails (
                _id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                image_id INTEGER
            );
            CREATE TABLE IF NOT EXISTS video_thumbnails (
                _id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                video_id INTEGER
            );

            CREATE TABLE IF NOT EXISTS settings (
                name TEXT PRIMARY KEY,
                value TEXT
            );
            ",
        )?;
        Ok(())
    }

    /// Combine a caller predicate with the logical table's media_type filter
    fn effective_predicate(table: Table, predicate: Option<&str>) -> Option<String> {
        match (table.media_type(), predicate) {
            (Some(code), Some(pred)) => Some(format!("({}) AND media_type = {}", pred, code)),
            (Some(code), None) => Some(format!("media_type = {}", code)),
            (None, Some(pred)) => Some(pred.to_string()),
            (None, None) => None,
        }
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

impl Store for SqliteStore {
    fn query(
        &self,
        table: Table,
        columns: &[&str],
        predicate: Option<&str>,
        args: &[Value],
        order_by: Option<&str>,
        limit: Option<usize>,
        _notify: bool,
    ) -> Result<Vec<Vec<Value>>> {
        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), table.physical());
        if let Some(pred) = Self::effective_predicate(table, predicate) {
            sql.push_str(" WHERE ");
            sql.push_str(&pred);
        }
        if let Some(order) = order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let count = columns.len();
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                out.push(value_from_ref(row.get_ref(i)?));
            }
            Ok(out)
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn insert(&self, table: Table, fields: &FieldMap) -> Result<i64> {
        let mut fields = fields.clone();
        if let Some(code) = table.media_type() {
            fields.entry("media_type").or_insert(Value::Integer(code));
        }

        let columns: Vec<&str> = fields.keys().copied().collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.physical(),
            columns.join(", "),
            placeholders
        );
        self.conn
            .execute(&sql, params_from_iter(fields.values()))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update(&self, table: Table, id: i64, fields: &FieldMap) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let assignments: Vec<String> = fields.keys().map(|k| format!("{} = ?", k)).collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE _id = ?",
            table.physical(),
            assignments.join(", ")
        );
        let id_value = Value::Integer(id);
        self.conn.execute(
            &sql,
            params_from_iter(fields.values().chain(std::iter::once(&id_value))),
        )?;
        Ok(())
    }

    fn delete(&self, table: Table, predicate: Option<&str>, args: &[Value]) -> Result<usize> {
        let mut sql = format!("DELETE FROM {}", table.physical());
        if let Some(pred) = Self::effective_predicate(table, predicate) {
            sql.push_str(" WHERE ");
            sql.push_str(&pred);
        }
        let count = self.conn.execute(&sql, params_from_iter(args.iter()))?;
        Ok(count)
    }

    fn count(&self, table: Table) -> Result<i64> {
        let mut sql = format!("SELECT COUNT(*) FROM {}", table.physical());
        if let Some(pred) = Self::effective_predicate(table, None) {
            sql.push_str(" WHERE ");
            sql.push_str(&pred);
        }
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Settings stored in the catalog database
pub struct SqliteSettings {
    conn: Rc<Connection>,
}

impl SettingsStore for SqliteSettings {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM settings WHERE name = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (name, value) VALUES (?1, ?2)",
            [key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio_row(path: &str) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("path", path.into());
        fields.insert("title", "t".into());
        fields
    }

    #[test]
    fn test_insert_stamps_media_type() {
        let store = SqliteStore::open_memory().unwrap();
        let id = store.insert(Table::Audio, &audio_row("/music/a.mp3")).unwrap();
        assert!(id > 0);

        let rows = store
            .query(
                Table::Files,
                &["media_type"],
                Some("_id = ?"),
                &[Value::Integer(id)],
                None,
                None,
                true,
            )
            .unwrap();
        assert_eq!(rows[0][0].as_i64(), Some(2));
    }

    #[test]
    fn test_logical_table_filtering() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert(Table::Audio, &audio_row("/music/a.mp3")).unwrap();
        store.insert(Table::Images, &audio_row("/pics/a.jpg")).unwrap();

        assert_eq!(store.count(Table::Audio).unwrap(), 1);
        assert_eq!(store.count(Table::Images).unwrap(), 1);
        assert_eq!(store.count(Table::Files).unwrap(), 2);

        let audio = store
            .query(Table::Audio, &["path"], None, &[], None, None, true)
            .unwrap();
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0][0].as_str(), Some("/music/a.mp3"));
    }

    #[test]
    fn test_update_and_delete() {
        let store = SqliteStore::open_memory().unwrap();
        let id = store.insert(Table::Audio, &audio_row("/music/a.mp3")).unwrap();

        let mut fields = FieldMap::new();
        fields.insert("title", "new title".into());
        store.update(Table::Audio, id, &fields).unwrap();

        let rows = store
            .query(
                Table::Audio,
                &["title"],
                Some("_id = ?"),
                &[Value::Integer(id)],
                None,
                None,
                false,
            )
            .unwrap();
        assert_eq!(rows[0][0].as_str(), Some("new title"));

        let deleted = store
            .delete(Table::Files, Some("_id = ?"), &[Value::Integer(id)])
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count(Table::Files).unwrap(), 0);
    }

    #[test]
    fn test_paged_query_with_limit_and_order() {
        let store = SqliteStore::open_memory().unwrap();
        for i in 0..5 {
            store
                .insert(Table::Files, &audio_row(&format!("/f/{}.bin", i)))
                .unwrap();
        }
        let rows = store
            .query(
                Table::Files,
                &["_id"],
                Some("_id > ?"),
                &[Value::Integer(2)],
                Some("_id"),
                Some(2),
                true,
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0].as_i64(), Some(3));
        assert_eq!(rows[1][0].as_i64(), Some(4));
    }

    #[test]
    fn test_settings_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let settings = store.settings();
        assert_eq!(settings.get("ringtone").unwrap(), None);
        settings.set("ringtone", "17").unwrap();
        assert_eq!(settings.get("ringtone").unwrap().as_deref(), Some("17"));
        settings.set("ringtone", "18").unwrap();
        assert_eq!(settings.get("ringtone").unwrap().as_deref(), Some("18"));
    }
}
