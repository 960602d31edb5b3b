//! Media catalog synchronization engine
//!
//! Reconciles a filesystem tree of media files with a persisted catalog:
//! prescan removes rows for deleted files, the scan phase classifies and
//! extracts metadata for changed files, and postscan resolves playlists and
//! prunes orphaned thumbnails.

pub mod batch;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod playlist;
pub mod record;
pub mod store;
pub mod tags;
pub mod thumbs;

pub use classify::{classify, Classification, ContentType, PlaylistKind};
pub use config::{ScanConfig, ScanConfigBuilder};
pub use engine::{
    CatalogEntry, FileAttributes, FileStat, FsAttributes, NoMediaCache, ScanEngine, ScanSummary,
};
pub use error::{Result, ScanError, ScanErrorKind};
pub use extract::{LoftyExtractor, MetadataExtractor};
pub use playlist::PlaylistResolver;
pub use store::{FieldMap, SettingsStore, SqliteStore, Store, Table, Value};
pub use tags::ExtractedMetadata;
pub use thumbs::{FsThumbnailLister, ThumbnailLister};
