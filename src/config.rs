//! Configuration for scan sessions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default page size for paged prescan catalog queries
pub const DEFAULT_PRESCAN_PAGE_SIZE: usize = 1000;

/// Default batch size for catalog row deletions during prescan
pub const DEFAULT_DELETE_BATCH_SIZE: usize = 100;

/// Default number of queued rows per table before the write batcher flushes
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 500;

/// Modification-time deltas with absolute value at or below this tolerance
/// (seconds) are treated as unchanged, to absorb clock rounding.
pub const MTIME_TOLERANCE_SECS: i64 = 1;

/// Prefix of the derived-index file family kept next to thumbnail files
pub const DEFAULT_THUMBNAIL_INDEX_PREFIX: &str = ".thumbdata";

/// Configuration for a scan session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Volume identifier the catalog rows belong to
    pub volume: String,

    /// Whether playlist files are parsed and resolved during postscan
    pub process_playlists: bool,

    /// Whether genre tags are decoded and stored
    pub process_genres: bool,

    /// Whether path comparisons are case insensitive
    /// (set when scanning a case-insensitive filesystem)
    pub case_insensitive_paths: bool,

    /// Page size for the paged prescan query
    pub prescan_page_size: usize,

    /// Batch size for prescan deletions
    pub delete_batch_size: usize,

    /// Queued rows per table before the write batcher flushes
    pub insert_batch_size: usize,

    /// Maximum traversal depth, None for unlimited
    pub max_depth: Option<usize>,

    /// Filename of the platform default ringtone, if configured
    pub default_ringtone_filename: Option<String>,

    /// Filename of the platform default notification sound, if configured
    pub default_notification_filename: Option<String>,

    /// Filename of the platform default alarm sound, if configured
    pub default_alarm_filename: Option<String>,

    /// Directory holding derived thumbnail files
    pub thumbnail_dir: PathBuf,

    /// Filename prefix of the derived-index file family
    pub thumbnail_index_prefix: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            volume: "external".to_string(),
            process_playlists: true,
            process_genres: true,
            case_insensitive_paths: true,
            prescan_page_size: DEFAULT_PRESCAN_PAGE_SIZE,
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            max_depth: None,
            default_ringtone_filename: None,
            default_notification_filename: None,
            default_alarm_filename: None,
            thumbnail_dir: PathBuf::from(".thumbnails"),
            thumbnail_index_prefix: DEFAULT_THUMBNAIL_INDEX_PREFIX.to_string(),
        }
    }
}

impl ScanConfig {
    /// Create a config for the given volume.
    ///
    /// Playlists and genres are only processed on external volumes, which
    /// are also the volumes mounted case-insensitively.
    pub fn for_volume(volume: impl Into<String>) -> Self {
        let volume = volume.into();
        let external = volume != "internal";
        Self {
            process_playlists: external,
            process_genres: external,
            case_insensitive_paths: external,
            volume,
            ..Default::default()
        }
    }

    /// Create a config builder
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::new()
    }
}

/// Builder for ScanConfig
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the volume identifier
    pub fn volume(mut self, volume: impl Into<String>) -> Self {
        self.config = ScanConfig {
            thumbnail_dir: self.config.thumbnail_dir,
            thumbnail_index_prefix: self.config.thumbnail_index_prefix,
            ..ScanConfig::for_volume(volume)
        };
        self
    }

    /// Enable or disable playlist processing
    pub fn process_playlists(mut self, enabled: bool) -> Self {
        self.config.process_playlists = enabled;
        self
    }

    /// Enable or disable genre decoding
    pub fn process_genres(mut self, enabled: bool) -> Self {
        self.config.process_genres = enabled;
        self
    }

    /// Set case sensitivity of path comparisons
    pub fn case_insensitive_paths(mut self, enabled: bool) -> Self {
        self.config.case_insensitive_paths = enabled;
        self
    }

    /// Set the prescan page size
    pub fn prescan_page_size(mut self, size: usize) -> Self {
        self.config.prescan_page_size = size;
        self
    }

    /// Set the insert batch size
    pub fn insert_batch_size(mut self, size: usize) -> Self {
        self.config.insert_batch_size = size;
        self
    }

    /// Set the maximum traversal depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = Some(depth);
        self
    }

    /// Set the default ringtone filename
    pub fn default_ringtone(mut self, filename: impl Into<String>) -> Self {
        self.config.default_ringtone_filename = Some(filename.into());
        self
    }

    /// Set the default notification sound filename
    pub fn default_notification(mut self, filename: impl Into<String>) -> Self {
        self.config.default_notification_filename = Some(filename.into());
        self
    }

    /// Set the default alarm sound filename
    pub fn default_alarm(mut self, filename: impl Into<String>) -> Self {
        self.config.default_alarm_filename = Some(filename.into());
        self
    }

    /// Set the thumbnail directory
    pub fn thumbnail_dir(mut self, dir: PathBuf) -> Self {
        self.config.thumbnail_dir = dir;
        self
    }

    /// Build the config
    pub fn build(self) -> ScanConfig {
        self.config
    }
}
