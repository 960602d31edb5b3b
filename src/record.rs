//! Catalog record assembly
//!
//! Turns one scanned file's classification, filesystem attributes, and
//! normalized metadata into the field map written to the catalog. Category
//! determines which fields are populated; hidden entries keep only the
//! common file fields.

use crate::classify::{is_jpeg_family, Classification, ContentType};
use crate::store::{FieldMap, Value};
use crate::tags::ExtractedMetadata;

/// Placeholder stored when an audio or video file carries no artist/album
pub const UNKNOWN_STRING: &str = "<unknown>";

/// Directory names that categorize audio files, matched anywhere in the
/// lowercased path.
const RINGTONES_DIR: &str = "/ringtones/";
const NOTIFICATIONS_DIR: &str = "/notifications/";
const ALARMS_DIR: &str = "/alarms/";
const MUSIC_DIR: &str = "/music/";
const PODCASTS_DIR: &str = "/podcasts/";

/// Filesystem attributes of one scanned file
#[derive(Debug, Clone, Copy)]
pub struct FileInfo<'a> {
    pub path: &'a str,
    pub size: i64,
    pub last_modified: i64,
}

/// Derive a display title from a path: final segment, extension stripped
pub fn file_title(path: &str) -> String {
    let name = file_name(path);
    match name.rfind('.') {
        Some(dot) if dot > 0 => name[..dot].to_string(),
        _ => name.to_string(),
    }
}

/// Final path segment
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Audio category flags derived from the directory a file lives in.
///
/// These are only stamped when a row is first inserted (or re-imported after
/// being hidden); updates leave any user reassignment alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioCategoryFlags {
    pub ringtone: bool,
    pub notification: bool,
    pub alarm: bool,
    pub music: bool,
    pub podcast: bool,
}

impl AudioCategoryFlags {
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_ascii_lowercase();
        let ringtone = lower.contains(RINGTONES_DIR);
        let notification = lower.contains(NOTIFICATIONS_DIR);
        let alarm = lower.contains(ALARMS_DIR);
        let podcast = lower.contains(PODCASTS_DIR);
        // anything not in a special directory counts as music
        let music = lower.contains(MUSIC_DIR)
            || (!ringtone && !notification && !alarm && !podcast);
        Self {
            ringtone,
            notification,
            alarm,
            music,
            podcast,
        }
    }

    /// Stamp the flags into a pending row
    pub fn apply(&self, fields: &mut FieldMap) {
        fields.insert("is_ringtone", self.ringtone.into());
        fields.insert("is_notification", self.notification.into());
        fields.insert("is_alarm", self.alarm.into());
        fields.insert("is_music", self.music.into());
        fields.insert("is_podcast", self.podcast.into());
    }
}

/// Assemble the catalog row for one scanned file.
///
/// Common fields are always present. Category fields are added only when the
/// entry is not hidden: audio rows get artist/album/composer/genre/track,
/// video rows get artist/album/duration/resolution, JPEG-family images get
/// location, capture time, and orientation.
pub fn build_record(
    info: FileInfo<'_>,
    classification: &Classification,
    meta: &ExtractedMetadata,
    no_media: bool,
) -> FieldMap {
    let mut fields = FieldMap::new();

    let mime = meta
        .effective_mime()
        .map(str::to_string)
        .or_else(|| classification.mime.clone());

    fields.insert("path", info.path.into());
    fields.insert("name", file_name(info.path).into());
    let title = match &meta.title {
        Some(t) if !t.is_empty() => t.clone(),
        _ => file_title(info.path),
    };
    fields.insert("title", title.into());
    fields.insert("date_modified", info.last_modified.into());
    fields.insert("size", info.size.into());
    fields.insert("mime_type", mime.into());
    fields.insert("is_drm", meta.is_drm.into());

    let mut resolution = None;
    if meta.width > 0 && meta.height > 0 {
        fields.insert("width", meta.width.into());
        fields.insert("height", meta.height.into());
        resolution = Some(format!("{}x{}", meta.width, meta.height));
    }

    if no_media {
        return fields;
    }

    // a blank artist falls back to the album artist before the sentinel
    let artist = match (&meta.artist, &meta.album_artist) {
        (Some(a), _) if !a.is_empty() => a.clone(),
        (_, Some(a)) if !a.is_empty() => a.clone(),
        _ => UNKNOWN_STRING.to_string(),
    };

    match classification.content_type {
        ContentType::Video => {
            fields.insert("artist", artist.into());
            fields.insert("album", or_unknown(&meta.album).into());
            fields.insert("duration", meta.duration_ms.into());
            if let Some(res) = resolution {
                fields.insert("resolution", res.into());
            }
            if meta.date_ms > 0 {
                fields.insert("date_taken", meta.date_ms.into());
            }
        }
        ContentType::Audio => {
            fields.insert("artist", artist.into());
            fields.insert(
                "album_artist",
                match &meta.album_artist {
                    Some(a) if !a.is_empty() => Value::Text(a.clone()),
                    _ => Value::Null,
                },
            );
            let mut album = or_unknown(&meta.album);
            if album == UNKNOWN_STRING {
                if let Some(derived) = directory_album(info.path) {
                    album = derived;
                }
            }
            fields.insert("album", album.into());
            fields.insert("composer", meta.composer.clone().into());
            fields.insert("writer", meta.writer.clone().into());
            fields.insert("genre", meta.genre.clone().into());
            if meta.year != 0 {
                fields.insert("year", meta.year.into());
            }
            fields.insert("track", meta.track.into());
            fields.insert("duration", meta.duration_ms.into());
            fields.insert("compilation", meta.compilation.into());
        }
        ContentType::Image => {
            let jpeg = mime_is_jpeg_family(classification, meta);
            if jpeg {
                if let (Some(lat), Some(lon)) = (meta.latitude, meta.longitude) {
                    fields.insert("latitude", lat.into());
                    fields.insert("longitude", lon.into());
                }
                if let Some(taken) = capture_time(meta, info.last_modified) {
                    fields.insert("date_taken", taken.into());
                }
                fields.insert("orientation", meta.orientation.into());
            }
        }
        ContentType::Playlist | ContentType::Other => {}
    }

    fields
}

/// Millisecond delta below which an embedded local timestamp is distrusted
/// in favor of the filesystem mtime.
const LOCAL_TIME_SLOP_MS: i64 = 24 * 60 * 60 * 1000;

/// Capture-time policy: a GPS-derived UTC timestamp always wins; a local
/// embedded timestamp is used only when it disagrees with the filesystem
/// mtime by at least a day, since local-time tags carry no zone.
fn capture_time(meta: &ExtractedMetadata, last_modified: i64) -> Option<i64> {
    if meta.gps_time_ms > 0 {
        return Some(meta.gps_time_ms);
    }
    if meta.exif_time_ms > 0
        && (last_modified * 1000 - meta.exif_time_ms).abs() >= LOCAL_TIME_SLOP_MS
    {
        return Some(meta.exif_time_ms);
    }
    None
}

/// Album derived from the directory containing the file: the path segment
/// just before the filename, skipped for files directly under the root.
fn directory_album(path: &str) -> Option<String> {
    let last = path.rfind('/')?;
    let mut previous = 0usize;
    loop {
        let idx = match path[previous + 1..].find('/') {
            Some(i) => previous + 1 + i,
            None => break,
        };
        if idx >= last {
            break;
        }
        previous = idx;
    }
    if previous != 0 && previous + 1 < last {
        Some(path[previous + 1..last].to_string())
    } else {
        None
    }
}

fn mime_is_jpeg_family(classification: &Classification, meta: &ExtractedMetadata) -> bool {
    meta.effective_mime()
        .or(classification.mime.as_deref())
        .map(is_jpeg_family)
        .unwrap_or(false)
}

fn or_unknown(value: &Option<String>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.clone(),
        _ => UNKNOWN_STRING.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;

    fn info(path: &str) -> FileInfo<'_> {
        FileInfo {
            path,
            size: 1024,
            last_modified: 1_700_000_000,
        }
    }

    #[test]
    fn test_file_title() {
        assert_eq!(file_title("/music/My Song.mp3"), "My Song");
        assert_eq!(file_title("/music/noext"), "noext");
        assert_eq!(file_title("/music/.hidden"), ".hidden");
    }

    #[test]
    fn test_audio_record_unknown_fallbacks() {
        let c = classify("/music/track.mp3", None);
        let meta = ExtractedMetadata::default();
        let fields = build_record(info("/music/track.mp3"), &c, &meta, false);

        assert_eq!(fields["title"].as_str(), Some("track"));
        assert_eq!(fields["artist"].as_str(), Some(UNKNOWN_STRING));
        assert_eq!(fields["album"].as_str(), Some(UNKNOWN_STRING));
        assert!(fields["album_artist"].is_null());
        assert!(!fields.contains_key("year"));
        assert_eq!(fields["track"].as_i64(), Some(0));
    }

    #[test]
    fn test_audio_record_with_tags() {
        let c = classify("/music/track.flac", None);
        let mut meta = ExtractedMetadata::default();
        meta.handle("title", "Blue in Green", true);
        meta.handle("artist", "Miles Davis", true);
        meta.handle("album", "Kind of Blue", true);
        meta.handle("tracknumber", "3", true);
        meta.handle("discnumber", "1", true);
        meta.handle("year", "1959", true);
        let fields = build_record(info("/music/track.flac"), &c, &meta, false);

        assert_eq!(fields["title"].as_str(), Some("Blue in Green"));
        assert_eq!(fields["track"].as_i64(), Some(1003));
        assert_eq!(fields["year"].as_i64(), Some(1959));
        assert_eq!(fields["mime_type"].as_str(), Some("audio/flac"));
    }

    #[test]
    fn test_video_record_resolution() {
        let c = classify("/video/clip.mkv", None);
        let mut meta = ExtractedMetadata::default();
        meta.handle("width", "1920", true);
        meta.handle("height", "1080", true);
        meta.handle("duration", "90000", true);
        let fields = build_record(info("/video/clip.mkv"), &c, &meta, false);

        assert_eq!(fields["resolution"].as_str(), Some("1920x1080"));
        assert_eq!(fields["duration"].as_i64(), Some(90000));
        assert_eq!(fields["artist"].as_str(), Some(UNKNOWN_STRING));
    }

    #[test]
    fn test_jpeg_gets_location_and_orientation() {
        let c = classify("/pics/photo.jpg", None);
        let mut meta = ExtractedMetadata::default();
        meta.handle("latitude", "52.5", true);
        meta.handle("longitude", "13.4", true);
        meta.handle("orientation", "90", true);
        let fields = build_record(info("/pics/photo.jpg"), &c, &meta, false);

        assert_eq!(fields["latitude"].as_f64(), Some(52.5));
        assert_eq!(fields["orientation"].as_i64(), Some(90));
    }

    #[test]
    fn test_png_skips_exif_fields() {
        let c = classify("/pics/shot.png", None);
        let mut meta = ExtractedMetadata::default();
        meta.handle("latitude", "52.5", true);
        meta.handle("longitude", "13.4", true);
        let fields = build_record(info("/pics/shot.png"), &c, &meta, false);

        assert!(!fields.contains_key("latitude"));
        assert!(!fields.contains_key("orientation"));
    }

    #[test]
    fn test_hidden_entry_keeps_common_fields_only() {
        let c = classify("/music/track.mp3", None);
        let fields = build_record(
            info("/music/track.mp3"),
            &c,
            &ExtractedMetadata::default(),
            true,
        );
        assert!(fields.contains_key("path"));
        assert!(fields.contains_key("size"));
        assert!(!fields.contains_key("artist"));
        assert!(!fields.contains_key("duration"));
    }

    #[test]
    fn test_artist_falls_back_to_album_artist() {
        let c = classify("/music/track.mp3", None);
        let mut meta = ExtractedMetadata::default();
        meta.handle("albumartist", "The Band", true);
        let fields = build_record(info("/music/track.mp3"), &c, &meta, false);
        assert_eq!(fields["artist"].as_str(), Some("The Band"));
        assert_eq!(fields["album_artist"].as_str(), Some("The Band"));
    }

    #[test]
    fn test_album_derived_from_directory() {
        let c = classify("/music/Kind of Blue/track.mp3", None);
        let meta = ExtractedMetadata::default();
        let fields = build_record(info("/music/Kind of Blue/track.mp3"), &c, &meta, false);
        assert_eq!(fields["album"].as_str(), Some("Kind of Blue"));

        // files directly under the root keep the sentinel
        let fields = build_record(info("/track.mp3"), &c, &meta, false);
        assert_eq!(fields["album"].as_str(), Some(UNKNOWN_STRING));
    }

    #[test]
    fn test_capture_time_prefers_gps() {
        let c = classify("/pics/photo.jpg", None);
        let mut meta = ExtractedMetadata::default();
        meta.gps_time_ms = 1_000_000;
        meta.exif_time_ms = 2_000_000;
        let fields = build_record(info("/pics/photo.jpg"), &c, &meta, false);
        assert_eq!(fields["date_taken"].as_i64(), Some(1_000_000));
    }

    #[test]
    fn test_local_capture_time_needs_day_disagreement() {
        let c = classify("/pics/photo.jpg", None);
        let mtime = 1_700_000_000i64;

        // local time within a day of mtime is distrusted
        let mut meta = ExtractedMetadata::default();
        meta.exif_time_ms = mtime * 1000 - 60_000;
        let fields = build_record(info("/pics/photo.jpg"), &c, &meta, false);
        assert!(!fields.contains_key("date_taken"));

        // more than a day away, it is kept
        let mut meta = ExtractedMetadata::default();
        meta.exif_time_ms = mtime * 1000 - 2 * 86_400_000;
        let fields = build_record(info("/pics/photo.jpg"), &c, &meta, false);
        assert_eq!(fields["date_taken"].as_i64(), Some(meta.exif_time_ms));
    }

    #[test]
    fn test_audio_category_flags() {
        let flags = AudioCategoryFlags::from_path("/storage/Ringtones/chime.ogg");
        assert!(flags.ringtone);
        assert!(!flags.music);

        let flags = AudioCategoryFlags::from_path("/storage/Music/track.mp3");
        assert!(flags.music);
        assert!(!flags.ringtone);

        // uncategorized directories default to music
        let flags = AudioCategoryFlags::from_path("/storage/Download/track.mp3");
        assert!(flags.music);

        let flags = AudioCategoryFlags::from_path("/storage/Podcasts/ep1.mp3");
        assert!(flags.podcast);
        assert!(!flags.music);
    }
}
