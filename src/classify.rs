//! Content-type classification from paths and declared MIME types
//!
//! Pure, table-driven mapping of a file path (extension) and an optional
//! declared MIME type to a content category and a canonical MIME label.

/// Content category a catalog entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    /// Audio files (mp3, flac, ogg, etc.)
    Audio,
    /// Video files (mp4, mkv, webm, etc.)
    Video,
    /// Image files (jpg, png, gif, etc.)
    Image,
    /// Playlist files (m3u, pls, wpl)
    Playlist,
    /// Anything else tracked only as a generic file
    #[default]
    Other,
}

impl ContentType {
    pub fn is_audio(&self) -> bool {
        *self == ContentType::Audio
    }

    pub fn is_video(&self) -> bool {
        *self == ContentType::Video
    }

    pub fn is_image(&self) -> bool {
        *self == ContentType::Image
    }

    pub fn is_playlist(&self) -> bool {
        *self == ContentType::Playlist
    }

    /// Whether entries of this type appear in media listings at all
    pub fn is_media(&self) -> bool {
        !matches!(self, ContentType::Other)
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Audio => "audio",
            ContentType::Video => "video",
            ContentType::Image => "image",
            ContentType::Playlist => "playlist",
            ContentType::Other => "other",
        }
    }

    /// Numeric media-type code stored in the catalog's `media_type` column
    pub fn media_type_code(&self) -> i64 {
        match self {
            ContentType::Other => 0,
            ContentType::Image => 1,
            ContentType::Audio => 2,
            ContentType::Video => 3,
            ContentType::Playlist => 4,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of classifying one path: category plus canonical MIME label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub content_type: ContentType,
    pub mime: Option<String>,
}

/// Playlist dialects the resolver can parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    /// Line-oriented list, `#` comments (m3u/m3u8)
    M3u,
    /// `FileN=path` keyed list (pls)
    Pls,
    /// Markup dialect, entry paths in `src` attributes (wpl)
    Wpl,
}

/// MIME types that carry no useful information and must not override
/// extension-based classification.
const VALUELESS_MIME: &str = "application/octet-stream";

/// Extensions of DRM container formats. A DRM container with an image-like
/// declared type must be re-classified from its extension.
const DRM_EXTENSIONS: &[&str] = &["dcf", "mudp"];

/// (extension, category, canonical mime) table
const EXTENSION_TABLE: &[(&str, ContentType, &str)] = &[
    // Audio
    ("mp3", ContentType::Audio, "audio/mpeg"),
    ("m4a", ContentType::Audio, "audio/mp4"),
    ("wav", ContentType::Audio, "audio/x-wav"),
    ("amr", ContentType::Audio, "audio/amr"),
    ("awb", ContentType::Audio, "audio/amr-wb"),
    ("wma", ContentType::Audio, "audio/x-ms-wma"),
    ("ogg", ContentType::Audio, "audio/ogg"),
    ("oga", ContentType::Audio, "application/ogg"),
    ("opus", ContentType::Audio, "audio/opus"),
    ("aac", ContentType::Audio, "audio/aac"),
    ("flac", ContentType::Audio, "audio/flac"),
    ("mid", ContentType::Audio, "audio/midi"),
    ("midi", ContentType::Audio, "audio/midi"),
    ("mka", ContentType::Audio, "audio/x-matroska"),
    // Video
    ("mp4", ContentType::Video, "video/mp4"),
    ("m4v", ContentType::Video, "video/mp4"),
    ("mkv", ContentType::Video, "video/x-matroska"),
    ("webm", ContentType::Video, "video/webm"),
    ("avi", ContentType::Video, "video/avi"),
    ("mov", ContentType::Video, "video/quicktime"),
    ("wmv", ContentType::Video, "video/x-ms-wmv"),
    ("3gp", ContentType::Video, "video/3gpp"),
    ("3g2", ContentType::Video, "video/3gpp2"),
    ("ts", ContentType::Video, "video/mp2ts"),
    ("mpg", ContentType::Video, "video/mpeg"),
    ("mpeg", ContentType::Video, "video/mpeg"),
    ("flv", ContentType::Video, "video/x-flv"),
    // Image
    ("jpg", ContentType::Image, "image/jpeg"),
    ("jpeg", ContentType::Image, "image/jpeg"),
    ("mpo", ContentType::Image, "image/mpo"),
    ("png", ContentType::Image, "image/png"),
    ("gif", ContentType::Image, "image/gif"),
    ("bmp", ContentType::Image, "image/x-ms-bmp"),
    ("webp", ContentType::Image, "image/webp"),
    ("tif", ContentType::Image, "image/tiff"),
    ("tiff", ContentType::Image, "image/tiff"),
    ("heic", ContentType::Image, "image/heic"),
    // Playlist
    ("m3u", ContentType::Playlist, "audio/x-mpegurl"),
    ("m3u8", ContentType::Playlist, "audio/x-mpegurl"),
    ("pls", ContentType::Playlist, "audio/x-scpls"),
    ("wpl", ContentType::Playlist, "application/vnd.ms-wpl"),
];

/// MIME types of JPEG-family images that carry embedded EXIF side-channel data
pub fn is_jpeg_family(mime: &str) -> bool {
    mime.eq_ignore_ascii_case("image/jpeg") || mime.eq_ignore_ascii_case("image/mpo")
}

/// Extract the lowercase extension of a path, if any
pub fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        return None;
    }
    Some(name[dot + 1..].to_ascii_lowercase())
}

/// Classify by extension only
pub fn classify_extension(ext: &str) -> Option<(ContentType, &'static str)> {
    let ext = ext.to_ascii_lowercase();
    EXTENSION_TABLE
        .iter()
        .find(|(e, _, _)| *e == ext)
        .map(|(_, ct, mime)| (*ct, *mime))
}

/// Classify by MIME type only
pub fn classify_mime(mime: &str) -> ContentType {
    if let Some((_, ct, _)) = EXTENSION_TABLE
        .iter()
        .find(|(_, _, m)| m.eq_ignore_ascii_case(mime))
    {
        return *ct;
    }
    let lower = mime.to_ascii_lowercase();
    if lower == "audio/mpegurl" || lower == "audio/x-scpls" {
        ContentType::Playlist
    } else if lower.starts_with("audio/") {
        ContentType::Audio
    } else if lower.starts_with("video/") {
        ContentType::Video
    } else if lower.starts_with("image/") {
        ContentType::Image
    } else {
        ContentType::Other
    }
}

fn is_valueless_mime(mime: &str) -> bool {
    mime.eq_ignore_ascii_case(VALUELESS_MIME)
}

fn has_drm_extension(path: &str) -> bool {
    match extension_of(path) {
        Some(ext) => DRM_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    }
}

/// Classify a path with MIME-type precedence rules.
///
/// The declared MIME type wins unless it is a non-informative placeholder,
/// or it claims an image type for a DRM container file; in both cases the
/// extension table decides instead.
pub fn classify(path: &str, declared_mime: Option<&str>) -> Classification {
    let mut content_type = ContentType::Other;
    let mut mime = None;

    if let Some(declared) = declared_mime {
        if !is_valueless_mime(declared) {
            content_type = classify_mime(declared);
            mime = Some(declared.to_string());
        }
    }

    // a DRM container with an image-like declared type is reclassified from
    // its extension so the DRM-aware path handles it
    if content_type.is_image() && has_drm_extension(path) {
        content_type = ContentType::Other;
        mime = None;
    }

    if content_type == ContentType::Other {
        if let Some(ext) = extension_of(path) {
            if let Some((ct, canonical)) = classify_extension(&ext) {
                content_type = ct;
                if mime.is_none() {
                    mime = Some(canonical.to_string());
                }
            }
        }
    }

    Classification { content_type, mime }
}

/// Which playlist dialect a playlist path uses
pub fn playlist_kind(path: &str) -> Option<PlaylistKind> {
    match extension_of(path)?.as_str() {
        "m3u" | "m3u8" => Some(PlaylistKind::M3u),
        "pls" => Some(PlaylistKind::Pls),
        "wpl" => Some(PlaylistKind::Wpl),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(
            classify("/music/song.mp3", None).content_type,
            ContentType::Audio
        );
        assert_eq!(
            classify("/video/CLIP.MKV", None).content_type,
            ContentType::Video
        );
        assert_eq!(
            classify("/pics/photo.jpg", None).content_type,
            ContentType::Image
        );
        assert_eq!(
            classify("/music/list.m3u", None).content_type,
            ContentType::Playlist
        );
        assert_eq!(
            classify("/docs/readme.txt", None).content_type,
            ContentType::Other
        );
    }

    #[test]
    fn test_declared_mime_takes_precedence() {
        let c = classify("/files/blob.bin", Some("audio/mpeg"));
        assert_eq!(c.content_type, ContentType::Audio);
        assert_eq!(c.mime.as_deref(), Some("audio/mpeg"));
    }

    #[test]
    fn test_octet_stream_falls_back_to_extension() {
        let c = classify("/music/song.mp3", Some("application/octet-stream"));
        assert_eq!(c.content_type, ContentType::Audio);
        assert_eq!(c.mime.as_deref(), Some("audio/mpeg"));
    }

    #[test]
    fn test_drm_container_with_image_mime_reclassified() {
        let c = classify("/pics/locked.DCF", Some("image/jpeg"));
        assert_eq!(c.content_type, ContentType::Other);
    }

    #[test]
    fn test_canonical_mime_from_extension() {
        let c = classify("/music/track.flac", None);
        assert_eq!(c.mime.as_deref(), Some("audio/flac"));
    }

    #[test]
    fn test_playlist_kind() {
        assert_eq!(playlist_kind("/a/list.m3u"), Some(PlaylistKind::M3u));
        assert_eq!(playlist_kind("/a/list.M3U8"), Some(PlaylistKind::M3u));
        assert_eq!(playlist_kind("/a/list.pls"), Some(PlaylistKind::Pls));
        assert_eq!(playlist_kind("/a/list.wpl"), Some(PlaylistKind::Wpl));
        assert_eq!(playlist_kind("/a/song.mp3"), None);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("/a/b/song.MP3"), Some("mp3".to_string()));
        assert_eq!(extension_of("/a/b/noext"), None);
        assert_eq!(extension_of("/a/b/.nomedia"), None);
        assert_eq!(extension_of("C:\\Music\\song.wma"), Some("wma".to_string()));
    }

    #[test]
    fn test_media_type_codes() {
        assert_eq!(ContentType::Other.media_type_code(), 0);
        assert_eq!(ContentType::Image.media_type_code(), 1);
        assert_eq!(ContentType::Audio.media_type_code(), 2);
        assert_eq!(ContentType::Video.media_type_code(), 3);
        assert_eq!(ContentType::Playlist.media_type_code(), 4);
    }
}
