//! Metadata extraction capability
//!
//! The engine consumes metadata as a stream of `(name, value)` pairs fed to
//! a sink callback, so extractor backends stay swappable. The shipped
//! backend reads audio tags and stream properties with lofty.

use std::path::Path;

use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use lofty::tag::ItemKey;
use log::debug;

use crate::error::{Result, ScanError};

/// Streams raw tag pairs for one file into a sink
pub trait MetadataExtractor {
    /// Extract metadata from `path`, calling `sink` once per `(name, value)`
    /// pair. Pair names follow the normalized tag vocabulary (`title`,
    /// `artist`, `tracknumber`, ...).
    fn extract(&self, path: &Path, sink: &mut dyn FnMut(&str, &str)) -> Result<()>;
}

/// Tag keys read from the file, with the pair name each is reported under
const TAG_KEYS: &[(ItemKey, &str)] = &[
    (ItemKey::TrackTitle, "title"),
    (ItemKey::TrackArtist, "artist"),
    (ItemKey::AlbumTitle, "album"),
    (ItemKey::AlbumArtist, "albumartist"),
    (ItemKey::Composer, "composer"),
    (ItemKey::Genre, "genre"),
    (ItemKey::Year, "year"),
    (ItemKey::TrackNumber, "tracknumber"),
    (ItemKey::DiscNumber, "discnumber"),
    (ItemKey::Lyricist, "writer"),
    (ItemKey::FlagCompilation, "compilation"),
];

/// lofty-backed tag and stream-property extractor
#[derive(Debug, Default)]
pub struct LoftyExtractor;

impl MetadataExtractor for LoftyExtractor {
    fn extract(&self, path: &Path, sink: &mut dyn FnMut(&str, &str)) -> Result<()> {
        let tagged = lofty::read_from_path(path)
            .map_err(|e| ScanError::extraction(path.to_path_buf(), e.to_string()))?;

        if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
            for (key, name) in TAG_KEYS {
                if let Some(value) = tag.get_string(key) {
                    sink(name, value);
                }
            }
        } else {
            debug!("no tag block in {}", path.display());
        }

        let millis = tagged.properties().duration().as_millis();
        sink("duration", &millis.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_file_is_extraction_error() {
        let err = LoftyExtractor
            .extract(Path::new("/nonexistent/file.mp3"), &mut |_, _| {})
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ScanErrorKind::ExtractionFailed);
        assert!(!err.is_fatal());
    }
}
