//! Tag normalization for extracted metadata
//!
//! Extractors report metadata as a stream of `(name, value)` string pairs.
//! [`ExtractedMetadata`] accumulates one file's worth of pairs, applying the
//! normalization rules: case-insensitive tag names with optional `;lang`
//! suffixes, leading-digit-run numeric parsing, the track/disc composite
//! packing, and ID3 genre decoding.

/// ID3v1 genre table plus the common extensions. Index 133 is an
/// intentionally unmapped slot.
const ID3_GENRES: [Option<&str>; 148] = [
    Some("Blues"),
    Some("Classic Rock"),
    Some("Country"),
    Some("Dance"),
    Some("Disco"),
    Some("Funk"),
    Some("Grunge"),
    Some("Hip-Hop"),
    Some("Jazz"),
    Some("Metal"),
    Some("New Age"),
    Some("Oldies"),
    Some("Other"),
    Some("Pop"),
    Some("R&B"),
    Some("Rap"),
    Some("Reggae"),
    Some("Rock"),
    Some("Techno"),
    Some("Industrial"),
    Some("Alternative"),
    Some("Ska"),
    Some("Death Metal"),
    Some("Pranks"),
    Some("Soundtrack"),
    Some("Euro-Techno"),
    Some("Ambient"),
    Some("Trip-Hop"),
    Some("Vocal"),
    Some("Jazz+Funk"),
    Some("Fusion"),
    Some("Trance"),
    Some("Classical"),
    Some("Instrumental"),
    Some("Acid"),
    Some("House"),
    Some("Game"),
    Some("Sound Clip"),
    Some("Gospel"),
    Some("Noise"),
    Some("AlternRock"),
    Some("Bass"),
    Some("Soul"),
    Some("Punk"),
    Some("Space"),
    Some("Meditative"),
    Some("Instrumental Pop"),
    Some("Instrumental Rock"),
    Some("Ethnic"),
    Some("Gothic"),
    Some("Darkwave"),
    Some("Techno-Industrial"),
    Some("Electronic"),
    Some("Pop-Folk"),
    Some("Eurodance"),
    Some("Dream"),
    Some("Southern Rock"),
    Some("Comedy"),
    Some("Cult"),
    Some("Gangsta"),
    Some("Top 40"),
    Some("Christian Rap"),
    Some("Pop/Funk"),
    Some("Jungle"),
    Some("Native American"),
    Some("Cabaret"),
    Some("New Wave"),
    Some("Psychadelic"),
    Some("Rave"),
    Some("Showtunes"),
    Some("Trailer"),
    Some("Lo-Fi"),
    Some("Tribal"),
    Some("Acid Punk"),
    Some("Acid Jazz"),
    Some("Polka"),
    Some("Retro"),
    Some("Musical"),
    Some("Rock & Roll"),
    Some("Hard Rock"),
    Some("Folk"),
    Some("Folk-Rock"),
    Some("National Folk"),
    Some("Swing"),
    Some("Fast Fusion"),
    Some("Bebob"),
    Some("Latin"),
    Some("Revival"),
    Some("Celtic"),
    Some("Bluegrass"),
    Some("Avantgarde"),
    Some("Gothic Rock"),
    Some("Progressive Rock"),
    Some("Psychedelic Rock"),
    Some("Symphonic Rock"),
    Some("Slow Rock"),
    Some("Big Band"),
    Some("Chorus"),
    Some("Easy Listening"),
    Some("Acoustic"),
    Some("Humour"),
    Some("Speech"),
    Some("Chanson"),
    Some("Opera"),
    Some("Chamber Music"),
    Some("Sonata"),
    Some("Symphony"),
    Some("Booty Bass"),
    Some("Primus"),
    Some("Porn Groove"),
    Some("Satire"),
    Some("Slow Jam"),
    Some("Club"),
    Some("Tango"),
    Some("Samba"),
    Some("Folklore"),
    Some("Ballad"),
    Some("Power Ballad"),
    Some("Rhythmic Soul"),
    Some("Freestyle"),
    Some("Duet"),
    Some("Punk Rock"),
    Some("Drum Solo"),
    Some("A capella"),
    Some("Euro-House"),
    Some("Dance Hall"),
    Some("Goa"),
    Some("Drum & Bass"),
    Some("Club-House"),
    Some("Hardcore"),
    Some("Terror"),
    Some("Indie"),
    Some("Britpop"),
    None,
    Some("Polsk Punk"),
    Some("Beat"),
    Some("Christian Gangsta"),
    Some("Heavy Metal"),
    Some("Black Metal"),
    Some("Crossover"),
    Some("Contemporary Christian"),
    Some("Christian Rock"),
    Some("Merengue"),
    Some("Salsa"),
    Some("Thrash Metal"),
    Some("Anime"),
    Some("JPop"),
    Some("Synthpop"),
];

/// The reserved "no genre" numeric code
const GENRE_NONE: i16 = 0xFF;

/// Parse the leading run of ASCII digits of `s`, or `default` when the
/// string does not start with a digit. Parsing stops at the first non-digit.
pub fn parse_leading_digits(s: &str, default: i64) -> i64 {
    let mut result: Option<i64> = None;
    for b in s.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        let digit = (b - b'0') as i64;
        result = Some(result.unwrap_or(0).saturating_mul(10).saturating_add(digit));
    }
    result.unwrap_or(default)
}

/// Decode a raw genre tag value to a display name.
///
/// Numeric references use the ID3 table: a bare number or a `(N)`-prefixed
/// value maps through the table when in range; code 0xFF means "no genre";
/// an unmapped code below 0xFF yields any trailing text, and with no
/// trailing text an unmapped code is kept as its numeric literal. Anything
/// that does not fit the numeric grammar is returned verbatim.
pub fn decode_genre(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return Some(raw.to_string());
    }

    let bytes = raw.as_bytes();
    let mut parenthesized = false;
    let mut digits = String::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if i == 0 && c == b'(' {
            parenthesized = true;
        } else if c.is_ascii_digit() {
            digits.push(c as char);
        } else {
            break;
        }
        i += 1;
    }

    let after = if i < bytes.len() { bytes[i] as char } else { ' ' };
    let grammar_ok = (parenthesized && after == ')')
        || (!parenthesized && after.is_ascii_whitespace());
    if grammar_ok {
        if let Ok(index) = digits.parse::<i16>() {
            if index >= 0 {
                let slot = usize::try_from(index)
                    .ok()
                    .and_then(|idx| ID3_GENRES.get(idx))
                    .copied()
                    .flatten();
                if let Some(name) = slot {
                    return Some(name.to_string());
                } else if index == GENRE_NONE {
                    return None;
                } else if index < GENRE_NONE && i + 1 < raw.len() {
                    // unmapped but valid code followed by text: the text wins
                    let mut rest = i;
                    if parenthesized && after == ')' {
                        rest += 1;
                    }
                    let trailing = raw[rest..].trim();
                    if !trailing.is_empty() {
                        return Some(trailing.to_string());
                    }
                } else {
                    return Some(digits);
                }
            }
        }
    }
    Some(raw.to_string())
}

/// Pack a track number into the low three digits of the composite
pub fn pack_track(composite: i64, track: i64) -> i64 {
    (composite / 1000) * 1000 + track
}

/// Pack a disc number into the high digits of the composite
pub fn pack_disc(composite: i64, disc: i64) -> i64 {
    disc * 1000 + composite % 1000
}

/// Accumulated, normalized metadata for one file
#[derive(Debug, Clone, Default)]
pub struct ExtractedMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub composer: Option<String>,
    pub genre: Option<String>,
    pub writer: Option<String>,
    pub year: i64,
    /// Composite disc/track value: `disc * 1000 + track`
    pub track: i64,
    pub duration_ms: i64,
    pub compilation: i64,
    pub is_drm: bool,
    pub width: i64,
    pub height: i64,
    /// MIME type the classifier assigned before extraction started
    pub base_mime: Option<String>,
    /// MIME type reported by the container, overriding classification
    pub mime_override: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Rotation in degrees (0, 90, 180, 270)
    pub orientation: i64,
    /// Recording date from the container's `date` tag, epoch milliseconds
    pub date_ms: i64,
    /// Embedded local capture time, epoch milliseconds, 0 when absent
    pub exif_time_ms: i64,
    /// GPS-derived UTC capture time, epoch milliseconds, 0 when absent
    pub gps_time_ms: i64,
}

/// Parse a `YYYY:MM:DD HH:MM:SS` capture timestamp to epoch milliseconds
fn parse_capture_time(value: &str) -> Option<i64> {
    chrono::NaiveDateTime::parse_from_str(value.trim(), "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Parse a `YYYYMMDDTHHMMSS` recording date to epoch milliseconds
fn parse_recording_date(value: &str) -> Option<i64> {
    let value = value.trim();
    let value = value.get(..15).unwrap_or(value);
    chrono::NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// True when `name` is `tag` or `tag;lang`, ignoring case
fn tag_matches(name: &str, tag: &str) -> bool {
    if name.eq_ignore_ascii_case(tag) {
        return true;
    }
    name.len() > tag.len()
        && name.as_bytes()[tag.len()] == b';'
        && name[..tag.len()].eq_ignore_ascii_case(tag)
}

impl ExtractedMetadata {
    /// Reset all fields for the next file
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Apply one raw `(name, value)` pair.
    ///
    /// `decode_genres` disables genre decoding (the raw value is kept) when
    /// false; the session config decides per volume.
    pub fn handle(&mut self, name: &str, value: &str, decode_genres: bool) {
        if tag_matches(name, "title") {
            self.title = Some(value.to_string());
        } else if tag_matches(name, "artist") {
            self.artist = Some(value.trim().to_string());
        } else if tag_matches(name, "albumartist") || tag_matches(name, "band") {
            self.album_artist = Some(value.trim().to_string());
        } else if tag_matches(name, "album") {
            self.album = Some(value.trim().to_string());
        } else if tag_matches(name, "composer") {
            self.composer = Some(value.trim().to_string());
        } else if tag_matches(name, "genre") {
            self.genre = if decode_genres {
                decode_genre(value)
            } else {
                Some(value.to_string())
            };
        } else if tag_matches(name, "year") {
            self.year = parse_leading_digits(value, 0);
        } else if tag_matches(name, "tracknumber") {
            let num = parse_leading_digits(value, 0);
            self.track = pack_track(self.track, num);
        } else if tag_matches(name, "discnumber")
            || tag_matches(name, "set")
            || tag_matches(name, "partofset")
        {
            let num = parse_leading_digits(value, 0);
            self.track = pack_disc(self.track, num);
        } else if tag_matches(name, "duration") {
            self.duration_ms = parse_leading_digits(value, 0);
        } else if tag_matches(name, "writer") {
            self.writer = Some(value.trim().to_string());
        } else if tag_matches(name, "compilation") {
            self.compilation = parse_leading_digits(value, 0);
        } else if tag_matches(name, "isdrm") {
            self.is_drm = parse_leading_digits(value, 0) == 1;
        } else if tag_matches(name, "width") {
            self.width = parse_leading_digits(value, 0);
        } else if tag_matches(name, "height") {
            self.height = parse_leading_digits(value, 0);
        } else if tag_matches(name, "mimetype") {
            self.set_mime_type(value);
        } else if tag_matches(name, "latitude") {
            self.latitude = value.trim().parse().ok();
        } else if tag_matches(name, "longitude") {
            self.longitude = value.trim().parse().ok();
        } else if tag_matches(name, "orientation") {
            self.orientation = parse_leading_digits(value, 0);
        } else if tag_matches(name, "date") {
            self.date_ms = parse_recording_date(value).unwrap_or(0);
        } else if tag_matches(name, "datetaken") {
            self.exif_time_ms = parse_capture_time(value).unwrap_or(0);
        } else if tag_matches(name, "gpsdatetaken") {
            self.gps_time_ms = parse_leading_digits(value, 0);
        }
    }

    /// MIME type after any container override
    pub fn effective_mime(&self) -> Option<&str> {
        self.mime_override.as_deref().or(self.base_mime.as_deref())
    }

    /// Apply a container-reported MIME type. An MP4 audio container is never
    /// reclassified to a video type on the container's say-so.
    pub fn set_mime_type(&mut self, mime: &str) {
        if self.effective_mime() == Some("audio/mp4") && mime.starts_with("video") {
            return;
        }
        self.mime_override = Some(mime.to_string());
    }
}
