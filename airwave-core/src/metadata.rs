//! In-stream metadata parsing.
//!
//! Stream headers carry a single `StreamTitle`-style string that usually
//! looks like `Artist - Title`. Parsing is pure so it can be tested without
//! a session.

use crate::station::Station;

/// Preferred delimiter between artist and title
pub const SPACED_DELIMITER: &str = " - ";
/// Fallback delimiter when the spaced form is absent
pub const BARE_DELIMITER: char = '-';

/// Artist and title extracted from a raw metadata string
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedMetadata {
    pub artist: String,
    pub title: String,
}

impl ParsedMetadata {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
        }
    }

    /// Both fields are empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artist.is_empty() && self.title.is_empty()
    }

    /// Substitute the station's description and name when nothing was parsed
    #[must_use]
    pub fn or_station_defaults(self, station: &Station) -> Self {
        if self.is_empty() {
            Self::new(&station.description, &station.name)
        } else {
            self
        }
    }
}

/// Split raw stream metadata into artist and title.
///
/// Splits on `" - "` when present, otherwise on a bare `-`. The first segment
/// is the artist and the second the title; with a single segment it is used
/// for both. Segments past the second are ignored.
#[must_use]
pub fn parse(raw: &str) -> ParsedMetadata {
    let mut parts: Vec<&str> = if raw.contains(SPACED_DELIMITER) {
        raw.split(SPACED_DELIMITER).collect()
    } else {
        raw.split(BARE_DELIMITER).collect()
    };
    parts.truncate(2);

    match parts.as_slice() {
        [artist, title] => ParsedMetadata::new(*artist, *title),
        [only] => ParsedMetadata::new(*only, *only),
        _ => ParsedMetadata::default(),
    }
}

/// Parse and apply the station default-content policy in one step
#[must_use]
pub fn parse_for_station(raw: &str, station: &Station) -> ParsedMetadata {
    parse(raw).or_station_defaults(station)
}
