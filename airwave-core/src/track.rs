use crate::metadata::ParsedMetadata;
use crate::station::Station;
use std::fmt;
use std::sync::Arc;

/// Artwork currently attached to a track.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum ArtworkImage {
    /// Nothing resolved yet
    #[default]
    Empty,
    /// An image shipped with the client, referenced by name
    Bundled(String),
    /// Downloaded image bytes
    Downloaded(Arc<[u8]>),
}

impl ArtworkImage {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Debug for ArtworkImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bundled(name) => f.debug_tuple("Bundled").field(name).finish(),
            Self::Downloaded(bytes) => write!(f, "Downloaded({} bytes)", bytes.len()),
        }
    }
}

/// Now-playing information for the active station.
///
/// A fresh track is created for every station selection and is owned by the
/// session that created it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Track {
    /// Artist name
    pub artist: String,
    /// Song title
    pub title: String,
    /// Resolved artwork
    pub artwork: ArtworkImage,
    /// Source of the artwork: remote URL, bundled image name, or empty
    pub artwork_url: String,
    /// Whether artwork has been resolved for the current song
    pub artwork_loaded: bool,
    /// Mirrors `PlaybackState::is_playing`
    pub is_playing: bool,
}

impl Track {
    /// Create the default track for a newly selected station
    #[must_use]
    pub fn for_station(station: &Station) -> Self {
        Self {
            artwork_url: station.artwork_url.clone(),
            ..Self::default()
        }
    }

    /// Apply parsed metadata.
    ///
    /// Returns `true` when the title changed, which is the signal to refresh
    /// artwork and notify listeners.
    pub fn apply_metadata(&mut self, metadata: ParsedMetadata) -> bool {
        let title_changed = self.title != metadata.title;
        self.artist = metadata.artist;
        self.title = metadata.title;
        title_changed
    }

    /// Point artwork back at the station's declared image
    pub fn reset_artwork(&mut self, station: &Station) {
        self.artwork_loaded = false;
        self.artwork_url.clone_from(&station.artwork_url);
    }

    /// Whether the track has any song information yet
    #[must_use]
    pub fn has_metadata(&self) -> bool {
        !self.artist.is_empty() || !self.title.is_empty()
    }
}
