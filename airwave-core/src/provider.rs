use crate::error::CoreError;
use async_trait::async_trait;

/// Query parameters for an artwork lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtworkQuery {
    /// Artist name
    pub artist: String,
    /// Track title
    pub title: String,
}

impl ArtworkQuery {
    /// Create a new artwork query
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
        }
    }

    /// Nothing to search for
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artist.trim().is_empty() && self.title.trim().is_empty()
    }

    /// `artist title` joined for free-text search endpoints
    #[must_use]
    pub fn search_term(&self) -> String {
        format!("{} {}", self.artist.trim(), self.title.trim())
            .trim()
            .to_string()
    }
}

/// Trait for artwork metadata services
#[async_trait]
pub trait ArtworkProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Look up the best image URL for a track.
    ///
    /// Returns `Ok(None)` when the service answered but had no image.
    async fn lookup(&self, query: &ArtworkQuery) -> Result<Option<String>, CoreError>;
}
