//! Artwork resolution with a fallback ladder.
//!
//! Resolution never fails from the caller's point of view: provider image,
//! then the station's declared artwork, then the bundled default image.

use crate::cache::ArtworkCache;
use crate::error::CoreError;
use crate::provider::{ArtworkProvider, ArtworkQuery};
use crate::station::{is_remote_url, Station};
use crate::track::ArtworkImage;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "airwave::artwork";

/// Default timeout for image downloads (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// URL fragments that mark a "no image available" placeholder
pub const DEFAULT_PLACEHOLDER_PATTERNS: &[&str] = &["/noimage/"];
/// Name of the bundled image shown when nothing else resolves
pub const DEFAULT_IMAGE_NAME: &str = "albumArt";

/// Downloads image bytes
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Arc<[u8]>, CoreError>;
}

/// [`ImageLoader`] over plain HTTP
pub struct HttpImageLoader {
    client: reqwest::Client,
}

impl HttpImageLoader {
    /// Create a loader with a 10-second timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .user_agent("Airwave/1.0")
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> Result<Arc<[u8]>, CoreError> {
        debug!(target: LOG_TARGET, "Downloading artwork: {}", url);
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(CoreError::ArtworkLookupFailed {
                provider: "image".to_string(),
                reason: format!("image download returned status: {}", response.status()),
            });
        }

        let bytes = response.bytes().await?;
        Ok(Arc::from(bytes.as_ref()))
    }
}

/// Which rung of the ladder produced the artwork
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtworkSource {
    /// The current track's artwork URL, resolved directly
    Current,
    /// The configured artwork provider
    Provider,
    /// The station's declared artwork
    Station,
    /// The bundled default image
    Default,
}

/// Outcome of a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtwork {
    /// URL or bundled name the image came from (empty for the default)
    pub url: String,
    pub image: ArtworkImage,
    /// `false` only for the bundled default
    pub loaded: bool,
    pub source: ArtworkSource,
}

/// Resolver tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtworkSettings {
    pub placeholder_patterns: Vec<String>,
    pub default_image: String,
}

impl Default for ArtworkSettings {
    fn default() -> Self {
        Self {
            placeholder_patterns: DEFAULT_PLACEHOLDER_PATTERNS
                .iter()
                .map(ToString::to_string)
                .collect(),
            default_image: DEFAULT_IMAGE_NAME.to_string(),
        }
    }
}

/// Resolves track artwork through one provider and the fallback ladder
pub struct ArtworkResolver {
    provider: Option<Box<dyn ArtworkProvider>>,
    loader: Box<dyn ImageLoader>,
    cache: ArtworkCache,
    settings: ArtworkSettings,
}

impl ArtworkResolver {
    /// Create a resolver.
    ///
    /// With no provider, lookups go straight to the station artwork.
    #[must_use]
    pub fn new(
        provider: Option<Box<dyn ArtworkProvider>>,
        loader: Box<dyn ImageLoader>,
        settings: ArtworkSettings,
    ) -> Self {
        Self {
            provider,
            loader,
            cache: ArtworkCache::default(),
            settings,
        }
    }

    /// Name of the configured provider, if any
    #[must_use]
    pub fn provider_name(&self) -> Option<&'static str> {
        self.provider.as_ref().map(|p| p.name())
    }

    /// Whether a URL is a known "no image" placeholder
    #[must_use]
    pub fn is_placeholder(&self, url: &str) -> bool {
        self.settings
            .placeholder_patterns
            .iter()
            .any(|pattern| !pattern.is_empty() && url.contains(pattern.as_str()))
    }

    /// Resolve the track's current artwork URL directly, falling back to the
    /// station artwork and then the default.
    pub async fn resolve_current(&self, current_url: &str, station: &Station) -> ResolvedArtwork {
        if let Some(resolved) = self.from_url(current_url, ArtworkSource::Current).await {
            return resolved;
        }
        self.station_or_default(station).await
    }

    /// Query the provider for a track, falling back to the station artwork and
    /// then the default.
    pub async fn resolve(&self, query: &ArtworkQuery, station: &Station) -> ResolvedArtwork {
        if let Some(resolved) = self.from_provider(query).await {
            return resolved;
        }
        self.station_or_default(station).await
    }

    /// Station artwork, or the default when the station has none usable
    pub async fn station_or_default(&self, station: &Station) -> ResolvedArtwork {
        if let Some(resolved) = self
            .from_url(&station.artwork_url, ArtworkSource::Station)
            .await
        {
            return resolved;
        }
        debug!(
            target: LOG_TARGET,
            "No usable artwork for station {}, using default image", station.id
        );
        self.default_artwork()
    }

    /// The bundled default image
    #[must_use]
    pub fn default_artwork(&self) -> ResolvedArtwork {
        ResolvedArtwork {
            url: String::new(),
            image: ArtworkImage::Bundled(self.settings.default_image.clone()),
            loaded: false,
            source: ArtworkSource::Default,
        }
    }

    async fn from_provider(&self, query: &ArtworkQuery) -> Option<ResolvedArtwork> {
        let provider = self.provider.as_ref()?;
        if query.is_empty() {
            return None;
        }

        info!(
            target: LOG_TARGET,
            "Looking up artwork via {} for: {} - {}",
            provider.name(),
            query.artist,
            query.title
        );

        let url = match provider.lookup(query).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                info!(target: LOG_TARGET, "Provider {} returned no artwork", provider.name());
                return None;
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Provider {} failed with error: {}", provider.name(), e);
                return None;
            }
        };

        if self.is_placeholder(&url) {
            info!(target: LOG_TARGET, "Provider {} returned placeholder artwork: {}", provider.name(), url);
            return None;
        }

        self.from_url(&url, ArtworkSource::Provider).await
    }

    /// Resolve a single URL or bundled name. `None` means advance the ladder.
    async fn from_url(&self, url: &str, source: ArtworkSource) -> Option<ResolvedArtwork> {
        if url.is_empty() || self.is_placeholder(url) {
            return None;
        }

        if !is_remote_url(url) {
            return Some(ResolvedArtwork {
                url: url.to_string(),
                image: ArtworkImage::Bundled(url.to_string()),
                loaded: true,
                source,
            });
        }

        if let Some(bytes) = self.cache.get(url) {
            debug!(target: LOG_TARGET, "Using cached artwork for {}", url);
            return Some(Self::downloaded(url, bytes, source));
        }

        match self.loader.load(url).await {
            Ok(bytes) => {
                self.cache.store(url, Arc::clone(&bytes));
                Some(Self::downloaded(url, bytes, source))
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to download artwork {}: {}", url, e);
                None
            }
        }
    }

    fn downloaded(url: &str, bytes: Arc<[u8]>, source: ArtworkSource) -> ResolvedArtwork {
        ResolvedArtwork {
            url: url.to_string(),
            image: ArtworkImage::Downloaded(bytes),
            loaded: true,
            source,
        }
    }
}
