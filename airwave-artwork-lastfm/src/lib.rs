use airwave_core::{ArtworkProvider, ArtworkQuery, CoreError};
use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "airwave::provider::lastfm";

const LASTFM_API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Default timeout for HTTP requests (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default number of retry attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Last.fm `track.getInfo` artwork provider
pub struct LastFmProvider {
    client: ClientWithMiddleware,
    api_key: String,
}

impl LastFmProvider {
    /// Create a new Last.fm provider with default 10-second timeout and 3 retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_key: impl Into<String>) -> Result<Self, CoreError> {
        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .user_agent("Airwave/1.0")
            .build()?;

        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(DEFAULT_MAX_RETRIES);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }

    fn request_url(&self, query: &ArtworkQuery) -> String {
        format!(
            "{}?method=track.getInfo&api_key={}&artist={}&track={}&format=json",
            LASTFM_API_URL,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(query.artist.trim()),
            urlencoding::encode(query.title.trim())
        )
    }
}

/// Response from `track.getInfo`.
/// Errors come back as `{"error": 6, "message": "..."}` with status 200.
#[derive(Debug, Deserialize)]
struct LastFmResponse {
    track: Option<LastFmTrack>,
    error: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LastFmTrack {
    album: Option<LastFmAlbum>,
}

#[derive(Debug, Deserialize)]
struct LastFmAlbum {
    #[serde(default)]
    image: Vec<LastFmImage>,
}

#[derive(Debug, Deserialize)]
struct LastFmImage {
    #[serde(rename = "#text")]
    url: String,
}

/// Pick the image URL: the last (largest) entry of `track.album.image`
fn select_artwork(response: LastFmResponse) -> Option<String> {
    response
        .track?
        .album?
        .image
        .pop()
        .map(|image| image.url)
        .filter(|url| !url.trim().is_empty())
}

#[async_trait]
impl ArtworkProvider for LastFmProvider {
    fn name(&self) -> &'static str {
        "lastfm"
    }

    async fn lookup(&self, query: &ArtworkQuery) -> Result<Option<String>, CoreError> {
        info!(
            target: LOG_TARGET,
            "Looking up artwork on Last.fm for: {} - {}", query.artist, query.title
        );

        let response = self.client.get(self.request_url(query)).send().await?;
        debug!(target: LOG_TARGET, "Last.fm response status: {}", response.status());

        if !response.status().is_success() {
            warn!(target: LOG_TARGET, "Last.fm returned status: {}", response.status());
            return Err(CoreError::ArtworkLookupFailed {
                provider: self.name().to_string(),
                reason: format!("Last.fm returned status: {}", response.status()),
            });
        }

        let body: LastFmResponse = response.json().await?;
        if let Some(code) = body.error {
            let message = body.message.unwrap_or_default();
            info!(target: LOG_TARGET, "Last.fm error {}: {}", code, message);
            return Ok(None);
        }

        let artwork = select_artwork(body);
        debug!(target: LOG_TARGET, "Last.fm artwork: {:?}", artwork);
        Ok(artwork)
    }
}
