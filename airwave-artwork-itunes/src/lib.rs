use airwave_core::{ArtworkProvider, ArtworkQuery, CoreError};
use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "airwave::provider::itunes";

const ITUNES_SEARCH_URL: &str = "https://itunes.apple.com/search";

/// Default timeout for HTTP requests (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default number of retry attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// iTunes Search artwork provider
pub struct ItunesProvider {
    client: ClientWithMiddleware,
}

impl ItunesProvider {
    /// Create a new iTunes provider with default 10-second timeout and 3 retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, CoreError> {
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

        Ok(Self { client })
    }
}

/// `term` is artist and title joined with `+`, each part percent-encoded
fn request_url(query: &ArtworkQuery) -> String {
    format!(
        "{}?term={}+{}&entity=song",
        ITUNES_SEARCH_URL,
        urlencoding::encode(query.artist.trim()),
        urlencoding::encode(query.title.trim())
    )
}

/// Response from the search endpoint.
/// Results carry many more fields; serde ignores unknown fields by default.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "resultCount", default)]
    result_count: usize,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(rename = "artworkUrl100")]
    artwork_url_100: Option<String>,
}

/// Pick the image URL: `artworkUrl100` of the first result
fn select_artwork(response: SearchResponse) -> Option<String> {
    response
        .results
        .into_iter()
        .next()?
        .artwork_url_100
        .filter(|url| !url.trim().is_empty())
}

#[async_trait]
impl ArtworkProvider for ItunesProvider {
    fn name(&self) -> &'static str {
        "itunes"
    }

    async fn lookup(&self, query: &ArtworkQuery) -> Result<Option<String>, CoreError> {
        let url = request_url(query);
        info!(target: LOG_TARGET, "iTunes GET (search): {}", url);

        let response = self.client.get(&url).send().await?;
        debug!(target: LOG_TARGET, "iTunes response status: {}", response.status());

        if !response.status().is_success() {
            warn!(target: LOG_TARGET, "iTunes returned status: {}", response.status());
            return Err(CoreError::ArtworkLookupFailed {
                provider: self.name().to_string(),
                reason: format!("iTunes returned status: {}", response.status()),
            });
        }

        let body: SearchResponse = response.json().await?;
        debug!(target: LOG_TARGET, "iTunes returned {} results", body.result_count);
        Ok(select_artwork(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> SearchResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_selects_first_result() {
        let body = r#"{
            "resultCount": 2,
            "results": [
                {
                    "wrapperType": "track",
                    "artistName": "Coldplay",
                    "trackName": "Yellow",
                    "artworkUrl60": "https://itunes.example/60x60bb.jpg",
                    "artworkUrl100": "https://itunes.example/100x100bb.jpg"
                },
                {
                    "artistName": "Coldplay",
                    "trackName": "Yellow (Live)",
                    "artworkUrl100": "https://itunes.example/live.jpg"
                }
            ]
        }"#;
        assert_eq!(
            select_artwork(parse(body)).as_deref(),
            Some("https://itunes.example/100x100bb.jpg")
        );
    }

    #[test]
    fn test_no_results() {
        let body = r#"{"resultCount": 0, "results": []}"#;
        assert_eq!(select_artwork(parse(body)), None);
    }

    #[test]
    fn test_first_result_without_artwork() {
        let body = r#"{
            "resultCount": 2,
            "results": [
                {"trackName": "Yellow"},
                {"trackName": "Yellow", "artworkUrl100": "https://itunes.example/b.jpg"}
            ]
        }"#;
        assert_eq!(select_artwork(parse(body)), None);
    }

    #[test]
    fn test_request_url() {
        let url = request_url(&ArtworkQuery::new("Coldplay", "Fix You"));
        assert_eq!(
            url,
            "https://itunes.apple.com/search?term=Coldplay+Fix%20You&entity=song"
        );
    }
}
