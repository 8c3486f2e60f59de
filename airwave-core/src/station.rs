use serde::{Deserialize, Serialize};

/// A selectable stream endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    /// Stable identifier used to pick the station from config or the CLI
    pub id: String,
    /// Display name
    pub name: String,
    /// Short description shown while no artwork is loaded
    #[serde(default)]
    pub description: String,
    /// Stream endpoint handed to the engine
    pub stream_url: String,
    /// Either a remote image URL or the name of a bundled image
    #[serde(default)]
    pub artwork_url: String,
}

impl Station {
    /// Create a new station
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        stream_url: impl Into<String>,
        artwork_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            stream_url: stream_url.into(),
            artwork_url: artwork_url.into(),
        }
    }

    /// Whether the declared artwork must be downloaded rather than looked up locally
    #[must_use]
    pub fn has_remote_artwork(&self) -> bool {
        is_remote_url(&self.artwork_url)
    }

    /// Whether the stream points at a local file instead of a network endpoint
    #[must_use]
    pub fn is_file_stream(&self) -> bool {
        self.stream_url.starts_with("file://")
    }
}

/// True for `http://` and `https://` URLs.
#[must_use]
pub fn is_remote_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_artwork_detection() {
        let remote = Station::new("a", "A", "", "http://s", "https://img.example/a.png");
        let local = Station::new("b", "B", "", "http://s", "station-b");

        assert!(remote.has_remote_artwork());
        assert!(!local.has_remote_artwork());
    }

    #[test]
    fn test_is_remote_url_case_insensitive() {
        assert!(is_remote_url("HTTP://example.com/x.jpg"));
        assert!(!is_remote_url(""));
        assert!(!is_remote_url("albumArt"));
    }

    #[test]
    fn test_file_stream() {
        let station = Station::new("f", "File", "", "file:///tmp/a.mp3", "");
        assert!(station.is_file_stream());
    }

    #[test]
    fn test_station_deserialize_defaults() {
        let station: Station = toml::from_str(
            r#"
id = "jazz"
name = "Jazz FM"
stream_url = "http://jazz.example/stream"
"#,
        )
        .unwrap();

        assert_eq!(station.description, "");
        assert_eq!(station.artwork_url, "");
    }
}
