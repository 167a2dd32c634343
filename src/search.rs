// MusicBrainz catalog client
//
// Feeds the queue with artist/recording suggestions. The base URL is
// injectable so tests can point the client at canned fixtures; parsing is
// split out as pure functions over the response JSON.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://musicbrainz.org/ws/2";
const USER_AGENT: &str = concat!("batchdl/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected catalog response: {0}")]
    Decode(String),
}

/// One recording suggestion from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub artist: String,
    pub title: String,
}

#[derive(Deserialize)]
struct ArtistSearchResponse {
    #[serde(default)]
    artists: Vec<ArtistEntry>,
}

#[derive(Deserialize)]
struct ArtistEntry {
    name: String,
}

#[derive(Deserialize)]
struct RecordingSearchResponse {
    #[serde(default)]
    recordings: Vec<RecordingEntry>,
}

#[derive(Deserialize)]
struct RecordingEntry {
    title: String,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<ArtistCredit>,
}

#[derive(Deserialize)]
struct ArtistCredit {
    #[serde(default)]
    name: String,
}

fn parse_artists(body: &str) -> Result<Vec<String>, CatalogError> {
    let parsed: ArtistSearchResponse =
        serde_json::from_str(body).map_err(|e| CatalogError::Decode(e.to_string()))?;
    Ok(parsed.artists.into_iter().map(|a| a.name).collect())
}

fn parse_recordings(body: &str) -> Result<Vec<Recording>, CatalogError> {
    let parsed: RecordingSearchResponse =
        serde_json::from_str(body).map_err(|e| CatalogError::Decode(e.to_string()))?;
    Ok(parsed
        .recordings
        .into_iter()
        .map(|r| Recording {
            artist: r
                .artist_credit
                .first()
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            title: r.title,
        })
        .collect())
}

pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new() -> Result<Self, CatalogError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<String, CatalogError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        debug!(target: "catalog", %url, "catalog query");
        let response = self.http.get(&url).query(query).send().await?;
        Ok(response.error_for_status()?.text().await?)
    }

    /// Artists tagged with the given genre, best matches first.
    pub async fn artists_by_genre(
        &self,
        genre: &str,
        limit: u32,
    ) -> Result<Vec<String>, CatalogError> {
        let query = format!("tag:{genre}");
        let body = self
            .get(
                "artist",
                &[("query", &query), ("fmt", "json"), ("limit", &limit.to_string())],
            )
            .await?;
        parse_artists(&body)
    }

    /// Recordings credited to an artist.
    pub async fn recordings_by_artist(
        &self,
        artist: &str,
        limit: u32,
    ) -> Result<Vec<Recording>, CatalogError> {
        let query = format!("artist:\"{artist}\"");
        let body = self
            .get(
                "recording",
                &[("query", &query), ("fmt", "json"), ("limit", &limit.to_string())],
            )
            .await?;
        parse_recordings(&body)
    }

    /// Recordings matching a title, any artist.
    pub async fn recordings_by_title(
        &self,
        title: &str,
        limit: u32,
    ) -> Result<Vec<Recording>, CatalogError> {
        let query = format!("recording:\"{title}\"");
        let body = self
            .get(
                "recording",
                &[("query", &query), ("fmt", "json"), ("limit", &limit.to_string())],
            )
            .await?;
        parse_recordings(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_artist_search() {
        let body = r#"{"created":"2024-01-01","count":2,"offset":0,
            "artists":[{"id":"a1","name":"First Band","score":100},
                       {"id":"a2","name":"Second Band","score":92}]}"#;
        assert_eq!(
            parse_artists(body).unwrap(),
            vec!["First Band".to_string(), "Second Band".to_string()]
        );
    }

    #[test]
    fn parses_recording_search_with_credits() {
        let body = r#"{"count":2,"recordings":[
            {"id":"r1","title":"Song One",
             "artist-credit":[{"name":"The Artist"},{"name":"Feat. Guest"}]},
            {"id":"r2","title":"Song Two"}]}"#;
        let recordings = parse_recordings(body).unwrap();
        assert_eq!(
            recordings[0],
            Recording {
                artist: "The Artist".to_string(),
                title: "Song One".to_string(),
            }
        );
        // missing artist-credit degrades to an empty artist, not an error
        assert_eq!(recordings[1].artist, "");
        assert_eq!(recordings[1].title, "Song Two");
    }

    #[test]
    fn empty_result_sets_parse() {
        assert!(parse_artists(r#"{"artists":[]}"#).unwrap().is_empty());
        assert!(parse_recordings(r#"{}"#).unwrap().is_empty());
        assert!(parse_artists("not json").is_err());
    }
}
