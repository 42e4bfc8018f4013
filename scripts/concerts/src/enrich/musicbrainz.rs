use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

use super::ArtistMetadataSource;
use crate::config::MusicBrainzConfig;
use crate::error::EnrichError;
use crate::model::ArtistDetail;

const MB_BASE: &str = "https://musicbrainz.org/ws/2";
const SEARCH_LIMIT: u32 = 5;

// ---------------------------------------------------------------------------
// MusicBrainz API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MbArtistSearchResult {
    #[serde(default)]
    artists: Vec<MbArtistMatch>,
}

#[derive(Debug, Deserialize)]
struct MbArtistMatch {
    id: String,
    name: String,
    score: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MbArtistDetail {
    area: Option<MbArea>,
    #[serde(rename = "release-groups", default)]
    release_groups: Vec<MbReleaseGroup>,
    #[serde(default)]
    relations: Vec<MbRelation>,
}

#[derive(Debug, Deserialize)]
struct MbArea {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MbReleaseGroup {
    title: String,
}

#[derive(Debug, Deserialize)]
struct MbRelation {
    #[serde(rename = "type")]
    relation_type: String,
    url: Option<MbUrl>,
}

#[derive(Debug, Deserialize)]
struct MbUrl {
    resource: String,
}

// ---------------------------------------------------------------------------
// Rate limiter
// ---------------------------------------------------------------------------

/// Fixed spacing between requests. No backoff: a refused request just fails.
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct MusicBrainzClient {
    client: Client,
    user_agent: String,
    limiter: RateLimiter,
}

impl MusicBrainzClient {
    pub fn new(client: Client, config: &MusicBrainzConfig) -> Self {
        Self {
            client,
            user_agent: config.user_agent.clone(),
            limiter: RateLimiter::new(config.interval),
        }
    }

    async fn get(&self, url: &str) -> Result<String, EnrichError> {
        self.limiter.wait().await;
        debug!(url = %url, "Querying MusicBrainz");

        let resp = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EnrichError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(resp.text().await?)
    }
}

#[async_trait]
impl ArtistMetadataSource for MusicBrainzClient {
    async fn search_artist(&self, name: &str) -> Result<Option<String>, EnrichError> {
        let url = format!(
            "{}/artist?query=artist:{}&limit={}&fmt=json",
            MB_BASE,
            urlencoding::encode(name),
            SEARCH_LIMIT
        );
        let body = self.get(&url).await?;
        parse_search(&body)
    }

    async fn artist_detail(&self, external_id: &str) -> Result<ArtistDetail, EnrichError> {
        let url = format!(
            "{}/artist/{}?inc=release-groups+url-rels&fmt=json",
            MB_BASE,
            urlencoding::encode(external_id)
        );
        let body = self.get(&url).await?;
        parse_detail(&body)
    }
}

/// First candidate in the order the API ranks them.
pub fn parse_search(body: &str) -> Result<Option<String>, EnrichError> {
    let result: MbArtistSearchResult =
        serde_json::from_str(body).map_err(|e| EnrichError::Parse(e.to_string()))?;

    Ok(result.artists.into_iter().next().map(|m| {
        debug!(id = %m.id, name = %m.name, score = ?m.score, "MusicBrainz candidate");
        m.id
    }))
}

pub fn parse_detail(body: &str) -> Result<ArtistDetail, EnrichError> {
    let detail: MbArtistDetail =
        serde_json::from_str(body).map_err(|e| EnrichError::Parse(e.to_string()))?;

    let spotify_id = detail
        .relations
        .iter()
        .filter_map(|rel| {
            let url = rel.url.as_ref()?;
            debug!(relation = %rel.relation_type, url = %url.resource, "MusicBrainz URL relation");
            spotify_artist_id(&url.resource)
        })
        .next();

    Ok(ArtistDetail {
        area: detail.area.map(|a| a.name),
        releases: detail.release_groups.into_iter().map(|rg| rg.title).collect(),
        spotify_id,
    })
}

/// "https://open.spotify.com/artist/5Ae2...?si=x" -> "5Ae2..."
fn spotify_artist_id(resource: &str) -> Option<String> {
    let (_, rest) = resource.split_once("open.spotify.com/artist/")?;
    let id = rest.split(['?', '/', '#']).next()?;
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_takes_first_candidate() {
        let body = r#"{
            "created": "2024-05-01T10:00:00.000Z",
            "count": 3,
            "offset": 0,
            "artists": [
                {"id": "5a8e5f0f-1e1e-4c4e-9d9c-0b1d1c2e3f40", "name": "Powerwolf", "score": 100},
                {"id": "0d7d3e6a-2b5c-4f42-8f0e-3c6b7a1e2d11", "name": "Powerwolf Tribute", "score": 80},
                {"id": "9b1c2d3e-4f5a-6b7c-8d9e-0f1a2b3c4d5e", "name": "Wolf", "score": 60}
            ]
        }"#;

        assert_eq!(
            parse_search(body).unwrap().as_deref(),
            Some("5a8e5f0f-1e1e-4c4e-9d9c-0b1d1c2e3f40")
        );
    }

    #[test]
    fn test_search_without_candidates() {
        assert_eq!(parse_search(r#"{"count": 0, "artists": []}"#).unwrap(), None);
        assert_eq!(parse_search(r#"{"error": "nope"}"#).unwrap(), None);
    }

    #[test]
    fn test_search_rejects_garbage() {
        assert!(matches!(parse_search("<html>"), Err(EnrichError::Parse(_))));
    }

    #[test]
    fn test_detail_maps_area_releases_and_spotify() {
        let body = r#"{
            "id": "5a8e5f0f-1e1e-4c4e-9d9c-0b1d1c2e3f40",
            "name": "Powerwolf",
            "area": {"id": "85752fda-13c4-31a3-bee5-0e5cb1f51dad", "name": "Germany"},
            "release-groups": [
                {"id": "a1", "title": "Lupus Dei", "primary-type": "Album"},
                {"id": "a2", "title": "Blessed & Possessed", "primary-type": "Album"}
            ],
            "relations": [
                {"type": "wikipedia", "url": {"resource": "https://en.wikipedia.org/wiki/Powerwolf"}},
                {"type": "free streaming", "url": {"resource": "https://open.spotify.com/artist/5HFkc3t0HYETL4JeEbDB1v?si=abc"}}
            ]
        }"#;

        let detail = parse_detail(body).unwrap();

        assert_eq!(detail.area.as_deref(), Some("Germany"));
        assert_eq!(detail.releases, vec!["Lupus Dei", "Blessed & Possessed"]);
        assert_eq!(detail.spotify_id.as_deref(), Some("5HFkc3t0HYETL4JeEbDB1v"));
    }

    #[test]
    fn test_detail_with_null_area_and_no_relations() {
        let body = r#"{"id": "x", "name": "Band A", "area": null}"#;

        let detail = parse_detail(body).unwrap();

        assert_eq!(detail, ArtistDetail::default());
    }

    #[test]
    fn test_spotify_artist_id() {
        assert_eq!(
            spotify_artist_id("https://open.spotify.com/artist/abc123").as_deref(),
            Some("abc123")
        );
        assert_eq!(spotify_artist_id("https://open.spotify.com/album/abc123"), None);
        assert_eq!(spotify_artist_id("https://open.spotify.com/artist/"), None);
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
