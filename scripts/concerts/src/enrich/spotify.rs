use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{TopTrackSource, TrackQuery};
use crate::config::{SpotifyConfig, TrackArtistMatch};
use crate::error::EnrichError;

const SPOTIFY_API: &str = "https://api.spotify.com/v1";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SEARCH_LIMIT: u32 = 5;

#[derive(Debug, Deserialize)]
struct SpotifySearchResult {
    artists: SpotifyArtistPage,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtistPage {
    #[serde(default)]
    items: Vec<SpotifyArtist>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SpotifyArtist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyTopTracks {
    #[serde(default)]
    tracks: Vec<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct SpotifyClient {
    client: Client,
    token: Option<String>,
    market: String,
    matching: TrackArtistMatch,
}

impl SpotifyClient {
    /// Uses `SPOTIFY_TOKEN` when given, otherwise tries the client-credentials
    /// grant once. Without a token every lookup reports `MissingToken`.
    pub async fn connect(client: Client, config: &SpotifyConfig) -> Self {
        let token = match (&config.token, &config.client_id, &config.client_secret) {
            (Some(token), _, _) => Some(token.clone()),
            (None, Some(id), Some(secret)) => match request_token(&client, id, secret).await {
                Ok(token) => {
                    info!("Obtained Spotify token via client credentials");
                    Some(token)
                }
                Err(e) => {
                    warn!(error = %e, "Spotify token request failed, top tracks disabled");
                    None
                }
            },
            _ => {
                warn!("No Spotify credentials configured, top tracks disabled");
                None
            }
        };

        Self {
            client,
            token,
            market: config.market.clone(),
            matching: config.matching,
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    async fn get(&self, url: &str) -> Result<String, EnrichError> {
        let token = self.token.as_deref().ok_or(EnrichError::MissingToken)?;
        debug!(url = %url, "Querying Spotify");

        let resp = self.client.get(url).bearer_auth(token).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EnrichError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(resp.text().await?)
    }

    async fn search_artists(&self, name: &str) -> Result<Vec<SpotifyArtist>, EnrichError> {
        let url = format!(
            "{}/search?q={}&type=artist&limit={}",
            SPOTIFY_API,
            urlencoding::encode(name),
            SEARCH_LIMIT
        );
        let body = self.get(&url).await?;
        parse_artist_search(&body)
    }
}

#[async_trait]
impl TopTrackSource for SpotifyClient {
    async fn top_tracks(&self, query: &TrackQuery<'_>) -> Result<Vec<String>, EnrichError> {
        if self.token.is_none() {
            return Err(EnrichError::MissingToken);
        }

        let artist_id = match (self.matching, query.spotify_id) {
            (TrackArtistMatch::CrossRef, Some(id)) => id.to_string(),
            _ => {
                let candidates = self.search_artists(query.name).await?;
                pick_artist(&candidates, query.name, self.matching)
                    .ok_or_else(|| EnrichError::NoMatch(query.name.to_string()))?
                    .to_string()
            }
        };

        let url = format!(
            "{}/artists/{}/top-tracks?market={}",
            SPOTIFY_API,
            urlencoding::encode(&artist_id),
            urlencoding::encode(&self.market)
        );
        let body = self.get(&url).await?;
        parse_top_tracks(&body)
    }
}

pub async fn request_token(client: &Client, client_id: &str, client_secret: &str) -> Result<String, EnrichError> {
    let resp = client
        .post(SPOTIFY_TOKEN_URL)
        .basic_auth(client_id, Some(client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        return Err(EnrichError::Status {
            status: status.as_u16(),
            url: SPOTIFY_TOKEN_URL.to_string(),
        });
    }

    let body = resp.text().await?;
    let token: TokenResponse = serde_json::from_str(&body).map_err(|e| EnrichError::Parse(e.to_string()))?;
    Ok(token.access_token)
}

fn parse_artist_search(body: &str) -> Result<Vec<SpotifyArtist>, EnrichError> {
    let result: SpotifySearchResult =
        serde_json::from_str(body).map_err(|e| EnrichError::Parse(e.to_string()))?;
    Ok(result.artists.items)
}

fn parse_top_tracks(body: &str) -> Result<Vec<String>, EnrichError> {
    let result: SpotifyTopTracks = serde_json::from_str(body).map_err(|e| EnrichError::Parse(e.to_string()))?;
    Ok(result.tracks.into_iter().map(|t| t.name).collect())
}

/// Applies the configured matching heuristic to name-search candidates.
pub fn pick_artist<'a>(candidates: &'a [SpotifyArtist], name: &str, matching: TrackArtistMatch) -> Option<&'a str> {
    let picked = match matching {
        TrackArtistMatch::CrossRef | TrackArtistMatch::First => candidates.first(),
        TrackArtistMatch::Exact => {
            let wanted = name.trim().to_lowercase();
            candidates.iter().find(|a| a.name.trim().to_lowercase() == wanted)
        }
    };
    picked.map(|a| a.id.as_str())
}
