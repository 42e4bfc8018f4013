//! Artist enrichment: name → MusicBrainz id → area/releases → Spotify top tracks.
//!
//! Each external service sits behind a small trait so the orchestrator never
//! sees HTTP. Failures here are always per artist and never abort a run.

pub mod musicbrainz;
pub mod spotify;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::EnrichError;
use crate::model::{ArtistDetail, ArtistRecord};

#[async_trait]
pub trait ArtistMetadataSource: Send + Sync {
    /// Id of the first candidate returned by the name search, if any.
    async fn search_artist(&self, name: &str) -> Result<Option<String>, EnrichError>;

    async fn artist_detail(&self, external_id: &str) -> Result<ArtistDetail, EnrichError>;
}

/// Input for a top-tracks lookup.
#[derive(Debug, Clone, Copy)]
pub struct TrackQuery<'a> {
    pub name: &'a str,
    /// Cross-referenced id in the track service's own id space.
    pub spotify_id: Option<&'a str>,
}

#[async_trait]
pub trait TopTrackSource: Send + Sync {
    /// Track titles, best ranked first.
    async fn top_tracks(&self, query: &TrackQuery<'_>) -> Result<Vec<String>, EnrichError>;
}

pub struct ArtistEnricher<M, T> {
    metadata: M,
    tracks: T,
}

impl<M, T> ArtistEnricher<M, T>
where
    M: ArtistMetadataSource,
    T: TopTrackSource,
{
    pub fn new(metadata: M, tracks: T) -> Self {
        Self { metadata, tracks }
    }

    #[cfg(test)]
    pub(crate) fn metadata(&self) -> &M {
        &self.metadata
    }

    /// The first search result is taken as the artist, with no local
    /// disambiguation between similarly named artists.
    pub async fn enrich(&self, name: &str) -> ArtistRecord {
        let external_id = match self.metadata.search_artist(name).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(artist = %name, "No MusicBrainz match");
                return ArtistRecord::Unresolved { name: name.to_string() };
            }
            Err(e) => {
                warn!(artist = %name, error = %e, "MusicBrainz search failed");
                return ArtistRecord::Unresolved { name: name.to_string() };
            }
        };

        let detail = match self.metadata.artist_detail(&external_id).await {
            Ok(detail) => Some(detail),
            Err(e) => {
                warn!(artist = %name, mbid = %external_id, error = %e, "MusicBrainz lookup failed");
                None
            }
        };

        let query = TrackQuery {
            name,
            spotify_id: detail.as_ref().and_then(|d| d.spotify_id.as_deref()),
        };
        let tracks = match self.tracks.top_tracks(&query).await {
            Ok(tracks) => Some(tracks),
            // Already reported once at start-up.
            Err(EnrichError::MissingToken) => {
                debug!(artist = %name, "Skipping top tracks, no token");
                None
            }
            Err(e) => {
                warn!(artist = %name, error = %e, "Top tracks unavailable");
                None
            }
        };

        let (area, releases) = match detail {
            Some(d) => (d.area, Some(d.releases)),
            None => (None, None),
        };

        ArtistRecord::Resolved {
            name: name.to_string(),
            external_id,
            area,
            releases,
            tracks,
        }
    }
}
