//! `--artist` mode: show one artist's top tracks and whether they play in
//! town. Nothing is persisted.

use colored::*;
use tracing::warn;

use crate::config::{SpotifyConfig, TrackArtistMatch};
use crate::enrich::{TopTrackSource, TrackQuery};
use crate::error::{EnrichError, PipelineError};
use crate::listing::ListingSource;
use crate::model::Event;
use crate::pipeline::distinct_artist_names;

/// Minimum normalized similarity for a scraped name to count as the same artist.
pub const SIMILARITY_CUTOFF: f64 = 0.8;

#[derive(Debug, Default, PartialEq)]
pub struct LookupReport {
    /// `None` when the track service could not answer.
    pub tracks: Option<Vec<String>>,
    pub matched_name: Option<String>,
    pub concerts: Vec<Event>,
}

/// Best scoring name at or above `cutoff`, compared case-insensitively.
pub fn closest_match<'a>(query: &str, names: &'a [String], cutoff: f64) -> Option<&'a str> {
    let query = query.trim().to_lowercase();
    names
        .iter()
        .map(|name| (name, strsim::normalized_levenshtein(&query, &name.to_lowercase())))
        .filter(|(_, score)| *score >= cutoff)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name.as_str())
}

/// Lookup mode always takes the first name-search result, whatever the sync
/// run is configured with.
pub fn lookup_spotify_config(config: &SpotifyConfig) -> SpotifyConfig {
    SpotifyConfig {
        matching: TrackArtistMatch::First,
        ..config.clone()
    }
}

pub async fn lookup<L, T>(listing: &L, tracks: &T, listing_url: &str, artist: &str) -> Result<LookupReport, PipelineError>
where
    L: ListingSource,
    T: TopTrackSource,
{
    let query = TrackQuery {
        name: artist,
        spotify_id: None,
    };
    let tracks = match tracks.top_tracks(&query).await {
        Ok(tracks) => Some(tracks),
        Err(EnrichError::MissingToken) => None,
        Err(e) => {
            warn!(artist = %artist, error = %e, "Top tracks unavailable");
            None
        }
    };

    let extraction = listing.extract(listing_url).await?;
    let names = distinct_artist_names(&extraction.events);
    let matched_name = closest_match(artist, &names, SIMILARITY_CUTOFF).map(str::to_string);

    let concerts = match &matched_name {
        Some(name) => extraction
            .events
            .into_iter()
            .filter(|e| &e.artist_name == name)
            .collect(),
        None => Vec::new(),
    };

    Ok(LookupReport {
        tracks,
        matched_name,
        concerts,
    })
}

pub fn print_report(report: &LookupReport, artist: &str, city: &str) {
    println!("\n{} {}", "Top tracks:".white().bold(), artist.bright_cyan().bold());
    match &report.tracks {
        Some(tracks) if !tracks.is_empty() => {
            for (idx, title) in tracks.iter().enumerate() {
                println!("  {:>2}. {}", idx + 1, title);
            }
        }
        Some(_) => println!("  {} No tracks found", "✗".yellow()),
        None => println!("  {} Top tracks unavailable", "✗".red()),
    }

    println!();
    match &report.matched_name {
        Some(name) => {
            println!("{} {} plays in {}:", "✓".green(), name.bright_cyan(), city);
            for event in &report.concerts {
                println!("  {}  {}", event.date.format("%d.%m.%Y").to_string().bright_black(), event.venue);
            }
        }
        None => println!("{} {} has no upcoming concerts in {}", "✗".red(), artist, city),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::fakes::FakeTracks;
    use crate::listing::Extraction;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    struct StaticListing(Vec<Event>);

    #[async_trait]
    impl ListingSource for StaticListing {
        async fn extract(&self, _page_url: &str) -> Result<Extraction, PipelineError> {
            Ok(Extraction {
                events: self.0.clone(),
                skipped: 0,
            })
        }
    }

    fn event(date: &str, venue: &str, artist: &str) -> Event {
        Event {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            venue: venue.to_string(),
            artist_name: artist.to_string(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_closest_match_ignores_case_and_small_typos() {
        let scraped = names(&["Powerwolf", "Amon Amarth", "Sabaton"]);

        assert_eq!(closest_match("powerwolf", &scraped, SIMILARITY_CUTOFF), Some("Powerwolf"));
        assert_eq!(closest_match("Amon Amath", &scraped, SIMILARITY_CUTOFF), Some("Amon Amarth"));
        assert_eq!(closest_match("Slayer", &scraped, SIMILARITY_CUTOFF), None);
        assert_eq!(closest_match("Powerwolf", &[], SIMILARITY_CUTOFF), None);
    }

    #[test]
    fn test_lookup_uses_first_search_result() {
        let config = SpotifyConfig {
            token: Some("token".to_string()),
            client_id: None,
            client_secret: None,
            market: "AT".to_string(),
            matching: TrackArtistMatch::Exact,
        };

        let lookup_config = lookup_spotify_config(&config);

        assert_eq!(lookup_config.matching, TrackArtistMatch::First);
        assert_eq!(lookup_config.token.as_deref(), Some("token"));
        assert_eq!(lookup_config.market, "AT");
    }

    #[tokio::test]
    async fn test_lookup_collects_tracks_and_concerts() {
        let listing = StaticListing(vec![
            event("2024-05-01", "Arena Wien", "Band A"),
            event("2024-05-02", "Flex", "Band B"),
            event("2024-05-09", "Szene Wien", "Band A"),
        ]);
        let tracks = FakeTracks::default().with_tracks("band a", &["Track1", "Track2"]);

        let report = lookup(&listing, &tracks, "http://listing", "band a").await.unwrap();

        assert_eq!(report.tracks, Some(names(&["Track1", "Track2"])));
        assert_eq!(report.matched_name.as_deref(), Some("Band A"));
        let venues: Vec<_> = report.concerts.iter().map(|e| e.venue.as_str()).collect();
        assert_eq!(venues, vec!["Arena Wien", "Szene Wien"]);
    }

    #[tokio::test]
    async fn test_lookup_without_tracks_or_concerts() {
        let listing = StaticListing(vec![event("2024-05-01", "Arena Wien", "Band A")]);

        let report = lookup(&listing, &FakeTracks::default(), "http://listing", "Slayer")
            .await
            .unwrap();

        assert_eq!(report, LookupReport::default());
    }
}
