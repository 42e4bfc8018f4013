use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

/// One row of the listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub date: NaiveDate,
    pub venue: String,
    pub artist_name: String,
}

/// Result of enriching one scraped artist name.
///
/// `None` on a resolved artist's field means the call that produces it failed;
/// an empty list means the API answered with nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtistRecord {
    Resolved {
        name: String,
        external_id: String,
        area: Option<String>,
        releases: Option<Vec<String>>,
        tracks: Option<Vec<String>>,
    },
    Unresolved {
        name: String,
    },
}

impl ArtistRecord {
    pub fn name(&self) -> &str {
        match self {
            Self::Resolved { name, .. } | Self::Unresolved { name } => name,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

/// What the MusicBrainz lookup by id yields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtistDetail {
    pub area: Option<String>,
    pub releases: Vec<String>,
    pub spotify_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRow {
    pub name: String,
    pub external_id: Option<String>,
    pub area: Option<String>,
    /// Whether this run fetched a top-track list for the artist.
    pub refresh_tracks: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseRow {
    pub artist_external_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackRow {
    pub artist_external_id: String,
    pub title: String,
    pub rank: i32,
}

/// Flat rows ready for the store, in foreign-key friendly shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    pub events: Vec<Event>,
    pub artists: Vec<ArtistRow>,
    pub releases: Vec<ReleaseRow>,
    pub tracks: Vec<TrackRow>,
}

impl RecordSet {
    /// Flattens enriched artists into rows. Scraped names that resolved to the
    /// same external id share one artist row: the first name is kept, release
    /// titles are merged and the first fetched top-track list is used.
    pub fn assemble(events: Vec<Event>, artists: &[ArtistRecord]) -> Self {
        let mut set = RecordSet {
            events,
            ..Default::default()
        };

        // external id -> index into set.artists
        let mut by_id: HashMap<&str, usize> = HashMap::new();
        // Release groups often repeat a title (reissues, regional editions).
        let mut seen_releases: HashSet<(&str, &str)> = HashSet::new();

        for artist in artists {
            match artist {
                ArtistRecord::Unresolved { name } => set.artists.push(ArtistRow {
                    name: name.clone(),
                    external_id: None,
                    area: None,
                    refresh_tracks: false,
                }),
                ArtistRecord::Resolved {
                    name,
                    external_id,
                    area,
                    releases,
                    tracks,
                } => {
                    let idx = match by_id.get(external_id.as_str()) {
                        Some(&idx) => {
                            let row = &mut set.artists[idx];
                            if row.area.is_none() {
                                row.area = area.clone();
                            }
                            idx
                        }
                        None => {
                            by_id.insert(external_id.as_str(), set.artists.len());
                            set.artists.push(ArtistRow {
                                name: name.clone(),
                                external_id: Some(external_id.clone()),
                                area: area.clone(),
                                refresh_tracks: false,
                            });
                            set.artists.len() - 1
                        }
                    };

                    for title in releases.iter().flatten() {
                        if seen_releases.insert((external_id.as_str(), title.as_str())) {
                            set.releases.push(ReleaseRow {
                                artist_external_id: external_id.clone(),
                                title: title.clone(),
                            });
                        }
                    }

                    if let Some(tracks) = tracks {
                        if !set.artists[idx].refresh_tracks {
                            set.artists[idx].refresh_tracks = true;
                            for (position, title) in tracks.iter().enumerate() {
                                set.tracks.push(TrackRow {
                                    artist_external_id: external_id.clone(),
                                    title: title.clone(),
                                    rank: position as i32 + 1,
                                });
                            }
                        }
                    }
                }
            }
        }

        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(date: &str, venue: &str, artist: &str) -> Event {
        Event {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            venue: venue.to_string(),
            artist_name: artist.to_string(),
        }
    }

    #[test]
    fn test_assemble_flattens_resolved_artist() {
        let events = vec![event("2024-05-01", "Arena Wien", "Band A")];
        let artists = vec![ArtistRecord::Resolved {
            name: "Band A".to_string(),
            external_id: "X1".to_string(),
            area: Some("Austria".to_string()),
            releases: Some(vec!["Album1".to_string(), "Album2".to_string(), "Album1".to_string()]),
            tracks: Some(vec!["Track1".to_string(), "Track2".to_string()]),
        }];

        let set = RecordSet::assemble(events, &artists);

        assert_eq!(set.events.len(), 1);
        assert_eq!(set.artists.len(), 1);
        assert_eq!(set.artists[0].external_id.as_deref(), Some("X1"));
        assert!(set.artists[0].refresh_tracks);
        let titles: Vec<_> = set.releases.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Album1", "Album2"]);
        let ranks: Vec<_> = set.tracks.iter().map(|t| (t.title.as_str(), t.rank)).collect();
        assert_eq!(ranks, vec![("Track1", 1), ("Track2", 2)]);
    }

    #[test]
    fn test_unresolved_artist_gets_no_releases_or_tracks() {
        let artists = vec![ArtistRecord::Unresolved {
            name: "Nobody Knows".to_string(),
        }];

        let set = RecordSet::assemble(Vec::new(), &artists);

        assert_eq!(set.artists.len(), 1);
        assert!(set.artists[0].external_id.is_none());
        assert!(!set.artists[0].refresh_tracks);
        assert!(set.releases.is_empty());
        assert!(set.tracks.is_empty());
    }

    #[test]
    fn test_absent_tracks_do_not_refresh() {
        let artists = vec![ArtistRecord::Resolved {
            name: "Band B".to_string(),
            external_id: "X2".to_string(),
            area: None,
            releases: None,
            tracks: None,
        }];

        let set = RecordSet::assemble(Vec::new(), &artists);

        assert!(!set.artists[0].refresh_tracks);
        assert!(set.releases.is_empty());
        assert!(set.tracks.is_empty());
    }

    #[test]
    fn test_names_sharing_an_external_id_merge_into_one_artist() {
        let artists = vec![
            ArtistRecord::Resolved {
                name: "Band A".to_string(),
                external_id: "X1".to_string(),
                area: None,
                releases: Some(vec!["Album1".to_string()]),
                tracks: Some(vec!["Track1".to_string(), "Track2".to_string()]),
            },
            ArtistRecord::Resolved {
                name: "Band A & Friends".to_string(),
                external_id: "X1".to_string(),
                area: Some("Austria".to_string()),
                releases: Some(vec!["Album1".to_string(), "Live in Wien".to_string()]),
                tracks: Some(vec!["Track1".to_string(), "Track2".to_string()]),
            },
        ];

        let set = RecordSet::assemble(Vec::new(), &artists);

        assert_eq!(
            set.artists,
            vec![ArtistRow {
                name: "Band A".to_string(),
                external_id: Some("X1".to_string()),
                area: Some("Austria".to_string()),
                refresh_tracks: true,
            }]
        );
        let titles: Vec<_> = set.releases.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Album1", "Live in Wien"]);
        let ranks: Vec<_> = set.tracks.iter().map(|t| t.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
    }
}
