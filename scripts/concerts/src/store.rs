use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

use crate::model::{ArtistRow, RecordSet};

/// Rows touched per table by one `write`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub events: u64,
    pub artists: u64,
    pub releases: u64,
    pub tracks: u64,
}

impl WriteSummary {
    pub fn total(&self) -> u64 {
        self.events + self.artists + self.releases + self.tracks
    }
}

impl fmt::Display for WriteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events, {} artists, {} releases, {} tracks",
            self.events, self.artists, self.releases, self.tracks
        )
    }
}

#[async_trait]
pub trait ConcertStore: Send + Sync {
    /// Creates schema and tables if missing. Safe to call on every run.
    async fn init_schema(&self) -> Result<(), sqlx::Error>;

    /// Writes artists before their releases and tracks. Statements run one by
    /// one; the first failure aborts the write.
    async fn write(&self, records: &RecordSet) -> Result<WriteSummary, sqlx::Error>;
}

pub struct PgStore {
    pool: PgPool,
    schema: String,
}

impl PgStore {
    /// `schema` must already be a validated identifier.
    pub async fn connect(options: &PgConnectOptions, schema: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;
        Ok(Self::from_pool(pool, schema))
    }

    pub fn from_pool(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
        }
    }

    fn schema_statements(&self) -> Vec<String> {
        let s = &self.schema;
        vec![
            format!("CREATE SCHEMA IF NOT EXISTS {s}"),
            format!(
                r#"CREATE TABLE IF NOT EXISTS {s}.artists (
                     id TEXT PRIMARY KEY,
                     artist_name TEXT NOT NULL,
                     mb_id TEXT UNIQUE,
                     area TEXT,
                     updated_at TIMESTAMP NOT NULL
                   )"#
            ),
            // Unresolved artists are identified by name only.
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS artists_unresolved_name_key \
                 ON {s}.artists (artist_name) WHERE mb_id IS NULL"
            ),
            format!(
                r#"CREATE TABLE IF NOT EXISTS {s}.releases (
                     id TEXT PRIMARY KEY,
                     artist_id TEXT NOT NULL REFERENCES {s}.artists(id) ON DELETE CASCADE,
                     title TEXT NOT NULL,
                     UNIQUE (artist_id, title)
                   )"#
            ),
            format!(
                r#"CREATE TABLE IF NOT EXISTS {s}.tracks (
                     id TEXT PRIMARY KEY,
                     artist_id TEXT NOT NULL REFERENCES {s}.artists(id) ON DELETE CASCADE,
                     title TEXT NOT NULL,
                     rank INTEGER NOT NULL CHECK (rank > 0),
                     UNIQUE (artist_id, rank)
                   )"#
            ),
            format!(
                r#"CREATE TABLE IF NOT EXISTS {s}.events (
                     id TEXT PRIMARY KEY,
                     event_date DATE NOT NULL,
                     venue TEXT NOT NULL,
                     artist_name TEXT NOT NULL,
                     UNIQUE (event_date, venue, artist_name)
                   )"#
            ),
        ]
    }

    /// Upserts on `mb_id` and returns the row id. A leftover unresolved row
    /// with the same name (from an earlier run) is removed.
    async fn upsert_resolved_artist(&self, artist: &ArtistRow, mb_id: &str) -> Result<String, sqlx::Error> {
        let s = &self.schema;
        let id = cuid2::create_id();
        let now = Utc::now().naive_utc();

        let row = sqlx::query(&format!(
            r#"INSERT INTO {s}.artists AS a (id, artist_name, mb_id, area, updated_at)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (mb_id) DO UPDATE SET
                 artist_name = EXCLUDED.artist_name,
                 area = COALESCE(EXCLUDED.area, a.area),
                 updated_at = EXCLUDED.updated_at
               RETURNING id"#
        ))
        .bind(&id)
        .bind(&artist.name)
        .bind(mb_id)
        .bind(&artist.area)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(&format!(
            "DELETE FROM {s}.artists WHERE mb_id IS NULL AND artist_name = $1"
        ))
        .bind(&artist.name)
        .execute(&self.pool)
        .await?;

        Ok(row.get::<String, _>("id"))
    }

    /// Skipped when the name already belongs to a resolved artist, so a
    /// transient lookup failure does not duplicate it.
    async fn upsert_unresolved_artist(&self, artist: &ArtistRow) -> Result<u64, sqlx::Error> {
        let s = &self.schema;
        let now = Utc::now().naive_utc();

        let result = sqlx::query(&format!(
            r#"INSERT INTO {s}.artists (id, artist_name, mb_id, area, updated_at)
               SELECT $1, $2, NULL, NULL, $3
               WHERE NOT EXISTS (
                 SELECT 1 FROM {s}.artists WHERE artist_name = $2 AND mb_id IS NOT NULL
               )
               ON CONFLICT (artist_name) WHERE mb_id IS NULL DO UPDATE SET
                 updated_at = EXCLUDED.updated_at"#
        ))
        .bind(cuid2::create_id())
        .bind(&artist.name)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ConcertStore for PgStore {
    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        for statement in self.schema_statements() {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        debug!(schema = %self.schema, "Schema ready");
        Ok(())
    }

    async fn write(&self, records: &RecordSet) -> Result<WriteSummary, sqlx::Error> {
        let s = &self.schema;
        let mut summary = WriteSummary::default();

        // mb_id -> artists.id
        let mut artist_ids: HashMap<&str, String> = HashMap::new();
        let mut refresh_tracks: HashSet<&str> = HashSet::new();

        for artist in &records.artists {
            match artist.external_id.as_deref() {
                // One row per MusicBrainz id; the first name wins.
                Some(mb_id) if artist_ids.contains_key(mb_id) => continue,
                Some(mb_id) => {
                    let id = self.upsert_resolved_artist(artist, mb_id).await?;
                    artist_ids.insert(mb_id, id);
                    if artist.refresh_tracks {
                        refresh_tracks.insert(mb_id);
                    }
                    summary.artists += 1;
                }
                None => {
                    summary.artists += self.upsert_unresolved_artist(artist).await?;
                }
            }
        }

        for release in &records.releases {
            let Some(artist_id) = artist_ids.get(release.artist_external_id.as_str()) else {
                continue;
            };
            let result = sqlx::query(&format!(
                r#"INSERT INTO {s}.releases (id, artist_id, title)
                   VALUES ($1, $2, $3)
                   ON CONFLICT (artist_id, title) DO NOTHING"#
            ))
            .bind(cuid2::create_id())
            .bind(artist_id)
            .bind(&release.title)
            .execute(&self.pool)
            .await?;
            summary.releases += result.rows_affected();
        }

        // Replace the top-track list of every artist that got a fresh one.
        for mb_id in &refresh_tracks {
            if let Some(artist_id) = artist_ids.get(mb_id) {
                sqlx::query(&format!("DELETE FROM {s}.tracks WHERE artist_id = $1"))
                    .bind(artist_id)
                    .execute(&self.pool)
                    .await?;
            }
        }

        for track in &records.tracks {
            let Some(artist_id) = artist_ids.get(track.artist_external_id.as_str()) else {
                continue;
            };
            let result = sqlx::query(&format!(
                r#"INSERT INTO {s}.tracks (id, artist_id, title, rank)
                   VALUES ($1, $2, $3, $4)
                   ON CONFLICT (artist_id, rank) DO UPDATE SET title = EXCLUDED.title"#
            ))
            .bind(cuid2::create_id())
            .bind(artist_id)
            .bind(&track.title)
            .bind(track.rank)
            .execute(&self.pool)
            .await?;
            summary.tracks += result.rows_affected();
        }

        for event in &records.events {
            let result = sqlx::query(&format!(
                r#"INSERT INTO {s}.events (id, event_date, venue, artist_name)
                   VALUES ($1, $2, $3, $4)
                   ON CONFLICT (event_date, venue, artist_name) DO NOTHING"#
            ))
            .bind(cuid2::create_id())
            .bind(event.date)
            .bind(&event.venue)
            .bind(&event.artist_name)
            .execute(&self.pool)
            .await?;
            summary.events += result.rows_affected();
        }

        Ok(summary)
    }
}
