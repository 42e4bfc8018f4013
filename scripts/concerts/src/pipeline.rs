use colored::*;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

use crate::enrich::{ArtistEnricher, ArtistMetadataSource, TopTrackSource};
use crate::error::PipelineError;
use crate::listing::ListingSource;
use crate::model::{ArtistRecord, Event, RecordSet};
use crate::store::{ConcertStore, WriteSummary};

const PHASES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Extracting,
    Deduplicating,
    Enriching,
    Persisting,
    Done,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub events_extracted: usize,
    pub entries_skipped: usize,
    pub artists_resolved: usize,
    pub artists_unresolved: usize,
    pub unresolved_names: Vec<String>,
    pub written: WriteSummary,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  {} {}", "Events:".white(), self.events_extracted)?;
        writeln!(f, "  {} {}", "Skipped entries:".yellow(), self.entries_skipped)?;
        writeln!(f, "  {} {}", "Resolved artists:".green(), self.artists_resolved)?;
        writeln!(f, "  {} {}", "Unresolved artists:".red(), self.artists_unresolved)?;
        write!(f, "  {} {}", "Written:".white(), self.written)?;
        if !self.unresolved_names.is_empty() {
            write!(f, "\n\n{}", "Unresolved Artists:".red().bold())?;
            for name in &self.unresolved_names {
                write!(f, "\n  {} {}", "✗".red(), name.bright_white())?;
            }
        }
        Ok(())
    }
}

/// Unique artist names in the order they first appear.
pub fn distinct_artist_names(events: &[Event]) -> Vec<String> {
    let mut seen = HashSet::new();
    events
        .iter()
        .filter(|e| seen.insert(e.artist_name.as_str()))
        .map(|e| e.artist_name.clone())
        .collect()
}

fn banner(step: usize, title: &str) {
    println!(
        "\n{} {}",
        format!("[{}/{}]", step, PHASES).bright_blue().bold(),
        title.white().bold()
    );
}

/// Extract, dedupe, enrich and persist one listing page.
pub struct Pipeline<L, M, T, S> {
    listing: L,
    enricher: ArtistEnricher<M, T>,
    store: S,
    listing_url: String,
    artist_limit: Option<usize>,
    state: RunState,
}

impl<L, M, T, S> Pipeline<L, M, T, S>
where
    L: ListingSource,
    M: ArtistMetadataSource,
    T: TopTrackSource,
    S: ConcertStore,
{
    pub fn new(listing: L, enricher: ArtistEnricher<M, T>, store: S, listing_url: &str) -> Self {
        Self {
            listing,
            enricher,
            store,
            listing_url: listing_url.to_string(),
            artist_limit: None,
            state: RunState::Extracting,
        }
    }

    /// Enrich only the first `limit` distinct artists. Events are still all
    /// persisted.
    pub fn with_artist_limit(mut self, limit: usize) -> Self {
        self.artist_limit = Some(limit);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "Pipeline state");
        self.state = next;
    }

    /// Ends in `Done` or `Failed`. Per-artist enrichment problems never fail
    /// the run.
    pub async fn run(&mut self) -> Result<RunSummary, PipelineError> {
        match self.execute().await {
            Ok(summary) => {
                self.transition(RunState::Done);
                Ok(summary)
            }
            Err(e) => {
                self.transition(RunState::Failed);
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();

        self.transition(RunState::Extracting);
        banner(1, "Extracting listing");
        let extraction = self.listing.extract(&self.listing_url).await?;
        summary.events_extracted = extraction.events.len();
        summary.entries_skipped = extraction.skipped;
        println!(
            "  {} {} events ({} skipped)",
            "✓".green(),
            extraction.events.len(),
            extraction.skipped
        );

        self.transition(RunState::Deduplicating);
        banner(2, "Collecting artists");
        let mut names = distinct_artist_names(&extraction.events);
        println!("  {} {} distinct artists", "✓".green(), names.len());
        if let Some(limit) = self.artist_limit {
            if limit < names.len() {
                info!(limit, total = names.len(), "Limiting enrichment");
                names.truncate(limit);
            }
        }

        self.transition(RunState::Enriching);
        banner(3, "Enriching artists");
        let total = names.len();
        let mut artists = Vec::with_capacity(total);
        for (idx, name) in names.iter().enumerate() {
            println!(
                "  {} {}",
                format!("({}/{})", idx + 1, total).bright_black(),
                name.bright_cyan()
            );
            let record = self.enricher.enrich(name).await;
            report_artist(&record);
            if record.is_resolved() {
                summary.artists_resolved += 1;
            } else {
                summary.artists_unresolved += 1;
                summary.unresolved_names.push(record.name().to_string());
            }
            artists.push(record);
        }

        self.transition(RunState::Persisting);
        banner(4, "Persisting");
        let records = RecordSet::assemble(extraction.events, &artists);
        self.store.init_schema().await?;
        summary.written = self.store.write(&records).await?;
        println!("  {} {} rows", "✓".green(), summary.written.total());

        Ok(summary)
    }
}

fn report_artist(record: &ArtistRecord) {
    match record {
        ArtistRecord::Resolved {
            external_id,
            area,
            releases,
            tracks,
            ..
        } => {
            let count = |list: &Option<Vec<String>>| match list {
                Some(items) => items.len().to_string(),
                None => "-".to_string(),
            };
            println!(
                "    {} {} ({}), {} releases, {} tracks",
                "✓".green(),
                external_id.bright_black(),
                area.as_deref().unwrap_or("unknown area"),
                count(releases),
                count(tracks)
            );
        }
        ArtistRecord::Unresolved { .. } => println!("    {} unresolved", "✗".red()),
    }
}
