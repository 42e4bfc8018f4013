mod config;
mod enrich;
mod error;
mod listing;
mod lookup;
mod model;
mod pipeline;
mod store;

use clap::Parser;
use colored::*;
use reqwest::Client;
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::enrich::musicbrainz::MusicBrainzClient;
use crate::enrich::spotify::SpotifyClient;
use crate::enrich::ArtistEnricher;
use crate::error::PipelineError;
use crate::listing::ListingExtractor;
use crate::pipeline::Pipeline;
use crate::store::PgStore;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "concerts-sync", about = "Scrape concert listings, enrich artists and store them in Postgres")]
struct Args {
    /// Show this artist's top tracks and local concerts instead of syncing
    #[arg(long)]
    artist: Option<String>,

    /// Enrich only the first N distinct artists (0 = all)
    #[arg(long, default_value = "0")]
    limit: usize,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let result = match Config::from_env().map_err(PipelineError::from) {
        Ok(config) => match args.artist.as_deref() {
            Some(artist) => run_lookup(&config, artist).await,
            None => run_sync(&config, args.limit).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e.to_string().bright_red());
            ExitCode::FAILURE
        }
    }
}

fn http_client(config: &Config) -> Result<Client, PipelineError> {
    Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|e| PipelineError::HttpClient(e.to_string()))
}

async fn run_sync(config: &Config, limit: usize) -> Result<(), PipelineError> {
    println!("Concert Listings Sync");
    println!("=====================");
    println!("City      : {}", config.city);
    println!("Listing   : {}", config.listing_url);
    println!("Schema    : {}", config.schema);
    if limit > 0 {
        println!("Limit     : {} artists", limit);
    }

    let client = http_client(config)?;
    let spotify = SpotifyClient::connect(client.clone(), &config.spotify).await;
    println!(
        "Spotify   : {}",
        if spotify.has_token() { "enabled" } else { "disabled" }
    );

    let store = PgStore::connect(&config.database, &config.schema).await?;
    let enricher = ArtistEnricher::new(MusicBrainzClient::new(client.clone(), &config.musicbrainz), spotify);

    let mut pipeline = Pipeline::new(ListingExtractor::new(client), enricher, store, &config.listing_url);
    if limit > 0 {
        pipeline = pipeline.with_artist_limit(limit);
    }

    let start = Instant::now();
    let summary = pipeline.run().await?;

    println!();
    println!("{}", "═".repeat(60).bright_black());
    println!();
    println!("{} {:.1}s", "Completed in:".white().bold(), start.elapsed().as_secs_f64());
    println!("{}", summary);

    Ok(())
}

async fn run_lookup(config: &Config, artist: &str) -> Result<(), PipelineError> {
    let client = http_client(config)?;
    let spotify = SpotifyClient::connect(client.clone(), &lookup::lookup_spotify_config(&config.spotify)).await;
    let listing = ListingExtractor::new(client);

    let report = lookup::lookup(&listing, &spotify, &config.listing_url, artist).await?;
    lookup::print_report(&report, artist, &config.city);

    Ok(())
}
