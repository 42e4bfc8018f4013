//! Concert listing scraper.
//!
//! The selectors below follow the markup of the listing page. When the site
//! changes its layout they have to be updated with it.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::model::Event;

const CONTAINER: &str = ".grid-box-concerts-list";
const DATE_CELL: &str = ".ph-concerts-list-date";
const ARTIST_CELL: &str = ".ph-concerts-list-artist";
const LOCATION_CELL: &str = ".ph-concerts-list-location";

/// Why a single listing entry was skipped.
#[derive(Debug, Error, PartialEq)]
pub enum EntryError {
    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("unparseable date '{0}'")]
    BadDate(String),
}

#[derive(Debug, Default, PartialEq)]
pub struct Extraction {
    pub events: Vec<Event>,
    /// Entries dropped because they could not be parsed.
    pub skipped: usize,
}

#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn extract(&self, page_url: &str) -> Result<Extraction, PipelineError>;
}

pub struct ListingExtractor {
    client: Client,
}

impl ListingExtractor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ListingSource for ListingExtractor {
    async fn extract(&self, page_url: &str) -> Result<Extraction, PipelineError> {
        debug!(url = %page_url, "Fetching listing page");

        let resp = self
            .client
            .get(page_url)
            .send()
            .await
            .map_err(|e| PipelineError::ListingFetch(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::ListingFetch(format!(
                "HTTP {} for {}",
                status.as_u16(),
                page_url
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| PipelineError::ListingFetch(format!("Read body failed: {}", e)))?;

        parse_listing(&body)
    }
}

struct Selectors {
    container: Selector,
    date: Selector,
    artist: Selector,
    location: Selector,
}

impl Selectors {
    fn new() -> Result<Self, PipelineError> {
        Ok(Self {
            container: selector(CONTAINER)?,
            date: selector(DATE_CELL)?,
            artist: selector(ARTIST_CELL)?,
            location: selector(LOCATION_CELL)?,
        })
    }
}

fn selector(css: &'static str) -> Result<Selector, PipelineError> {
    Selector::parse(css).map_err(|e| PipelineError::ListingStructure(format!("bad selector {}: {:?}", css, e)))
}

/// Parses the listing page. A page without the concerts container is an
/// error; a broken entry inside it is only skipped.
pub fn parse_listing(html: &str) -> Result<Extraction, PipelineError> {
    let sel = Selectors::new()?;
    let document = Html::parse_document(html);

    let container = document
        .select(&sel.container)
        .next()
        .ok_or_else(|| PipelineError::ListingStructure(format!("no element matches '{}'", CONTAINER)))?;

    let mut extraction = Extraction::default();
    for (index, date_cell) in container.select(&sel.date).enumerate() {
        match parse_entry(date_cell, &sel) {
            Ok(event) => extraction.events.push(event),
            Err(e) => {
                warn!(entry = index + 1, reason = %e, "Skipping malformed listing entry");
                extraction.skipped += 1;
            }
        }
    }

    Ok(extraction)
}

/// Cells of one concert are the date cell's following siblings, up to the
/// next date cell. Months are a flat three-column grid; a per-row wrapper
/// works the same way.
fn parse_entry(date_cell: ElementRef<'_>, sel: &Selectors) -> Result<Event, EntryError> {
    let date = parse_date(&cell_text(date_cell))?;

    let mut artist_cell = None;
    let mut location_cell = None;
    for sibling in date_cell.next_siblings().filter_map(ElementRef::wrap) {
        if sel.date.matches(&sibling) {
            break;
        }
        artist_cell = artist_cell.or_else(|| find_cell(sibling, &sel.artist));
        location_cell = location_cell.or_else(|| find_cell(sibling, &sel.location));
    }

    let artist_name = artist_cell
        .and_then(|cell| artist_name(&cell_text(cell)))
        .ok_or(EntryError::MissingField("artist"))?;
    let venue = location_cell
        .and_then(|cell| venue_name(&cell_text(cell)))
        .ok_or(EntryError::MissingField("venue"))?;

    Ok(Event {
        date,
        venue,
        artist_name,
    })
}

fn find_cell<'a>(el: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    if selector.matches(&el) {
        Some(el)
    } else {
        el.select(selector).next()
    }
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Dates come as "Mi. 01.05.2024"; the weekday prefix is ignored.
pub fn parse_date(text: &str) -> Result<NaiveDate, EntryError> {
    text.split_whitespace()
        .find_map(|token| {
            NaiveDate::parse_from_str(token, "%d.%m.%Y")
                .or_else(|_| NaiveDate::parse_from_str(token, "%Y-%m-%d"))
                .ok()
        })
        .ok_or_else(|| EntryError::BadDate(text.to_string()))
}

/// "Band A live in Wien" -> "Band A"
pub fn artist_name(text: &str) -> Option<String> {
    let name = match text.find(" live") {
        Some(idx) => &text[..idx],
        None => text,
    };
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// "Arena Wien, Baumgasse 80" -> "Arena Wien"
pub fn venue_name(text: &str) -> Option<String> {
    let venue = text.split(',').next().unwrap_or_default().trim();
    (!venue.is_empty()).then(|| venue.to_string())
}
