//! JR West station timetable pages (timetable.jr-odekake.net).
//!
//! Each URL is one station and one direction, served as UTF-8. The pages do
//! not distinguish weekday and holiday service, so every entry goes in the
//! weekday bucket.

use std::sync::LazyLock;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::Url;
use scraper::{Html, Selector};
use tracing::debug;

use super::client::{Charset, PageClient, parse_url, resolve_href};
use super::error::SourceError;
use super::html::{select_text, selector};
use super::source::{TimetableSource, collect_stations};
use super::types::{
    DestinationAbbreviations, DirectionResult, ParserResult, StationResult, TimetableEntry,
};

static STATION_NAME: LazyLock<Selector> = LazyLock::new(|| selector(".route-name01"));
static DIRECTION_NAME: LazyLock<Selector> = LazyLock::new(|| selector(".route-name03"));
static TIMETABLE: LazyLock<Selector> = LazyLock::new(|| selector(".pc-time-tbl-wrap table"));
static BODY_ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr.body-row"));
static HOUR: LazyLock<Selector> = LazyLock::new(|| selector("td.hour"));
static MINUTE_ITEM: LazyLock<Selector> = LazyLock::new(|| selector("td.minutes .minute-item"));
static MINUTE: LazyLock<Selector> = LazyLock::new(|| selector(".minute-box .minute"));
static DESTINATION: LazyLock<Selector> = LazyLock::new(|| selector(".minute-box .destination"));
static TRAIN_TYPE: LazyLock<Selector> = LazyLock::new(|| selector(".minute-box .train-type span"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));

/// Scraper for JR West station timetables.
#[derive(Debug, Clone)]
pub struct JrSource {
    client: PageClient,
    abbreviations: DestinationAbbreviations,
}

impl JrSource {
    pub const NAME: &'static str = "jr";

    /// Create a source using the standard destination abbreviations.
    pub fn new(client: PageClient) -> Self {
        Self {
            client,
            abbreviations: DestinationAbbreviations::jr_default(),
        }
    }

    /// Replace the destination abbreviation table.
    pub fn with_abbreviations(mut self, abbreviations: DestinationAbbreviations) -> Self {
        self.abbreviations = abbreviations;
        self
    }

    async fn fetch_station(&self, url: &str) -> Result<(String, StationResult), SourceError> {
        let page_url = parse_url(url)?;
        let html = self.client.fetch(&page_url, self.charset()).await?;
        parse_station_page(&html, &page_url, &self.abbreviations)
    }
}

impl TimetableSource for JrSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn charset(&self) -> Charset {
        Charset::Utf8
    }

    fn fetch_all<'a>(
        &'a self,
        urls: &'a [String],
    ) -> BoxFuture<'a, Result<ParserResult, SourceError>> {
        collect_stations(self.name(), urls, |url| self.fetch_station(url)).boxed()
    }
}

/// Parse one station page into its station name and single direction.
pub(crate) fn parse_station_page(
    html: &str,
    page_url: &Url,
    abbreviations: &DestinationAbbreviations,
) -> Result<(String, StationResult), SourceError> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let station = select_text(root, &STATION_NAME);
    if station.is_empty() {
        return Err(SourceError::MissingStationName {
            url: page_url.to_string(),
        });
    }
    let direction = select_text(root, &DIRECTION_NAME);

    let table = document
        .select(&TIMETABLE)
        .next()
        .ok_or_else(|| SourceError::MissingTable {
            url: page_url.to_string(),
        })?;

    let mut entries = Vec::new();
    for row in table.select(&BODY_ROW) {
        let hour = select_text(row, &HOUR);
        for item in row.select(&MINUTE_ITEM) {
            let href = item
                .select(&LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .unwrap_or_default();

            entries.push(TimetableEntry {
                hour: hour.clone(),
                minute: select_text(item, &MINUTE),
                destination: abbreviations.expand(&select_text(item, &DESTINATION)),
                train_type: select_text(item, &TRAIN_TYPE),
                detail_url: resolve_href(page_url, href),
            });
        }
    }

    debug!(station = %station, direction = %direction, entries = entries.len(), "parsed JR page");

    let mut directions = StationResult::new();
    directions.insert(direction, DirectionResult::weekday_only(entries));
    Ok((station, directions))
}
