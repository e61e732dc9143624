//! Kintetsu operating status (www.kintetsu.jp/unkou).
//!
//! A single Shift-JIS page carries a free-text summary of current service
//! ("平常どおり運転しています" and the like) in a large `<font>` element, and a
//! "as of" clock in `#servertime`. The response `Date` header is preferred
//! over the page clock when present.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, TimeDelta, Timelike, Utc};
use reqwest::Url;
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::debug;

use super::client::{Charset, PageClient, parse_url};
use super::error::SourceError;
use super::html::{select_text, selector};

/// Live operating status page.
pub const KINTETSU_STATUS_URL: &str = "https://www.kintetsu.jp/unkou/unkou.html";

static STATUS: LazyLock<Selector> = LazyLock::new(|| selector(r#"font[size="+1"]"#));
static SERVER_TIME: LazyLock<Selector> = LazyLock::new(|| selector("#servertime"));

/// Japan Standard Time has no daylight saving.
const JST_OFFSET_HOURS: i64 = 9;

/// Status summary for one operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorStatus {
    /// When the status was published, e.g. `2025年10月15日 12:04現在`.
    #[serde(rename = "servertime")]
    pub server_time: String,
    pub status: String,
}

/// Status of every operator that publishes one.
///
/// JR has no scraped status page and is always `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationStatus {
    pub kintetsu: Option<OperatorStatus>,
    pub jr: Option<OperatorStatus>,
}

impl OperationStatus {
    /// No status for any operator.
    pub fn unavailable() -> Self {
        Self {
            kintetsu: None,
            jr: None,
        }
    }
}

/// Scraper for the Kintetsu operating status page.
#[derive(Debug, Clone)]
pub struct StatusSource {
    client: PageClient,
    url: String,
}

impl StatusSource {
    /// Create a source for the public status page.
    pub fn new(client: PageClient) -> Self {
        Self::with_url(client, KINTETSU_STATUS_URL)
    }

    pub fn with_url(client: PageClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and parse the status page.
    pub async fn fetch(&self) -> Result<OperationStatus, SourceError> {
        let url: Url = parse_url(&self.url)?;
        let page = self.client.fetch_page(&url, Charset::ShiftJis).await?;
        let kintetsu = parse_status_page(&page.body, page.date);
        debug!(url = %url, status = %kintetsu.status, "operating status fetched");
        Ok(OperationStatus {
            kintetsu: Some(kintetsu),
            jr: None,
        })
    }
}

/// Extract the status text, stamping it with `served_at` if known and the
/// page's own clock otherwise.
pub(crate) fn parse_status_page(html: &str, served_at: Option<DateTime<Utc>>) -> OperatorStatus {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let server_time = match served_at {
        Some(date) => format_server_time(date),
        None => select_text(root, &SERVER_TIME),
    };

    OperatorStatus {
        server_time,
        status: select_text(root, &STATUS),
    }
}

/// `2025年10月15日 9:05現在`, in Japan time.
pub(crate) fn format_server_time(date: DateTime<Utc>) -> String {
    let local = date.naive_utc() + TimeDelta::hours(JST_OFFSET_HOURS);
    format!(
        "{}年{}月{}日 {}:{:02}現在",
        local.year(),
        local.month(),
        local.day(),
        local.hour(),
        local.minute()
    )
}
