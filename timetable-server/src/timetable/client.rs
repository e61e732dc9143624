//! HTTP client for operator timetable pages.
//!
//! Pages are fetched as raw bytes and decoded with the charset the source
//! declares. Bytes that are malformed in that charset are an error rather
//! than replacement characters.

use std::time::Duration;

use chrono::{DateTime, Utc};
use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};
use reqwest::Url;
use reqwest::header::{ACCEPT_LANGUAGE, DATE, HeaderMap, HeaderValue};
use tracing::debug;

use super::error::SourceError;

/// Browser User-Agent sent with every request; some origins reject bare clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36";

const DEFAULT_ACCEPT_LANGUAGE: &str = "ja,en-US;q=0.9,en;q=0.8";

/// Character encoding of a source's pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    ShiftJis,
}

impl Charset {
    pub fn encoding(self) -> &'static Encoding {
        match self {
            Charset::Utf8 => UTF_8,
            Charset::ShiftJis => SHIFT_JIS,
        }
    }

    /// WHATWG label, e.g. `Shift_JIS`.
    pub fn name(self) -> &'static str {
        self.encoding().name()
    }

    /// Decode `bytes`, returning `None` if any sequence is malformed.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        let (text, had_errors) = self.encoding().decode_without_bom_handling(bytes);
        if had_errors {
            None
        } else {
            Some(text.into_owned())
        }
    }
}

/// Configuration for the page client.
#[derive(Debug, Clone)]
pub struct PageClientConfig {
    /// User-Agent header value
    pub user_agent: String,
    /// Accept-Language header value
    pub accept_language: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl PageClientConfig {
    /// Create a config with a browser User-Agent and a 30 second timeout.
    pub fn new() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            timeout_secs: 30,
        }
    }

    /// Set a custom User-Agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl Default for PageClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetches and decodes timetable pages.
#[derive(Debug, Clone)]
pub struct PageClient {
    http: reqwest::Client,
}

impl PageClient {
    /// Create a new page client with the given configuration.
    pub fn new(config: &PageClientConfig) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        let accept_language = HeaderValue::from_str(&config.accept_language).map_err(|_| {
            SourceError::InvalidHeader {
                name: "Accept-Language",
            }
        })?;
        headers.insert(ACCEPT_LANGUAGE, accept_language);

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { http })
    }

    /// GET `url` and decode the body as `charset`.
    pub async fn fetch(&self, url: &Url, charset: Charset) -> Result<String, SourceError> {
        Ok(self.fetch_page(url, charset).await?.body)
    }

    /// As [`fetch`](Self::fetch), also returning the response's `Date` header.
    pub async fn fetch_page(&self, url: &Url, charset: Charset) -> Result<FetchedPage, SourceError> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let date = response
            .headers()
            .get(DATE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_http_date);

        let bytes = response.bytes().await?;
        debug!(url = %url, bytes = bytes.len(), charset = charset.name(), "page fetched");

        let body = charset.decode(&bytes).ok_or_else(|| SourceError::Decode {
            url: url.to_string(),
            charset: charset.name(),
        })?;
        Ok(FetchedPage { body, date })
    }
}

/// A decoded page and the origin's clock at the time it was served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub body: String,
    pub date: Option<DateTime<Utc>>,
}

/// Parse an HTTP `Date` header (`Wed, 15 Oct 2025 03:04:05 GMT`).
pub(crate) fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// Parse a configured URL.
pub(crate) fn parse_url(url: &str) -> Result<Url, SourceError> {
    Url::parse(url).map_err(|e| SourceError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Set query parameters on `url`, replacing any existing values with the same name.
pub(crate) fn set_query_params(url: &mut Url, params: &[(&str, &str)]) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !params.iter().any(|(name, _)| key == name))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .extend_pairs(params);
}

/// Resolve `href` against the page it appeared on.
pub(crate) fn resolve_href(page_url: &Url, href: &str) -> String {
    page_url
        .join(href)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| page_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = PageClientConfig::default();
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.accept_language, DEFAULT_ACCEPT_LANGUAGE);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn config_builder() {
        let config = PageClientConfig::new()
            .with_user_agent("test-agent")
            .with_timeout(5);
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn client_creation() {
        assert!(PageClient::new(&PageClientConfig::default()).is_ok());
    }

    #[test]
    fn decode_shift_jis() {
        let (bytes, _, _) = SHIFT_JIS.encode("八戸ノ里駅");
        assert_eq!(Charset::ShiftJis.decode(&bytes).as_deref(), Some("八戸ノ里駅"));
    }

    #[test]
    fn decode_rejects_truncated_shift_jis() {
        // 0x94 is a lead byte with no trail byte.
        assert_eq!(Charset::ShiftJis.decode(&[0x41, 0x94]), None);
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        assert_eq!(Charset::Utf8.decode(&[0x41, 0xff, 0xfe]), None);
        assert_eq!(Charset::Utf8.decode("放出".as_bytes()).as_deref(), Some("放出"));
    }

    #[test]
    fn shift_jis_bytes_are_not_valid_utf8() {
        let (bytes, _, _) = SHIFT_JIS.encode("奈良方面");
        assert_eq!(Charset::Utf8.decode(&bytes), None);
    }

    #[test]
    fn charset_names() {
        assert_eq!(Charset::Utf8.name(), "UTF-8");
        assert_eq!(Charset::ShiftJis.name(), "Shift_JIS");
    }

    #[test]
    fn set_query_params_replaces_existing_values() {
        let mut url =
            Url::parse("https://eki.kintetsu.co.jp/norikae/T5?USR=PC&slCode=356-5&d=1&dw=0")
                .unwrap();
        set_query_params(&mut url, &[("dw", "1"), ("dmode", "detail")]);

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("USR".into(), "PC".into()),
                ("slCode".into(), "356-5".into()),
                ("d".into(), "1".into()),
                ("dw".into(), "1".into()),
                ("dmode".into(), "detail".into()),
            ]
        );
    }

    #[test]
    fn resolve_href_makes_absolute_urls() {
        let page = Url::parse("https://timetable.jr-odekake.net/station-timetable/8220073001").unwrap();
        assert_eq!(
            resolve_href(&page, "/train-timetable/123"),
            "https://timetable.jr-odekake.net/train-timetable/123"
        );
        assert_eq!(
            resolve_href(&page, "https://example.com/x"),
            "https://example.com/x"
        );
        assert_eq!(resolve_href(&page, ""), page.to_string());
    }

    #[test]
    fn http_dates() {
        let date = parse_http_date("Wed, 15 Oct 2025 03:04:05 GMT").unwrap();
        assert_eq!(date.to_rfc3339(), "2025-10-15T03:04:05+00:00");
        assert_eq!(parse_http_date("yesterday"), None);
    }
}
