//! Kintetsu station timetables (eki.kintetsu.co.jp).
//!
//! Pages are Shift-JIS. A station's index page lists its directions in a
//! `<select>`; each direction is then fetched once per day type. Requests
//! for one station go out strictly one after another.

use std::sync::LazyLock;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::Url;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::client::{Charset, PageClient, parse_url, resolve_href, set_query_params};
use super::error::SourceError;
use super::html::{own_text, select_text, selector};
use super::source::{TimetableSource, collect_stations};
use super::types::{
    DayType, DestinationAbbreviations, DirectionResult, ParserResult, StationResult,
    TimetableEntry,
};

static STATION_NAME: LazyLock<Selector> = LazyLock::new(|| selector("div.sta h2"));
static DIRECTION_OPTION: LazyLock<Selector> =
    LazyLock::new(|| selector("select[name=d_select] option"));
static TIMETABLE_ROOT: LazyLock<Selector> = LazyLock::new(|| selector("#kstimetable"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector(".title h3"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("table tr"));
static HOUR_CELL: LazyLock<Selector> = LazyLock::new(|| selector("th"));
static ENTRY_LINK: LazyLock<Selector> = LazyLock::new(|| selector("div.k_1901 a"));
static MINUTE: LazyLock<Selector> = LazyLock::new(|| selector("span"));

/// Scraper for Kintetsu station timetables.
#[derive(Debug, Clone)]
pub struct KintetsuSource {
    client: PageClient,
    abbreviations: DestinationAbbreviations,
}

/// One entry of a station's direction list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DirectionOption {
    pub sl_code: String,
    pub direction: String,
    pub name: String,
}

/// A parsed station index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StationIndex {
    pub station: String,
    pub options: Vec<DirectionOption>,
}

/// A parsed direction page for one day type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DirectionPage {
    pub title: String,
    pub entries: Vec<TimetableEntry>,
}

impl KintetsuSource {
    pub const NAME: &'static str = "kintetsu";

    /// Create a source. Kintetsu pages print full destination names, so no
    /// abbreviations are expanded by default.
    pub fn new(client: PageClient) -> Self {
        Self {
            client,
            abbreviations: DestinationAbbreviations::new(),
        }
    }

    pub fn with_abbreviations(mut self, abbreviations: DestinationAbbreviations) -> Self {
        self.abbreviations = abbreviations;
        self
    }

    async fn fetch_station(&self, url: &str) -> Result<(String, StationResult), SourceError> {
        let base = parse_url(url)?;
        let index_url = index_url(&base);
        debug!(url = %index_url, "fetching station index");

        let html = self.client.fetch(&index_url, self.charset()).await?;
        let index = parse_station_index(&html, &index_url)?;

        let mut directions = StationResult::new();
        for option in &index.options {
            let mut result = DirectionResult::default();
            for day in DayType::ALL {
                match self.fetch_direction(&base, option, day).await {
                    Ok(entries) => *result.bucket_mut(day) = entries,
                    Err(e) => warn!(
                        station = %index.station,
                        direction = %option.name,
                        day = %day,
                        error = %e,
                        "direction fetch failed, leaving bucket empty"
                    ),
                }
            }
            directions.insert(option.name.clone(), result);
        }

        Ok((index.station, directions))
    }

    async fn fetch_direction(
        &self,
        base: &Url,
        option: &DirectionOption,
        day: DayType,
    ) -> Result<Vec<TimetableEntry>, SourceError> {
        let url = direction_url(base, option, day);
        debug!(
            sl_code = %option.sl_code,
            d = %option.direction,
            dw = day_code(day),
            "fetching direction"
        );

        let html = self.client.fetch(&url, self.charset()).await?;
        let page = parse_direction_page(&html, &url, &self.abbreviations)?;
        debug!(title = %page.title, day = %day, entries = page.entries.len(), "parsed direction");
        Ok(page.entries)
    }
}

impl TimetableSource for KintetsuSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn charset(&self) -> Charset {
        Charset::ShiftJis
    }

    fn fetch_all<'a>(
        &'a self,
        urls: &'a [String],
    ) -> BoxFuture<'a, Result<ParserResult, SourceError>> {
        collect_stations(self.name(), urls, |url| self.fetch_station(url)).boxed()
    }
}

/// `dw` query value: 0 for weekday, 1 for holiday.
fn day_code(day: DayType) -> &'static str {
    match day {
        DayType::Weekday => "0",
        DayType::Holiday => "1",
    }
}

/// The configured URL in detail mode, which carries the direction list.
pub(crate) fn index_url(base: &Url) -> Url {
    let mut url = base.clone();
    set_query_params(&mut url, &[("dmode", "detail"), ("pFlg", "0")]);
    url
}

/// URL of one direction's table for one day type.
pub(crate) fn direction_url(base: &Url, option: &DirectionOption, day: DayType) -> Url {
    let mut url = base.clone();
    set_query_params(
        &mut url,
        &[
            ("USR", "PC"),
            ("slCode", &option.sl_code),
            ("d", &option.direction),
            ("dw", day_code(day)),
            ("dmode", "detail"),
            ("pFlg", "0"),
        ],
    );
    url
}

/// Text up to and including the first `marker` that has something before it.
fn cut_after<'t>(text: &'t str, marker: &str) -> &'t str {
    text.match_indices(marker)
        .find(|&(i, _)| i > 0)
        .map_or(text, |(i, m)| &text[..i + m.len()])
}

/// Station name from the raw heading, e.g. `■八戸ノ里駅（奈良線）` → `八戸ノ里駅`.
pub(crate) fn station_name(raw: &str) -> String {
    let stripped = raw.replace('■', "");
    cut_after(stripped.trim(), "駅").to_string()
}

/// Parse a station index page into its name and direction list.
///
/// A page with no usable direction options has no timetable to offer.
pub(crate) fn parse_station_index(html: &str, page_url: &Url) -> Result<StationIndex, SourceError> {
    let document = Html::parse_document(html);

    let station = station_name(&select_text(document.root_element(), &STATION_NAME));
    if station.is_empty() {
        return Err(SourceError::MissingStationName {
            url: page_url.to_string(),
        });
    }

    let mut options = Vec::new();
    for option in document.select(&DIRECTION_OPTION) {
        let value = option.value().attr("value").unwrap_or_default();
        let Some((sl_code, direction)) = value.split_once(',') else {
            debug!(value, "skipping direction option without a code pair");
            continue;
        };
        let (sl_code, direction) = (sl_code.trim(), direction.trim());
        if sl_code.is_empty() || direction.is_empty() {
            debug!(value, "skipping direction option without a code pair");
            continue;
        }
        options.push(DirectionOption {
            sl_code: sl_code.to_string(),
            direction: direction.to_string(),
            name: option.text().collect::<String>().trim().to_string(),
        });
    }

    if options.is_empty() {
        return Err(SourceError::MissingTable {
            url: page_url.to_string(),
        });
    }

    Ok(StationIndex { station, options })
}

/// Parse one direction's table.
pub(crate) fn parse_direction_page(
    html: &str,
    page_url: &Url,
    abbreviations: &DestinationAbbreviations,
) -> Result<DirectionPage, SourceError> {
    let document = Html::parse_document(html);
    let root = document
        .select(&TIMETABLE_ROOT)
        .next()
        .ok_or_else(|| SourceError::MissingTable {
            url: page_url.to_string(),
        })?;

    let heading = select_text(root, &TITLE);
    let title = cut_after(&heading, "方面").to_string();

    let mut entries = Vec::new();
    for row in root.select(&ROW) {
        let hour = row
            .select(&HOUR_CELL)
            .next()
            .map(|th| th.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        if hour.is_empty() || !hour.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        for link in row.select(&ENTRY_LINK) {
            let text = own_text(link);
            let mut tokens = text.split(' ');
            let destination = tokens.next().unwrap_or_default();
            let train_type = tokens.next().unwrap_or_default();

            entries.push(TimetableEntry {
                hour: hour.clone(),
                minute: select_text(link, &MINUTE),
                destination: abbreviations.expand(destination),
                train_type: train_type.to_string(),
                detail_url: resolve_href(page_url, link.value().attr("href").unwrap_or_default()),
            });
        }
    }

    Ok(DirectionPage { title, entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"<html><body>
<div class="sta"><h2>■八戸ノ里駅（奈良線）</h2></div>
<form><select name="d_select">
  <option value="356-5,1">大阪難波方面</option>
  <option value="356-5,2">近鉄奈良方面</option>
  <option value="">選択してください</option>
</select></form>
</body></html>"#;

    const DIRECTION: &str = r#"<html><body>
<div id="kstimetable">
  <div class="title"><h3>大阪難波方面（平日）</h3></div>
  <table>
    <tr><th>時</th><td>分</td></tr>
    <tr><th>5</th><td>
      <div class="k_1901"><a href="/norikae/T7?tr=1"><span>12</span><br>大阪難波<br>普通</a></div>
      <div class="k_1901"><a href="/norikae/T7?tr=2"><span>40</span><br>大阪難波<br>準急</a></div>
    </td></tr>
    <tr><th>6</th><td>
      <div class="k_1901"><a href="/norikae/T7?tr=3"><span>03</span><br>尼崎<br>快速急行</a></div>
    </td></tr>
  </table>
</div>
</body></html>"#;

    fn base() -> Url {
        Url::parse("https://eki.kintetsu.co.jp/norikae/T5?USR=PC&slCode=356-5&d=1&dw=0").unwrap()
    }

    fn option() -> DirectionOption {
        DirectionOption {
            sl_code: "356-5".into(),
            direction: "2".into(),
            name: "近鉄奈良方面".into(),
        }
    }

    #[test]
    fn station_name_strips_markers_and_suffix() {
        assert_eq!(station_name("■八戸ノ里駅（奈良線）"), "八戸ノ里駅");
        assert_eq!(station_name("  ■河内小阪駅■ "), "河内小阪駅");
        assert_eq!(station_name("駅前広場駅"), "駅前広場駅");
        assert_eq!(station_name("布施"), "布施");
        assert_eq!(station_name("■"), "");
    }

    #[test]
    fn parses_index_options() {
        let index = parse_station_index(INDEX, &index_url(&base())).unwrap();
        assert_eq!(index.station, "八戸ノ里駅");
        assert_eq!(
            index.options,
            vec![
                DirectionOption {
                    sl_code: "356-5".into(),
                    direction: "1".into(),
                    name: "大阪難波方面".into(),
                },
                option(),
            ]
        );
    }

    #[test]
    fn index_without_options_is_missing_table() {
        let html = r#"<div class="sta"><h2>■八戸ノ里駅</h2></div>"#;
        let err = parse_station_index(html, &base()).unwrap_err();
        assert!(matches!(err, SourceError::MissingTable { .. }));
    }

    #[test]
    fn index_without_station_is_an_error() {
        let html = r#"<select name="d_select"><option value="1,1">x</option></select>"#;
        let err = parse_station_index(html, &base()).unwrap_err();
        assert!(matches!(err, SourceError::MissingStationName { .. }));
    }

    #[test]
    fn index_url_sets_detail_mode() {
        let url = index_url(&base());
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("dmode".into(), "detail".into())));
        assert!(query.contains(&("pFlg".into(), "0".into())));
        assert!(query.contains(&("slCode".into(), "356-5".into())));
    }

    #[test]
    fn direction_url_sets_codes_and_day() {
        let url = direction_url(&base(), &option(), DayType::Holiday);
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            query,
            vec![
                ("USR".into(), "PC".into()),
                ("slCode".into(), "356-5".into()),
                ("d".into(), "2".into()),
                ("dw".into(), "1".into()),
                ("dmode".into(), "detail".into()),
                ("pFlg".into(), "0".into()),
            ]
        );
        let weekday = direction_url(&base(), &option(), DayType::Weekday);
        assert!(weekday.query().unwrap().contains("dw=0"));
    }

    #[test]
    fn parses_direction_entries() {
        let url = direction_url(&base(), &option(), DayType::Weekday);
        let page = parse_direction_page(DIRECTION, &url, &DestinationAbbreviations::new()).unwrap();

        assert_eq!(page.title, "大阪難波方面");
        assert_eq!(page.entries.len(), 3);

        let first = &page.entries[0];
        assert_eq!(first.hour, "5");
        assert_eq!(first.minute, "12");
        assert_eq!(first.destination, "大阪難波");
        assert_eq!(first.train_type, "普通");
        assert_eq!(first.detail_url, "https://eki.kintetsu.co.jp/norikae/T7?tr=1");

        assert_eq!(page.entries[1].train_type, "準急");
        assert_eq!(page.entries[2].hour, "6");
        assert_eq!(page.entries[2].destination, "尼崎");
        assert_eq!(page.entries[2].train_type, "快速急行");
    }

    #[test]
    fn direction_abbreviations_are_applied() {
        let table = DestinationAbbreviations::from_pairs([("尼崎", "阪神尼崎")]);
        let page = parse_direction_page(DIRECTION, &base(), &table).unwrap();
        assert_eq!(page.entries[2].destination, "阪神尼崎");
        assert_eq!(page.entries[0].destination, "大阪難波");
    }

    #[test]
    fn direction_without_timetable_is_missing_table() {
        let err = parse_direction_page("<html></html>", &base(), &DestinationAbbreviations::new())
            .unwrap_err();
        assert!(matches!(err, SourceError::MissingTable { .. }));
    }

    #[test]
    fn rows_without_numeric_hour_are_skipped() {
        let html = r##"<div id="kstimetable"><table>
            <tr><th>備考</th><td><div class="k_1901"><a href="#"><span>99</span>x</a></div></td></tr>
            <tr><td>no header</td></tr>
        </table></div>"##;
        let page = parse_direction_page(html, &base(), &DestinationAbbreviations::new()).unwrap();
        assert!(page.entries.is_empty());
        assert_eq!(page.title, "");
    }
}
