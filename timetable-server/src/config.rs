//! Service configuration: operators, snapshot location, cache and client settings.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::cache::CacheConfig;
use crate::timetable::{KINTETSU_STATUS_URL, PageClientConfig};

/// Default directory for `<operator>-train.json` snapshots.
pub const DEFAULT_OUTPUT_DIR: &str = "./dist";

/// How long an operating status is served before it is scraped again.
pub const DEFAULT_STATUS_VALIDITY: Duration = Duration::from_secs(10 * 60);

/// An operator and the station timetable URLs to scrape for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    pub name: String,
    pub urls: Vec<String>,
}

impl OperatorConfig {
    pub fn new(name: impl Into<String>, urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }

    /// Kintetsu Nara line stations near Kindai University.
    pub fn kintetsu_default() -> Self {
        Self::new(
            "kintetsu",
            [
                "https://eki.kintetsu.co.jp/norikae/T5?USR=PC&slCode=356-5&d=1&dw=0",
                "https://eki.kintetsu.co.jp/norikae/T5?USR=PC&slCode=350-8&d=1&dw=0",
            ],
        )
    }

    /// JR Osaka-Higashi line, both directions.
    pub fn jr_default() -> Self {
        Self::new(
            "jr",
            [
                "https://timetable.jr-odekake.net/station-timetable/8220073001",
                "https://timetable.jr-odekake.net/station-timetable/8220073002",
            ],
        )
    }
}

/// Configuration for [`TimetableService`](crate::service::TimetableService).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub operators: Vec<OperatorConfig>,
    /// Where snapshots are written and read. `None` disables snapshots.
    pub output_dir: Option<PathBuf>,
    /// Serve snapshots only and never fetch live pages.
    pub offline: bool,
    pub cache: CacheConfig,
    pub client: PageClientConfig,
    /// Operating status page. `None` disables status lookups.
    pub status_url: Option<String>,
    /// Cache for the operating status, separate from timetables.
    pub status_cache: CacheConfig,
}

impl ServiceConfig {
    /// A config with no operators and no snapshot directory.
    pub fn new() -> Self {
        Self {
            operators: Vec::new(),
            output_dir: None,
            offline: false,
            cache: CacheConfig::default(),
            client: PageClientConfig::default(),
            status_url: None,
            status_cache: CacheConfig::new(DEFAULT_STATUS_VALIDITY),
        }
    }

    /// Add an operator, replacing any existing one with the same name.
    pub fn with_operator(mut self, operator: OperatorConfig) -> Self {
        self.operators
            .retain(|existing| !existing.name.eq_ignore_ascii_case(&operator.name));
        self.operators.push(operator);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_client(mut self, client: PageClientConfig) -> Self {
        self.client = client;
        self
    }

    pub fn with_status_url(mut self, url: impl Into<String>) -> Self {
        self.status_url = Some(url.into());
        self
    }

    pub fn with_status_cache(mut self, cache: CacheConfig) -> Self {
        self.status_cache = cache;
        self
    }

    /// Look up an operator by name (case-insensitive).
    pub fn operator(&self, name: &str) -> Option<&OperatorConfig> {
        self.operators
            .iter()
            .find(|operator| operator.name.eq_ignore_ascii_case(name))
    }

    /// Apply `CACHE_VALIDITY_MS`, `TIMETABLE_OUTPUT_DIR` and `DEBUG_MODE`
    /// from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`. Values that do not parse are ignored.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("CACHE_VALIDITY_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.cache.validity = Duration::from_millis(ms),
                Err(e) => warn!(value = %raw, error = %e, "ignoring invalid CACHE_VALIDITY_MS"),
            }
        }

        if let Some(dir) = lookup("TIMETABLE_OUTPUT_DIR") {
            if dir.trim().is_empty() {
                warn!("ignoring empty TIMETABLE_OUTPUT_DIR");
            } else {
                self.output_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(raw) = lookup("DEBUG_MODE") {
            self.offline = raw.trim() == "true";
        }

        self
    }
}

impl Default for ServiceConfig {
    /// Both rail operators, snapshots in `./dist`, Kintetsu status page.
    fn default() -> Self {
        Self::new()
            .with_operator(OperatorConfig::kintetsu_default())
            .with_operator(OperatorConfig::jr_default())
            .with_output_dir(DEFAULT_OUTPUT_DIR)
            .with_status_url(KINTETSU_STATUS_URL)
    }
}
