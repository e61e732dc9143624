//! The source trait and the registry that selects a source per operator.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use super::client::{Charset, PageClient, PageClientConfig};
use super::error::SourceError;
use super::jr::JrSource;
use super::kintetsu::KintetsuSource;
use super::types::{ParserResult, StationResult, merge_station};

/// An operator whose timetable pages can be scraped into a [`ParserResult`].
pub trait TimetableSource: Send + Sync {
    /// Operator name used as registry and cache key.
    fn name(&self) -> &str;

    /// Charset the operator's pages are served in.
    fn charset(&self) -> Charset;

    /// Fetch and parse every URL.
    ///
    /// URLs that fail are logged and skipped. Fails with
    /// [`SourceError::NoStations`] only when no URL produced a station.
    fn fetch_all<'a>(
        &'a self,
        urls: &'a [String],
    ) -> BoxFuture<'a, Result<ParserResult, SourceError>>;
}

/// Sources keyed by operator name.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn TimetableSource>>,
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the JR and Kintetsu sources sharing one page client.
    pub fn with_defaults(config: &PageClientConfig) -> Result<Self, SourceError> {
        let client = PageClient::new(config)?;
        let mut registry = Self::new();
        registry.register(Arc::new(JrSource::new(client.clone())));
        registry.register(Arc::new(KintetsuSource::new(client)));
        Ok(registry)
    }

    /// Add a source under its own name, replacing any previous one.
    pub fn register(&mut self, source: Arc<dyn TimetableSource>) {
        self.sources
            .insert(source.name().to_ascii_lowercase(), source);
    }

    /// Look up a source by operator name (case-insensitive).
    pub fn get(&self, operator: &str) -> Option<Arc<dyn TimetableSource>> {
        self.sources.get(&operator.to_ascii_lowercase()).cloned()
    }

    /// Registered operator names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Run `fetch_station` over `urls` one at a time, merging stations and
/// skipping failures.
pub(crate) async fn collect_stations<'a, F, Fut>(
    operator: &str,
    urls: &'a [String],
    mut fetch_station: F,
) -> Result<ParserResult, SourceError>
where
    F: FnMut(&'a str) -> Fut,
    Fut: Future<Output = Result<(String, StationResult), SourceError>>,
{
    info!(operator, urls = urls.len(), "fetching timetables");

    let mut result = ParserResult::new();
    for url in urls {
        match fetch_station(url).await {
            Ok((station, directions)) => {
                info!(operator, station = %station, directions = directions.len(), "station fetched");
                merge_station(&mut result, station, directions);
            }
            Err(e) => warn!(operator, url = %url, error = %e, "skipping timetable page"),
        }
    }

    if result.is_empty() {
        return Err(SourceError::NoStations {
            operator: operator.to_string(),
        });
    }

    info!(operator, stations = result.len(), "timetables fetched");
    Ok(result)
}
