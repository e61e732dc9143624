//! The timetable service: cached operator data, snapshots and bus schedules.
//!
//! [`TimetableService`] is the crate's outer API. It owns one TTL cache
//! keyed by operator name, the source registry, the bus tables and an
//! optional snapshot store, and is meant to be created once and shared.
//! Operating status has a cache of its own with a shorter validity.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Local, NaiveDate, SecondsFormat, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::bus::{BusError, BusScheduleResponse, BusTimetable, parse_service_date};
use crate::cache::TtlCache;
use crate::config::ServiceConfig;
use crate::snapshot::{SnapshotError, SnapshotStore};
use crate::timetable::{
    OperationStatus, PageClient, ParserResult, SourceError, SourceRegistry, StatusSource,
    TimetableSource,
};

/// Errors surfaced by [`TimetableService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Bus(#[from] BusError),

    /// Offline mode and nothing on disk for the operator
    #[error("{operator}: offline and no snapshot available")]
    SnapshotMissing { operator: String },
}

const STATUS_CACHE_KEY: &str = "kintetsu";

/// Result of a cache clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClearConfirmation {
    pub message: String,
}

/// Every operator's data plus the bus projection.
///
/// Serializes as `{"<operator>": …, "kintetsuBus": …, "lastUpdated": …}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllData {
    /// `None` for an operator whose data could not be obtained.
    #[serde(flatten)]
    pub operators: BTreeMap<String, Option<Arc<ParserResult>>>,
    #[serde(rename = "kintetsuBus")]
    pub bus: Arc<ParserResult>,
    /// RFC 3339, UTC.
    pub last_updated: String,
}

/// Cached access to operator timetables and bus schedules.
pub struct TimetableService {
    config: ServiceConfig,
    registry: SourceRegistry,
    cache: TtlCache<ParserResult>,
    bus: Arc<BusTimetable>,
    snapshots: Option<SnapshotStore>,
    status: Option<StatusSource>,
    status_cache: TtlCache<OperationStatus>,
}

impl TimetableService {
    /// Create a service with the default JR and Kintetsu sources, the
    /// built-in bus tables and, if configured, the status page.
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        let registry = SourceRegistry::with_defaults(&config.client)?;
        let bus = BusTimetable::builtin()?;
        let status = match &config.status_url {
            Some(url) => Some(StatusSource::with_url(PageClient::new(&config.client)?, url.as_str())),
            None => None,
        };

        let service = Self::with_parts(config, registry, Arc::new(bus));
        Ok(match status {
            Some(status) => service.with_status_source(status),
            None => service,
        })
    }

    /// Create a service from explicit parts, without a status source.
    pub fn with_parts(config: ServiceConfig, registry: SourceRegistry, bus: Arc<BusTimetable>) -> Self {
        let cache = TtlCache::new(&config.cache);
        let status_cache = TtlCache::new(&config.status_cache);
        let snapshots = config.output_dir.clone().map(SnapshotStore::new);
        Self {
            config,
            registry,
            cache,
            bus,
            snapshots,
            status: None,
            status_cache,
        }
    }

    /// Use `source` for [`get_operation_status`](Self::get_operation_status).
    pub fn with_status_source(mut self, source: StatusSource) -> Self {
        self.status = Some(source);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn bus(&self) -> &BusTimetable {
        &self.bus
    }

    pub fn snapshots(&self) -> Option<&SnapshotStore> {
        self.snapshots.as_ref()
    }

    pub fn status_source(&self) -> Option<&StatusSource> {
        self.status.as_ref()
    }

    /// Timetables for `operator`, from cache when fresh.
    ///
    /// Returns `Ok(None)` if the operator is not configured, has no URLs, or
    /// has no registered source. Returns an error only when the live fetch
    /// failed and there is neither a cached value nor a snapshot.
    pub async fn get_operator_data(
        &self,
        operator: &str,
    ) -> Result<Option<Arc<ParserResult>>, ServiceError> {
        let key = operator.to_ascii_lowercase();
        let Some(operator_config) = self.config.operator(&key) else {
            warn!(operator, "operator is not configured");
            return Ok(None);
        };

        if self.config.offline {
            let data = self.cache.get(&key, || self.load_offline(&key)).await?;
            return Ok(Some(data));
        }

        if operator_config.urls.is_empty() {
            warn!(operator, "operator has no timetable URLs");
            return Ok(None);
        }
        let Some(source) = self.registry.get(&key) else {
            warn!(operator, "no timetable source registered for operator");
            return Ok(None);
        };

        let data = self
            .cache
            .get(&key, || {
                self.fetch_live(&key, source.as_ref(), &operator_config.urls)
            })
            .await?;
        Ok(Some(data))
    }

    /// Bus schedule for `date`, optionally narrowed to one stop.
    ///
    /// Partial dates are completed against today's local date. Fails only
    /// if `date` cannot be parsed.
    pub fn get_bus_schedule(
        &self,
        date: &str,
        stop_name: Option<&str>,
    ) -> Result<BusScheduleResponse, ServiceError> {
        self.bus_schedule_on(date, stop_name, Local::now().date_naive())
    }

    /// As [`get_bus_schedule`](Self::get_bus_schedule), with an explicit `today`.
    pub fn bus_schedule_on(
        &self,
        date: &str,
        stop_name: Option<&str>,
        today: NaiveDate,
    ) -> Result<BusScheduleResponse, ServiceError> {
        let date = parse_service_date(date, today)?;
        let stop_name = stop_name.filter(|name| !name.is_empty());
        let resolution = self.bus.schedule_for_date(date, stop_name);
        Ok(BusScheduleResponse::from_resolution(date, resolution))
    }

    /// Current operating status, from its own cache when fresh.
    ///
    /// Without a status source, or in offline mode, every operator is `None`
    /// and nothing is fetched. A failed scrape serves the previous status if
    /// there is one.
    pub async fn get_operation_status(&self) -> Result<Arc<OperationStatus>, ServiceError> {
        let Some(source) = &self.status else {
            return Ok(Arc::new(OperationStatus::unavailable()));
        };
        if self.config.offline {
            info!("offline mode, operating status not fetched");
            return Ok(Arc::new(OperationStatus::unavailable()));
        }

        let status = self
            .status_cache
            .get(STATUS_CACHE_KEY, || source.fetch())
            .await?;
        Ok(status)
    }

    /// Drop the cached timetable for `key`, or every timetable if `key` is
    /// `None`. The operating status cache is not affected.
    pub async fn clear_cache(&self, key: Option<&str>) -> ClearConfirmation {
        match key.filter(|key| !key.is_empty()) {
            Some(key) => {
                self.cache.clear(&key.to_ascii_lowercase()).await;
                info!(key, "cache cleared");
                ClearConfirmation {
                    message: format!("キャッシュ \"{key}\" をクリアしました"),
                }
            }
            None => {
                self.cache.clear_all();
                info!("all caches cleared");
                ClearConfirmation {
                    message: "すべてのキャッシュをクリアしました".to_string(),
                }
            }
        }
    }

    /// Fetch every configured operator concurrently, plus the bus projection.
    ///
    /// An operator that fails is logged and reported as `None`; it does not
    /// affect the others.
    pub async fn get_all_data(&self) -> AllData {
        let names: Vec<String> = self
            .config
            .operators
            .iter()
            .map(|operator| operator.name.to_ascii_lowercase())
            .collect();

        let results = join_all(names.iter().map(|name| self.get_operator_data(name))).await;

        let operators = names
            .into_iter()
            .zip(results)
            .map(|(name, result)| {
                let data = result.unwrap_or_else(|e| {
                    warn!(operator = %name, error = %e, "operator data unavailable");
                    None
                });
                (name, data)
            })
            .collect();

        AllData {
            operators,
            bus: self.bus.projection(),
            last_updated: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Populate the cache for every configured operator. Never fails.
    pub async fn warm_up(&self) {
        info!(operators = self.config.operators.len(), "warming timetable cache");
        let data = self.get_all_data().await;
        let loaded = data.operators.values().filter(|data| data.is_some()).count();
        info!(loaded, total = data.operators.len(), "timetable cache warmed");
    }

    async fn fetch_live(
        &self,
        operator: &str,
        source: &dyn TimetableSource,
        urls: &[String],
    ) -> Result<ParserResult, ServiceError> {
        match source.fetch_all(urls).await {
            Ok(data) => {
                if let Some(store) = &self.snapshots {
                    write_snapshot(store.clone(), operator, data.clone()).await;
                }
                Ok(data)
            }
            Err(fetch_err) => {
                warn!(operator, error = %fetch_err, "live fetch failed, trying snapshot");
                match self.read_snapshot(operator) {
                    Ok(Some(data)) => {
                        info!(operator, stations = data.len(), "serving snapshot");
                        Ok(data)
                    }
                    Ok(None) => Err(fetch_err.into()),
                    Err(e) => {
                        warn!(operator, error = %e, "snapshot unreadable");
                        Err(fetch_err.into())
                    }
                }
            }
        }
    }

    async fn load_offline(&self, operator: &str) -> Result<ParserResult, ServiceError> {
        info!(operator, "offline mode, reading snapshot");
        self.read_snapshot(operator)?
            .ok_or_else(|| ServiceError::SnapshotMissing {
                operator: operator.to_string(),
            })
    }

    fn read_snapshot(&self, operator: &str) -> Result<Option<ParserResult>, SnapshotError> {
        match &self.snapshots {
            Some(store) => store.load(operator),
            None => Ok(None),
        }
    }
}

/// Save a snapshot off the async runtime. Failures are logged only.
async fn write_snapshot(store: SnapshotStore, operator: &str, data: ParserResult) {
    let name = operator.to_string();
    match tokio::task::spawn_blocking(move || store.save(&name, &data)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(operator, error = %e, "failed to write snapshot"),
        Err(e) => warn!(operator, error = %e, "snapshot writer panicked"),
    }
}
