//! Date and stop resolution over the bus reference tables.
//!
//! Everything here is synchronous and side-effect free. The routes are
//! also projected once into a [`ParserResult`] so bus data can be consumed
//! the same way as scraped rail data.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use super::data::{builtin_calendar, builtin_routes};
use super::error::BusError;
use super::types::{BusOperationCalendar, BusRoute, BusStopSchedule, HourSchedule, OperationType};
use crate::timetable::{DirectionResult, ParserResult, TimetableEntry};

/// Train type label carried by every projected bus entry.
pub const BUS_TRAIN_TYPE: &str = "バス";

const NO_SERVICE_MESSAGE: &str = "この日は運行していません";

/// Calendar, routes, and their eager timetable projection.
#[derive(Debug, Clone)]
pub struct BusTimetable {
    calendar: BusOperationCalendar,
    routes: Vec<BusRoute>,
    projection: Arc<ParserResult>,
}

/// Outcome of resolving a date (and optional stop) against the tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleResolution {
    /// The calendar has no service on the date.
    NoService,
    /// The first stop with the requested name, in route order.
    Stop {
        route_name: String,
        stop_name: String,
        operation_type: OperationType,
        schedule: Vec<HourSchedule>,
    },
    /// Service runs, but no route has a stop with the requested name.
    StopNotFound {
        operation_type: OperationType,
        stop_name: String,
    },
    /// Every stop of every route.
    AllStops {
        operation_type: OperationType,
        stops: Vec<StopScheduleView>,
    },
}

/// One stop's schedule for a single operation type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopScheduleView {
    pub stop_name: String,
    pub route_name: String,
    pub schedule: Vec<HourSchedule>,
}

/// JSON body for a bus schedule request.
///
/// `operationType` is always present (`null` on no-service days); the other
/// fields appear only when they apply.
///
/// `date` is the resolved service date as `YYYY-MM-DD`, not the caller's
/// input: `"04-16"` comes back as e.g. `"2025-04-16"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusScheduleResponse {
    /// Normalized ISO date the schedule was resolved for.
    pub date: String,
    pub operation_type: Option<OperationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Vec<HourSchedule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stops: Option<Vec<StopScheduleView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BusTimetable {
    pub fn new(calendar: BusOperationCalendar, routes: Vec<BusRoute>) -> Self {
        let projection = Arc::new(project(&routes));
        Self {
            calendar,
            routes,
            projection,
        }
    }

    /// The compiled-in Kintetsu bus tables.
    pub fn builtin() -> Result<Self, BusError> {
        Ok(Self::new(builtin_calendar()?, builtin_routes()?))
    }

    pub fn calendar(&self) -> &BusOperationCalendar {
        &self.calendar
    }

    pub fn routes(&self) -> &[BusRoute] {
        &self.routes
    }

    /// Every stop as a station, with one direction per route serving it.
    pub fn projection(&self) -> Arc<ParserResult> {
        Arc::clone(&self.projection)
    }

    pub fn operation_type(&self, date: NaiveDate) -> Option<OperationType> {
        self.calendar.get(date)
    }

    /// First stop named `stop_name`, scanning routes in definition order.
    pub fn find_stop(&self, stop_name: &str) -> Option<(&BusRoute, &BusStopSchedule)> {
        self.routes.iter().find_map(|route| {
            route
                .stops
                .iter()
                .find(|stop| stop.stop_name == stop_name)
                .map(|stop| (route, stop))
        })
    }

    pub fn schedule_for_date(&self, date: NaiveDate, stop_name: Option<&str>) -> ScheduleResolution {
        let Some(operation_type) = self.operation_type(date) else {
            return ScheduleResolution::NoService;
        };

        match stop_name {
            Some(stop_name) => match self.find_stop(stop_name) {
                Some((route, stop)) => ScheduleResolution::Stop {
                    route_name: route.name.clone(),
                    stop_name: stop.stop_name.clone(),
                    operation_type,
                    schedule: stop.schedule.for_operation(operation_type).to_vec(),
                },
                None => ScheduleResolution::StopNotFound {
                    operation_type,
                    stop_name: stop_name.to_string(),
                },
            },
            None => ScheduleResolution::AllStops {
                operation_type,
                stops: self
                    .routes
                    .iter()
                    .flat_map(|route| {
                        route.stops.iter().map(move |stop| StopScheduleView {
                            stop_name: stop.stop_name.clone(),
                            route_name: route.name.clone(),
                            schedule: stop.schedule.for_operation(operation_type).to_vec(),
                        })
                    })
                    .collect(),
            },
        }
    }
}

impl BusScheduleResponse {
    pub fn from_resolution(date: NaiveDate, resolution: ScheduleResolution) -> Self {
        let mut response = Self {
            date: date.format("%Y-%m-%d").to_string(),
            operation_type: None,
            stop_name: None,
            route_name: None,
            schedule: None,
            stops: None,
            error: None,
            message: None,
        };

        match resolution {
            ScheduleResolution::NoService => {
                response.message = Some(NO_SERVICE_MESSAGE.to_string());
            }
            ScheduleResolution::Stop {
                route_name,
                stop_name,
                operation_type,
                schedule,
            } => {
                response.operation_type = Some(operation_type);
                response.stop_name = Some(stop_name);
                response.route_name = Some(route_name);
                response.schedule = Some(schedule);
            }
            ScheduleResolution::StopNotFound {
                operation_type,
                stop_name,
            } => {
                response.operation_type = Some(operation_type);
                response.error = Some(format!("{stop_name}の時刻表データが見つかりません"));
            }
            ScheduleResolution::AllStops {
                operation_type,
                stops,
            } => {
                response.operation_type = Some(operation_type);
                response.stops = Some(stops);
            }
        }

        response
    }
}

/// Normalize a requested service date.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM` (first of the month) and `MM-DD` (in
/// `today`'s year).
///
/// # Examples
///
/// ```
/// use timetable_server::bus::parse_service_date;
/// use chrono::NaiveDate;
///
/// let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
///
/// assert_eq!(
///     parse_service_date("2025-04-16", today).unwrap(),
///     NaiveDate::from_ymd_opt(2025, 4, 16).unwrap()
/// );
/// assert_eq!(
///     parse_service_date("12-24", today).unwrap(),
///     NaiveDate::from_ymd_opt(2025, 12, 24).unwrap()
/// );
/// assert_eq!(
///     parse_service_date("2026-03", today).unwrap(),
///     NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
/// );
/// assert!(parse_service_date("2025-02-30", today).is_err());
/// ```
pub fn parse_service_date(input: &str, today: NaiveDate) -> Result<NaiveDate, BusError> {
    let invalid = || BusError::InvalidDate {
        input: input.to_string(),
    };

    let parts: Vec<&str> = input.trim().split('-').collect();
    let (year, month, day) = match parts.as_slice() {
        [y, m, d] => (numeric(y), numeric(m), numeric(d)),
        [y, m] if y.len() == 4 => (numeric(y), numeric(m), Some(1)),
        [m, d] => (Some(today.year()), numeric(m), numeric(d)),
        _ => return Err(invalid()),
    };

    match (year, month, day) {
        (Some(year), Some(month), Some(day)) => {
            NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

/// Digits-only parse; rejects signs and whitespace.
fn numeric<T: FromStr>(part: &str) -> Option<T> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// One entry per departure, with the route name as destination.
pub fn flatten_hours(hours: &[HourSchedule], route_name: &str) -> Vec<TimetableEntry> {
    hours
        .iter()
        .flat_map(|hour| {
            hour.minutes.iter().map(move |minute| TimetableEntry {
                hour: hour.hour.to_string(),
                minute: minute.to_string(),
                destination: route_name.to_string(),
                train_type: BUS_TRAIN_TYPE.to_string(),
                detail_url: String::new(),
            })
        })
        .collect()
}

/// Regroup entries into hour → minutes. Entries with non-numeric times are skipped.
pub fn group_by_hour(entries: &[TimetableEntry]) -> BTreeMap<u32, BTreeSet<u32>> {
    let mut hours: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
    for entry in entries {
        if let (Ok(hour), Ok(minute)) = (entry.hour.parse::<u32>(), entry.minute.parse::<u32>()) {
            hours.entry(hour).or_default().insert(minute);
        }
    }
    hours
}

fn project(routes: &[BusRoute]) -> ParserResult {
    let mut result = ParserResult::new();
    for route in routes {
        for stop in &route.stops {
            let mut direction = DirectionResult::default();
            for operation in OperationType::ALL {
                *direction.bucket_mut(operation.day_type()) =
                    flatten_hours(stop.schedule.for_operation(operation), &route.name);
            }
            result
                .entry(stop.stop_name.clone())
                .or_default()
                .insert(route.name.clone(), direction);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::types::StopSchedules;
    use crate::timetable::DayType;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn builtin() -> BusTimetable {
        BusTimetable::builtin().unwrap()
    }

    fn hour(hour: u32, minutes: &[u32]) -> HourSchedule {
        HourSchedule {
            hour,
            minutes: minutes.to_vec(),
        }
    }

    fn stop(name: &str, a: Vec<HourSchedule>, b: Vec<HourSchedule>) -> BusStopSchedule {
        BusStopSchedule {
            stop_name: name.to_string(),
            schedule: StopSchedules { a, b },
        }
    }

    /// Two routes sharing a stop name with different schedules.
    fn shared_stop_table() -> BusTimetable {
        let mut calendar = BusOperationCalendar::new();
        calendar.insert(date(2025, 5, 1), Some(OperationType::A));
        calendar.insert(date(2025, 5, 3), Some(OperationType::B));
        calendar.insert(date(2025, 5, 4), None);

        let routes = vec![
            BusRoute {
                name: "東行".into(),
                stops: vec![
                    stop("西口", vec![hour(6, &[0, 30])], vec![hour(7, &[0])]),
                    stop("中央", vec![hour(6, &[10, 40])], vec![hour(7, &[10])]),
                ],
            },
            BusRoute {
                name: "西行".into(),
                stops: vec![
                    stop("中央", vec![hour(9, &[5])], vec![hour(10, &[5])]),
                    stop("西口", vec![hour(9, &[15])], vec![hour(10, &[15])]),
                ],
            },
        ];
        BusTimetable::new(calendar, routes)
    }

    #[test]
    fn scenario_weekday_stop_schedule() {
        let table = builtin();
        let day = date(2025, 4, 16);
        assert_eq!(table.operation_type(day), Some(OperationType::A));

        let ScheduleResolution::Stop {
            route_name,
            schedule,
            operation_type,
            ..
        } = table.schedule_for_date(day, Some("八戸ノ里駅前"))
        else {
            panic!("expected a stop schedule");
        };
        assert_eq!(route_name, "八戸ノ里駅前→近畿大学東門前");
        assert_eq!(operation_type, OperationType::A);
        let seven = schedule.iter().find(|h| h.hour == 7).unwrap();
        assert_eq!(seven.minutes, vec![20, 30, 43, 55]);
    }

    #[test]
    fn scenario_date_outside_calendar_has_no_service() {
        let table = builtin();
        let day = date(2030, 1, 1);
        assert_eq!(table.operation_type(day), None);
        assert_eq!(table.schedule_for_date(day, None), ScheduleResolution::NoService);
        assert_eq!(
            table.schedule_for_date(day, Some("八戸ノ里駅前")),
            ScheduleResolution::NoService
        );
        assert_eq!(
            table.schedule_for_date(day, Some("存在しない停留所")),
            ScheduleResolution::NoService
        );
    }

    #[test]
    fn explicit_no_service_day() {
        let table = builtin();
        let day = date(2025, 4, 1);
        assert!(table.calendar().contains(day));
        assert_eq!(table.schedule_for_date(day, None), ScheduleResolution::NoService);
    }

    #[test]
    fn shared_stop_resolves_to_first_route() {
        let table = builtin();
        let resolution = table.schedule_for_date(date(2025, 4, 16), Some("近畿大学東門前"));
        assert!(matches!(
            resolution,
            ScheduleResolution::Stop { ref route_name, .. } if route_name == "八戸ノ里駅前→近畿大学東門前"
        ));

        let table = shared_stop_table();
        let ScheduleResolution::Stop {
            route_name,
            schedule,
            ..
        } = table.schedule_for_date(date(2025, 5, 1), Some("中央"))
        else {
            panic!("expected a stop schedule");
        };
        assert_eq!(route_name, "東行");
        assert_eq!(schedule, vec![hour(6, &[10, 40])]);
    }

    #[test]
    fn holiday_operation_uses_b_schedule() {
        let table = shared_stop_table();
        let ScheduleResolution::Stop { schedule, .. } =
            table.schedule_for_date(date(2025, 5, 3), Some("西口"))
        else {
            panic!("expected a stop schedule");
        };
        assert_eq!(schedule, vec![hour(7, &[0])]);
    }

    #[test]
    fn unknown_stop_is_reported_not_raised() {
        let table = shared_stop_table();
        assert_eq!(
            table.schedule_for_date(date(2025, 5, 1), Some("東口")),
            ScheduleResolution::StopNotFound {
                operation_type: OperationType::A,
                stop_name: "東口".into(),
            }
        );
    }

    #[test]
    fn all_stops_in_route_order() {
        let table = shared_stop_table();
        let ScheduleResolution::AllStops { stops, .. } =
            table.schedule_for_date(date(2025, 5, 1), None)
        else {
            panic!("expected all stops");
        };
        let order: Vec<(&str, &str)> = stops
            .iter()
            .map(|s| (s.route_name.as_str(), s.stop_name.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![("東行", "西口"), ("東行", "中央"), ("西行", "中央"), ("西行", "西口")]
        );
        assert_eq!(stops[2].schedule, vec![hour(9, &[5])]);
    }

    #[test]
    fn projection_keeps_every_route_per_stop() {
        let table = shared_stop_table();
        let projection = table.projection();

        assert_eq!(projection.len(), 2);
        let central = &projection["中央"];
        assert_eq!(central.keys().collect::<Vec<_>>(), vec!["東行", "西行"]);

        let east = &central["東行"];
        assert_eq!(east.bucket(DayType::Weekday).len(), 2);
        assert_eq!(east.bucket(DayType::Holiday).len(), 1);
        let entry = &east.weekday[0];
        assert_eq!(entry.hour, "6");
        assert_eq!(entry.minute, "10");
        assert_eq!(entry.destination, "東行");
        assert_eq!(entry.train_type, BUS_TRAIN_TYPE);
        assert_eq!(entry.detail_url, "");
    }

    #[test]
    fn builtin_projection_covers_every_stop() {
        let projection = builtin().projection();
        assert_eq!(projection.len(), 3);
        assert_eq!(projection["八戸ノ里駅前"].len(), 2);
        assert_eq!(projection["東上小阪"].len(), 1);
    }

    #[test]
    fn response_for_no_service() {
        let response = BusScheduleResponse::from_resolution(date(2030, 1, 1), ScheduleResolution::NoService);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "date": "2030-01-01",
                "operationType": null,
                "message": "この日は運行していません",
            })
        );
    }

    #[test]
    fn response_for_stop() {
        let table = shared_stop_table();
        let day = date(2025, 5, 1);
        let response = BusScheduleResponse::from_resolution(day, table.schedule_for_date(day, Some("西口")));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "date": "2025-05-01",
                "operationType": "A",
                "stopName": "西口",
                "routeName": "東行",
                "schedule": [{"hour": 6, "minutes": [0, 30]}],
            })
        );
    }

    #[test]
    fn response_for_missing_stop() {
        let table = shared_stop_table();
        let day = date(2025, 5, 1);
        let response = BusScheduleResponse::from_resolution(day, table.schedule_for_date(day, Some("東口")));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["operationType"], "A");
        assert_eq!(json["error"], "東口の時刻表データが見つかりません");
        assert!(json.get("schedule").is_none());
        assert!(json.get("stops").is_none());
    }

    #[test]
    fn response_for_all_stops() {
        let table = shared_stop_table();
        let day = date(2025, 5, 3);
        let response = BusScheduleResponse::from_resolution(day, table.schedule_for_date(day, None));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["operationType"], "B");
        assert_eq!(json["stops"].as_array().unwrap().len(), 4);
        assert_eq!(json["stops"][0]["stopName"], "西口");
        assert_eq!(json["stops"][0]["routeName"], "東行");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn parse_dates() {
        let today = date(2025, 6, 1);
        assert_eq!(parse_service_date("2025-04-16", today).unwrap(), date(2025, 4, 16));
        assert_eq!(parse_service_date(" 2025-4-6 ", today).unwrap(), date(2025, 4, 6));
        assert_eq!(parse_service_date("04-16", today).unwrap(), date(2025, 4, 16));
        assert_eq!(parse_service_date("2026-03", today).unwrap(), date(2026, 3, 1));

        for bad in ["", "2025", "2025-13-01", "02-30", "2025-04-16-01", "abc-de", "+4-1", "2025--01"] {
            assert!(
                matches!(parse_service_date(bad, today), Err(BusError::InvalidDate { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn group_by_hour_skips_non_numeric() {
        let mut entries = flatten_hours(&[hour(7, &[5, 35])], "r");
        entries.push(TimetableEntry {
            hour: "始発".into(),
            minute: "00".into(),
            destination: "r".into(),
            train_type: BUS_TRAIN_TYPE.into(),
            detail_url: String::new(),
        });
        let grouped = group_by_hour(&entries);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[&7], BTreeSet::from([5, 35]));
    }
}
