//! Compiled-in Kintetsu bus reference data (fiscal year 2025).

use std::collections::HashMap;

use super::error::BusError;
use super::types::{BusOperationCalendar, BusRoute, OperationType};

const CALENDAR_JSON: &str = include_str!("../../data/kintetsu_bus/calendar.json");
const ROUTES_JSON: &str = include_str!("../../data/kintetsu_bus/routes.json");

/// Parse a calendar from a JSON object of `"YYYY-MM-DD": "A" | "B" | null`.
pub fn parse_calendar(json: &str) -> Result<BusOperationCalendar, BusError> {
    let raw: HashMap<String, Option<OperationType>> = serde_json::from_str(json)?;
    BusOperationCalendar::from_iso_map(raw)
}

/// Parse routes from a JSON array of [`BusRoute`].
pub fn parse_routes(json: &str) -> Result<Vec<BusRoute>, BusError> {
    Ok(serde_json::from_str(json)?)
}

pub fn builtin_calendar() -> Result<BusOperationCalendar, BusError> {
    parse_calendar(CALENDAR_JSON)
}

pub fn builtin_routes() -> Result<Vec<BusRoute>, BusError> {
    parse_routes(ROUTES_JSON)
}
