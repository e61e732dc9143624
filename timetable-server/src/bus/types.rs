//! Bus reference data: routes, per-stop schedules and the operating calendar.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::BusError;
use crate::timetable::DayType;

/// Service pattern for a day: `A` runs the weekday timetable, `B` the
/// weekend/holiday one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    A,
    B,
}

impl OperationType {
    pub const ALL: [OperationType; 2] = [OperationType::A, OperationType::B];

    /// The timetable bucket this operation type is projected into.
    pub fn day_type(self) -> DayType {
        match self {
            OperationType::A => DayType::Weekday,
            OperationType::B => DayType::Holiday,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::A => f.write_str("A"),
            OperationType::B => f.write_str("B"),
        }
    }
}

/// Departures within one hour. Minutes are ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourSchedule {
    pub hour: u32,
    pub minutes: Vec<u32>,
}

/// A stop's timetable for each operation type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopSchedules {
    #[serde(rename = "A")]
    pub a: Vec<HourSchedule>,
    #[serde(rename = "B")]
    pub b: Vec<HourSchedule>,
}

impl StopSchedules {
    pub fn for_operation(&self, operation: OperationType) -> &[HourSchedule] {
        match operation {
            OperationType::A => &self.a,
            OperationType::B => &self.b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStopSchedule {
    pub stop_name: String,
    pub schedule: StopSchedules,
}

/// A named route with its stops in travel order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusRoute {
    pub name: String,
    pub stops: Vec<BusStopSchedule>,
}

/// Operating calendar: date → operation type, `None` meaning no service.
///
/// Dates that are not in the calendar also have no service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusOperationCalendar {
    days: HashMap<NaiveDate, Option<OperationType>>,
}

impl BusOperationCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a calendar from `YYYY-MM-DD` keys.
    pub fn from_iso_map(
        raw: impl IntoIterator<Item = (String, Option<OperationType>)>,
    ) -> Result<Self, BusError> {
        let days = raw
            .into_iter()
            .map(|(key, operation)| {
                NaiveDate::parse_from_str(&key, "%Y-%m-%d")
                    .map(|date| (date, operation))
                    .map_err(|_| BusError::InvalidCalendarKey { key })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { days })
    }

    pub fn insert(&mut self, date: NaiveDate, operation: Option<OperationType>) {
        self.days.insert(date, operation);
    }

    /// Operation type on `date`, or `None` if there is no service.
    pub fn get(&self, date: NaiveDate) -> Option<OperationType> {
        self.days.get(&date).copied().flatten()
    }

    /// Whether `date` has an explicit entry (service or not).
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.days.contains_key(&date)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}
