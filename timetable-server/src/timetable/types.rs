//! Canonical timetable shapes shared by every source.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// One departure in a station timetable.
///
/// Hour and minute keep the source's display formatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    pub hour: String,
    pub minute: String,
    pub destination: String,
    pub train_type: String,
    /// Absolute URL of the train's detail page, empty if there is none.
    pub detail_url: String,
}

/// Departures for one direction, split by day type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionResult {
    pub weekday: Vec<TimetableEntry>,
    pub holiday: Vec<TimetableEntry>,
}

impl DirectionResult {
    /// A direction whose source makes no day-type distinction.
    ///
    /// The entries go in the weekday bucket only; the holiday bucket stays empty.
    pub fn weekday_only(entries: Vec<TimetableEntry>) -> Self {
        Self {
            weekday: entries,
            holiday: Vec::new(),
        }
    }

    /// The bucket for the given day type.
    pub fn bucket(&self, day: DayType) -> &[TimetableEntry] {
        match day {
            DayType::Weekday => &self.weekday,
            DayType::Holiday => &self.holiday,
        }
    }

    /// Mutable access to the bucket for the given day type.
    pub fn bucket_mut(&mut self, day: DayType) -> &mut Vec<TimetableEntry> {
        match day {
            DayType::Weekday => &mut self.weekday,
            DayType::Holiday => &mut self.holiday,
        }
    }

    /// Total number of entries across both buckets.
    pub fn len(&self) -> usize {
        self.weekday.len() + self.holiday.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weekday.is_empty() && self.holiday.is_empty()
    }
}

/// Direction name → departures.
pub type StationResult = BTreeMap<String, DirectionResult>;

/// Station name → directions. The output shape of every source.
pub type ParserResult = BTreeMap<String, StationResult>;

/// Add a station's directions to `result`, merging with any directions
/// already recorded under the same station name.
pub(crate) fn merge_station(result: &mut ParserResult, station: String, directions: StationResult) {
    result.entry(station).or_default().extend(directions);
}

/// Weekday or holiday service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayType {
    Weekday,
    Holiday,
}

impl DayType {
    pub const ALL: [DayType; 2] = [DayType::Weekday, DayType::Holiday];
}

impl fmt::Display for DayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayType::Weekday => f.write_str("weekday"),
            DayType::Holiday => f.write_str("holiday"),
        }
    }
}

/// Short → full destination names, as printed in compact timetables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationAbbreviations {
    names: HashMap<String, String>,
}

impl DestinationAbbreviations {
    /// An empty table; every destination passes through unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(short, full)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let names = pairs
            .into_iter()
            .map(|(short, full)| (short.to_string(), full.to_string()))
            .collect();
        Self { names }
    }

    /// Abbreviations used on the JR Osaka-Higashi line timetables.
    pub fn jr_default() -> Self {
        Self::from_pairs([
            ("放", "放出"),
            ("大", "大阪"),
            ("久", "久宝寺"),
            ("奈", "奈良"),
        ])
    }

    /// Expand `destination` if it is a known abbreviation.
    pub fn expand(&self, destination: &str) -> String {
        self.names
            .get(destination)
            .cloned()
            .unwrap_or_else(|| destination.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
