//! Operator timetable scrapers.
//!
//! Each operator publishes station timetables as HTML in its own layout and
//! charset. A [`TimetableSource`] turns a list of station URLs into the
//! canonical [`ParserResult`]: station name → direction name →
//! weekday/holiday departures.
//!
//! [`StatusSource`] scrapes Kintetsu's live operating status page.

mod client;
mod error;
mod html;
mod jr;
mod kintetsu;
mod source;
mod status;
mod types;

pub use client::{Charset, DEFAULT_USER_AGENT, FetchedPage, PageClient, PageClientConfig};
pub use error::SourceError;
pub use jr::JrSource;
pub use kintetsu::KintetsuSource;
pub use source::{SourceRegistry, TimetableSource};
pub use status::{KINTETSU_STATUS_URL, OperationStatus, OperatorStatus, StatusSource};
pub use types::{
    DayType, DestinationAbbreviations, DirectionResult, ParserResult, StationResult,
    TimetableEntry,
};
