//! Kintetsu bus schedules from static reference tables.
//!
//! Bus timetables are not scraped. A compiled-in operating calendar maps each
//! date to an operation type (`A` weekday pattern, `B` holiday pattern, or no
//! service), and each route lists its stops with an hourly schedule per
//! operation type.

mod data;
mod error;
mod resolver;
mod types;

pub use data::{builtin_calendar, builtin_routes, parse_calendar, parse_routes};
pub use error::BusError;
pub use resolver::{
    BUS_TRAIN_TYPE, BusScheduleResponse, BusTimetable, ScheduleResolution, StopScheduleView,
    flatten_hours, group_by_hour, parse_service_date,
};
pub use types::{
    BusOperationCalendar, BusRoute, BusStopSchedule, HourSchedule, OperationType, StopSchedules,
};
