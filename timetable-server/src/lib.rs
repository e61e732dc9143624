//! Timetable aggregation for the stations around Kindai University.
//!
//! Rail timetables are scraped from JR West and Kintetsu station pages,
//! bus timetables come from compiled-in reference tables, and both are
//! served in one canonical shape through a cached [`service::TimetableService`].

pub mod bus;
pub mod cache;
pub mod config;
pub mod service;
pub mod snapshot;
pub mod timetable;
