//! MBTA commuter rail calendar feed server.
//!
//! Resolves fuzzy "home" and "work" stop descriptions against the MBTA
//! stop directory, infers the route and travel directions connecting them,
//! and serves the scheduled departures as an iCalendar feed.

pub mod cache;
pub mod departures;
pub mod events;
pub mod ics;
pub mod mbta;
pub mod routing;
pub mod stops;
pub mod web;

/// Local zone for all schedule instants. The MBTA operates entirely in
/// Eastern time; noon bucketing and calendar dates are computed here.
pub const EASTERN: chrono_tz::Tz = chrono_tz::America::New_York;
