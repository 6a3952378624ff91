//! The schedule source seam.
//!
//! Everything downstream of the HTTP client (directory, resolver, fetcher)
//! works against this trait, so tests can substitute canned data.

use std::future::Future;

use chrono::DateTime;
use chrono_tz::Tz;

use super::error::MbtaError;
use super::types::{RouteDto, ScheduleResponse, StopDto};

/// Parameters for one schedule lookup.
///
/// The window is inclusive on both ends; callers pass localized instants.
#[derive(Debug, Clone)]
pub struct ScheduleQuery {
    pub route_id: String,
    pub stop_id: String,
    /// `None` fetches both travel directions.
    pub direction_id: Option<u8>,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

/// Upstream provider of routes, stops and schedules.
///
/// Implementations own retry and pagination; each call either returns a
/// complete result set or fails.
pub trait ScheduleSource: Send + Sync {
    /// List all commuter rail routes.
    fn list_routes(&self) -> impl Future<Output = Result<Vec<RouteDto>, MbtaError>> + Send;

    /// List all stops served by a route.
    fn list_stops(
        &self,
        route_id: &str,
    ) -> impl Future<Output = Result<Vec<StopDto>, MbtaError>> + Send;

    /// Fetch full details for a single route.
    fn route_details(
        &self,
        route_id: &str,
    ) -> impl Future<Output = Result<RouteDto, MbtaError>> + Send;

    /// Fetch schedule entries plus their side-table for a stop.
    fn schedules(
        &self,
        query: &ScheduleQuery,
    ) -> impl Future<Output = Result<ScheduleResponse, MbtaError>> + Send;
}
