//! Mock schedule source for testing without API access.
//!
//! Serves canned routes, stops and schedule payloads through the same
//! interface as the live client. Window parameters are ignored; canned
//! data is static.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::error::MbtaError;
use super::source::{ScheduleQuery, ScheduleSource};
use super::types::{RouteDto, ScheduleResponse, StopDto};

/// Canned schedule payloads are keyed the way the live endpoint filters:
/// (route id, stop id, direction filter).
type ScheduleKey = (String, String, Option<u8>);

/// In-memory schedule source with canned data.
#[derive(Debug, Clone, Default)]
pub struct MockScheduleSource {
    routes: Vec<RouteDto>,
    stops: HashMap<String, Vec<StopDto>>,
    schedules: HashMap<ScheduleKey, ScheduleResponse>,
    schedule_calls: Arc<AtomicUsize>,
    route_list_calls: Arc<AtomicUsize>,
}

impl MockScheduleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route and the stops it serves.
    pub fn with_route(mut self, route: RouteDto, stops: Vec<StopDto>) -> Self {
        self.stops.insert(route.id.clone(), stops);
        self.routes.push(route);
        self
    }

    /// Add a canned schedule payload for a (route, stop, direction) filter.
    pub fn with_schedule(
        mut self,
        route_id: impl Into<String>,
        stop_id: impl Into<String>,
        direction_id: Option<u8>,
        response: ScheduleResponse,
    ) -> Self {
        self.schedules
            .insert((route_id.into(), stop_id.into(), direction_id), response);
        self
    }

    /// Number of `schedules` calls served so far.
    pub fn schedule_calls(&self) -> usize {
        self.schedule_calls.load(Ordering::SeqCst)
    }

    /// Number of `list_routes` calls served so far.
    pub fn route_list_calls(&self) -> usize {
        self.route_list_calls.load(Ordering::SeqCst)
    }
}

impl ScheduleSource for MockScheduleSource {
    async fn list_routes(&self) -> Result<Vec<RouteDto>, MbtaError> {
        self.route_list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.routes.clone())
    }

    async fn list_stops(&self, route_id: &str) -> Result<Vec<StopDto>, MbtaError> {
        Ok(self.stops.get(route_id).cloned().unwrap_or_default())
    }

    async fn route_details(&self, route_id: &str) -> Result<RouteDto, MbtaError> {
        self.routes
            .iter()
            .find(|route| route.id == route_id)
            .cloned()
            .ok_or_else(|| MbtaError::Api {
                status: 404,
                message: format!("no mock route {route_id}"),
            })
    }

    async fn schedules(&self, query: &ScheduleQuery) -> Result<ScheduleResponse, MbtaError> {
        self.schedule_calls.fetch_add(1, Ordering::SeqCst);
        let key = (
            query.route_id.clone(),
            query.stop_id.clone(),
            query.direction_id,
        );
        Ok(self.schedules.get(&key).cloned().unwrap_or_default())
    }
}
