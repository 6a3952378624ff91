//! Data transfer objects for web requests and responses.

use serde::{Deserialize, Serialize};

use crate::stops::StopCandidate;

/// Request to look up stops by name or slug.
#[derive(Debug, Deserialize)]
pub struct StopsRequest {
    /// Partial stop name or slug
    pub query: String,
}

/// One resolved stop in the lookup response.
#[derive(Debug, Serialize)]
pub struct StopResult {
    pub stop_id: String,
    pub name: String,
    pub slug: String,
    pub route_id: String,
    pub route_name: String,
}

impl From<StopCandidate> for StopResult {
    fn from(candidate: StopCandidate) -> Self {
        Self {
            stop_id: candidate.stop_id,
            name: candidate.stop_name,
            slug: candidate.slug,
            route_id: candidate.route_id,
            route_name: candidate.route_name,
        }
    }
}

/// Request for the calendar feed.
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    /// Home origin stop slug/name
    pub home_stop: Option<String>,

    /// Work destination stop slug/name
    pub work_stop: Option<String>,

    /// Number of days to include (1 to 30, default 14)
    pub days: Option<i64>,

    /// Bypass caches when set to a non-zero value
    pub force_refresh: Option<u8>,
}

/// Error payload for 4xx responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}
