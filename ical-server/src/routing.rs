//! Route and direction inference.
//!
//! The upstream API has no "route between two stops" query. Given a home
//! and a work stop (each indexed under a route), this module decides which
//! single route connects them and which direction id points toward work,
//! using only per-stop schedule listings: a trip that calls at both stops
//! with home before work pins down the route, and the trip's metadata
//! (direction id, headsign) pins down the direction.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use tracing::warn;

use crate::mbta::{MbtaError, ScheduleEntry, ScheduleQuery, ScheduleSource, SideTable};
use crate::stops::{RouteCandidate, StopCandidate};

/// Headsigns and route names mentioning a downtown terminal identify the
/// inbound direction (id 0) on every commuter rail line.
const TERMINAL_KEYWORDS: [&str; 2] = ["south station", "north station"];

/// Errors from route/direction inference.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// No candidate route had a trip connecting the two stops in the
    /// queried window. Distinct from upstream unavailability.
    #[error("unable to infer a route that connects both stops")]
    NoConnectingRoute,

    /// The schedule source failed while resolving route metadata.
    #[error(transparent)]
    Source(#[from] MbtaError),
}

/// A successfully inferred route with its two travel directions.
///
/// `toward_work + toward_home == 1` always holds.
#[derive(Debug, Clone)]
pub struct RouteDirections {
    pub route: RouteCandidate,
    pub toward_work: u8,
    pub toward_home: u8,
}

/// Identify the route and direction ids connecting home and work.
///
/// Candidate routes are the distinct routes the two stops were indexed
/// under, tried in order of preference: routes through a downtown terminal
/// first, then by route id. The first route with a qualifying trip wins.
pub async fn infer_route_and_directions<S: ScheduleSource>(
    source: &S,
    home: &StopCandidate,
    work: &StopCandidate,
    window_start: DateTime<Tz>,
    window_end: DateTime<Tz>,
) -> Result<RouteDirections, InferenceError> {
    let mut ordered: Vec<String> = Vec::new();
    for route_id in [&home.route_id, &work.route_id] {
        if !ordered.contains(route_id) {
            ordered.push(route_id.clone());
        }
    }

    // Route metadata is memoized for this call only, not shared.
    let mut known: HashMap<String, RouteCandidate> = HashMap::new();
    for route_id in &ordered {
        if !known.contains_key(route_id) {
            let dto = source.route_details(route_id).await?;
            known.insert(route_id.clone(), RouteCandidate::from(dto));
        }
    }

    ordered.sort_by_key(|route_id| {
        let priority = known
            .get(route_id)
            .map(|route| terminal_priority(&route.long_name))
            .unwrap_or(0);
        (priority, route_id.clone())
    });

    for route_id in &ordered {
        let Some(route) = known.get(route_id) else {
            continue;
        };
        if let Some((toward_work, toward_home)) =
            discover_directions(source, route, home, work, window_start, window_end).await
        {
            return Ok(RouteDirections {
                route: route.clone(),
                toward_work,
                toward_home,
            });
        }
    }

    Err(InferenceError::NoConnectingRoute)
}

/// -1 for routes through a downtown terminal, 0 otherwise.
fn terminal_priority(long_name: &str) -> i8 {
    let lowered = long_name.to_lowercase();
    if TERMINAL_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        -1
    } else {
        0
    }
}

/// Attempt direction discovery on a single route.
///
/// Returns `(toward_work, toward_home)` from the first trip that calls at
/// both stops with home preceding work, examining home-side entries in the
/// order the schedule source returned them. A failed schedule lookup makes
/// this route non-qualifying; the caller tries the next candidate.
async fn discover_directions<S: ScheduleSource>(
    source: &S,
    route: &RouteCandidate,
    home: &StopCandidate,
    work: &StopCandidate,
    window_start: DateTime<Tz>,
    window_end: DateTime<Tz>,
) -> Option<(u8, u8)> {
    let home_query = ScheduleQuery {
        route_id: route.route_id.clone(),
        stop_id: home.stop_id.clone(),
        direction_id: None,
        start: window_start,
        end: window_end,
    };
    let work_query = ScheduleQuery {
        stop_id: work.stop_id.clone(),
        ..home_query.clone()
    };

    let (home_resp, work_resp) =
        tokio::join!(source.schedules(&home_query), source.schedules(&work_query));
    let (home_resp, work_resp) = match (home_resp, work_resp) {
        (Ok(home_resp), Ok(work_resp)) => (home_resp, work_resp),
        (Err(e), _) | (_, Err(e)) => {
            warn!(route = %route.route_id, error = %e, "schedule lookup failed for route");
            return None;
        }
    };

    let mut side = home_resp.side.clone();
    side.merge(&work_resp.side);

    let home_map = trip_stop_map(&home_resp.entries, &side);
    let work_map = trip_stop_map(&work_resp.entries, &side);

    let mut seen: HashSet<&str> = HashSet::new();
    for entry in &home_resp.entries {
        let Some(trip_id) = entry.trip_id.as_deref() else {
            continue;
        };
        if !seen.insert(trip_id) {
            continue;
        }
        let Some(home_info) = home_map.get(trip_id) else {
            continue;
        };
        let Some(work_info) = work_map.get(trip_id) else {
            continue;
        };
        if !home_precedes_work(home_info, work_info) {
            continue;
        }
        let Some(direction) = pick_direction(home, work, home_info, work_info) else {
            continue;
        };
        return Some((direction, 1 - direction));
    }
    None
}

/// Everything known about one trip's call at one stop.
#[derive(Debug, Clone)]
struct TripStop {
    stop_sequence: Option<u32>,
    departure: Option<DateTime<FixedOffset>>,
    arrival: Option<DateTime<FixedOffset>>,
    direction_id: Option<u8>,
    headsign: Option<String>,
}

/// Map each trip id to its call at this stop, merging side-table metadata.
fn trip_stop_map<'a>(
    entries: &'a [ScheduleEntry],
    side: &SideTable,
) -> HashMap<&'a str, TripStop> {
    let mut map = HashMap::new();
    for entry in entries {
        let Some(trip_id) = entry.trip_id.as_deref() else {
            continue;
        };
        let trip = side.trip(trip_id);
        map.insert(
            trip_id,
            TripStop {
                stop_sequence: entry.stop_sequence,
                departure: entry.departure_time,
                arrival: entry.arrival_time,
                direction_id: trip.and_then(|t| t.direction_id),
                headsign: trip.and_then(|t| t.headsign.clone()),
            },
        );
    }
    map
}

/// Whether the trip calls at home before work, by stop sequence when both
/// sides have one, otherwise by comparing times.
fn home_precedes_work(home: &TripStop, work: &TripStop) -> bool {
    if let (Some(home_seq), Some(work_seq)) = (home.stop_sequence, work.stop_sequence)
        && home_seq < work_seq
    {
        return true;
    }
    if let (Some(home_dep), Some(work_dep)) = (home.departure, work.departure)
        && home_dep <= work_dep
    {
        return true;
    }
    if let (Some(home_dep), Some(work_arr)) = (home.departure, work.arrival)
        && home_dep <= work_arr
    {
        return true;
    }
    false
}

/// Determine the direction id toward work for a qualifying trip.
///
/// Explicit direction ids win; headsign heuristics are the fallback.
fn pick_direction(
    home_stop: &StopCandidate,
    work_stop: &StopCandidate,
    home: &TripStop,
    work: &TripStop,
) -> Option<u8> {
    if let Some(direction) = home.direction_id {
        return Some(direction);
    }
    if let Some(direction) = work.direction_id {
        return Some(direction);
    }
    for info in [home, work] {
        let headsign = info.headsign.as_deref().unwrap_or("").to_lowercase();
        if TERMINAL_KEYWORDS.iter().any(|k| headsign.contains(k)) {
            return Some(0);
        }
    }
    let home_name = home_stop.stop_name.to_lowercase();
    let work_name = work_stop.stop_name.to_lowercase();
    if work
        .headsign
        .as_deref()
        .is_some_and(|h| h.to_lowercase().contains(&work_name))
    {
        return Some(0);
    }
    if home
        .headsign
        .as_deref()
        .is_some_and(|h| h.to_lowercase().contains(&home_name))
    {
        return Some(1);
    }
    None
}
