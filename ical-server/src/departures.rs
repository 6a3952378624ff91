//! Departure fetching and caching.
//!
//! Retrieves the scheduled departures for one direction of travel between
//! an origin and a destination stop, pairing each origin departure with
//! the computed arrival at the destination. Results are cached per
//! (route, origin, destination, direction, date window): dates only, so
//! repeated queries within the same day window share an entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use tracing::debug;

use crate::EASTERN;
use crate::cache::{CacheError, TtlCache};
use crate::mbta::{MbtaError, ScheduleEntry, ScheduleQuery, ScheduleSource};
use crate::stops::StopCandidate;

/// Default TTL for cached departure lists: 5 minutes.
pub const DEFAULT_SCHEDULE_TTL: Duration = Duration::from_secs(300);

/// One scheduled departure, localized to Eastern time.
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub trip_id: String,
    pub departure: DateTime<Tz>,
    /// Arrival at the paired destination stop, when the trip calls there.
    pub arrival: Option<DateTime<Tz>>,
    pub stop_sequence: u32,
    pub direction_id: u8,
    pub headsign: String,
    pub origin_stop_id: String,
    pub destination_stop_id: String,
}

/// Cache key: dates only, never times.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DepartureKey {
    route_id: String,
    origin_stop_id: String,
    destination_stop_id: String,
    direction_id: u8,
    window_start: NaiveDate,
    window_end: NaiveDate,
}

/// Parameters for one departure fetch.
#[derive(Debug, Clone)]
pub struct DepartureRequest<'a> {
    pub route_id: &'a str,
    pub origin: &'a StopCandidate,
    pub destination: &'a StopCandidate,
    pub direction_id: u8,
    pub window_start: DateTime<Tz>,
    pub window_end: DateTime<Tz>,
    pub force_refresh: bool,
}

/// Schedule source wrapper that caches computed departure lists.
pub struct DepartureFetcher<S> {
    source: S,
    cache: TtlCache<DepartureKey, Arc<Vec<Departure>>>,
}

impl<S: ScheduleSource> DepartureFetcher<S> {
    /// Create a fetcher with the given cache TTL.
    pub fn new(source: S, cache_ttl: Duration) -> Result<Self, CacheError> {
        Ok(Self {
            source,
            cache: TtlCache::new(cache_ttl)?,
        })
    }

    /// Fetch the ordered departures for one travel direction.
    ///
    /// A forced refresh invalidates the matching cache entry before the
    /// lookup, so the caller always gets freshly fetched data.
    pub async fn fetch(
        &self,
        request: &DepartureRequest<'_>,
    ) -> Result<Arc<Vec<Departure>>, MbtaError> {
        let key = DepartureKey {
            route_id: request.route_id.to_string(),
            origin_stop_id: request.origin.stop_id.clone(),
            destination_stop_id: request.destination.stop_id.clone(),
            direction_id: request.direction_id,
            window_start: request.window_start.date_naive(),
            window_end: request.window_end.date_naive(),
        };

        if request.force_refresh {
            self.cache.invalidate(&key);
        }
        if let Some(cached) = self.cache.get(&key) {
            debug!(route = %key.route_id, origin = %key.origin_stop_id, "departure cache hit");
            return Ok(cached);
        }

        let origin_query = ScheduleQuery {
            route_id: request.route_id.to_string(),
            stop_id: request.origin.stop_id.clone(),
            direction_id: Some(request.direction_id),
            start: request.window_start,
            end: request.window_end,
        };
        let destination_query = ScheduleQuery {
            stop_id: request.destination.stop_id.clone(),
            ..origin_query.clone()
        };

        let (origin_resp, destination_resp) = tokio::join!(
            self.source.schedules(&origin_query),
            self.source.schedules(&destination_query)
        );
        let (origin_resp, destination_resp) = (origin_resp?, destination_resp?);

        let arrivals = build_arrival_map(&destination_resp.entries);

        let mut departures = Vec::new();
        for entry in &origin_resp.entries {
            // Entries with no usable time or no trip id cannot become events.
            let Some(departure_time) = entry.departure_time.or(entry.arrival_time) else {
                continue;
            };
            let Some(trip_id) = entry.trip_id.as_deref() else {
                continue;
            };

            let trip = origin_resp.side.trip(trip_id);
            let headsign = trip
                .and_then(|t| t.headsign.clone())
                .unwrap_or_else(|| request.origin.route_name.clone());
            let direction_id = trip
                .and_then(|t| t.direction_id)
                .unwrap_or(request.direction_id);

            departures.push(Departure {
                trip_id: trip_id.to_string(),
                departure: departure_time.with_timezone(&EASTERN),
                arrival: arrivals.get(trip_id).copied(),
                stop_sequence: entry.stop_sequence.unwrap_or(0),
                direction_id,
                headsign,
                origin_stop_id: request.origin.stop_id.clone(),
                destination_stop_id: request.destination.stop_id.clone(),
            });
        }

        departures.sort_by_key(|d| d.departure);

        let departures = Arc::new(departures);
        self.cache.set(key, departures.clone());
        Ok(departures)
    }
}

/// Map each trip to its latest known timestamp at the destination,
/// preferring arrival times and keeping the maximum on duplicates.
fn build_arrival_map(entries: &[ScheduleEntry]) -> HashMap<&str, DateTime<Tz>> {
    let mut arrivals: HashMap<&str, DateTime<Tz>> = HashMap::new();
    for entry in entries {
        let Some(trip_id) = entry.trip_id.as_deref() else {
            continue;
        };
        let Some(time) = entry.arrival_time.or(entry.departure_time) else {
            continue;
        };
        let local = time.with_timezone(&EASTERN);
        arrivals
            .entry(trip_id)
            .and_modify(|current| {
                if local > *current {
                    *current = local;
                }
            })
            .or_insert(local);
    }
    arrivals
}
