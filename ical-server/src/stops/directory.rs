//! The commuter rail stop directory.
//!
//! Maintains an in-memory snapshot of every stop reachable by commuter
//! rail, indexed by slug and grouped by route. The snapshot is immutable
//! and swapped atomically on refresh, so readers see either the old or
//! the new index, never a mix.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::mbta::{MbtaError, RouteDto, ScheduleSource};

use super::slug::{similarity, slugify};

/// How long an index snapshot stays fresh: 6 hours.
const INDEX_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Maximum candidates returned by a resolve call.
const MAX_RESULTS: usize = 10;

/// Maximum fuzzy-fallback candidates.
const FUZZY_LIMIT: usize = 5;

/// Minimum similarity ratio for a fuzzy match (exclusive).
const FUZZY_THRESHOLD: f64 = 0.6;

/// A stop indexed under one route.
///
/// The same stop id may appear under several routes, and several stops may
/// share a slug; each combination is an independent candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct StopCandidate {
    pub stop_id: String,
    pub stop_name: String,
    pub slug: String,
    pub route_id: String,
    pub route_name: String,
}

/// A commuter rail route with its two direction names.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteCandidate {
    pub route_id: String,
    pub long_name: String,
    pub short_name: Option<String>,
    /// Index 0 = direction id 0, index 1 = direction id 1.
    pub direction_names: Vec<String>,
}

impl From<RouteDto> for RouteCandidate {
    fn from(dto: RouteDto) -> Self {
        Self {
            route_id: dto.id,
            long_name: dto.long_name,
            short_name: dto.short_name,
            direction_names: dto.direction_names,
        }
    }
}

/// One fully-built directory snapshot.
struct Snapshot {
    slug_map: HashMap<String, Vec<StopCandidate>>,
    all: Vec<StopCandidate>,
    routes: HashMap<String, RouteCandidate>,
}

struct IndexState {
    snapshot: Arc<Snapshot>,
    expires_at: Instant,
}

/// Queryable directory of commuter rail stops.
pub struct StopDirectory<S> {
    source: S,
    state: RwLock<Option<IndexState>>,
    /// Exclusive refresh guard; at most one rebuild runs at a time.
    refresh: Mutex<()>,
}

impl<S: ScheduleSource> StopDirectory<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Make sure the index exists and is within its TTL.
    ///
    /// The TTL is re-checked after acquiring the refresh guard: a caller
    /// that waited on a concurrent rebuild must not rebuild again.
    pub async fn ensure_index(&self, force_refresh: bool) -> Result<(), MbtaError> {
        if !force_refresh && self.is_fresh().await {
            return Ok(());
        }
        let _guard = self.refresh.lock().await;
        if !force_refresh && self.is_fresh().await {
            return Ok(());
        }

        let snapshot = self.rebuild().await?;
        info!(stops = snapshot.all.len(), routes = snapshot.routes.len(), "stop index refreshed");

        let mut state = self.state.write().await;
        *state = Some(IndexState {
            snapshot: Arc::new(snapshot),
            expires_at: Instant::now() + INDEX_TTL,
        });
        Ok(())
    }

    async fn is_fresh(&self) -> bool {
        let state = self.state.read().await;
        state
            .as_ref()
            .is_some_and(|s| Instant::now() < s.expires_at)
    }

    async fn rebuild(&self) -> Result<Snapshot, MbtaError> {
        let routes = self.source.list_routes().await?;

        let route_map: HashMap<String, RouteCandidate> = routes
            .iter()
            .cloned()
            .map(|dto| (dto.id.clone(), RouteCandidate::from(dto)))
            .collect();

        // Fan out one stop listing per route, joined before publishing.
        let fetches = routes.iter().map(|route| async move {
            let stops = self.source.list_stops(&route.id).await?;
            Ok::<_, MbtaError>((route, stops))
        });

        let mut slug_map: HashMap<String, Vec<StopCandidate>> = HashMap::new();
        let mut all = Vec::new();
        for result in join_all(fetches).await {
            let (route, stops) = result?;
            for stop in stops {
                let slug = slugify(&stop.name);
                let candidate = StopCandidate {
                    stop_id: stop.id,
                    stop_name: stop.name,
                    slug: slug.clone(),
                    route_id: route.id.clone(),
                    route_name: route.long_name.clone(),
                };
                slug_map.entry(slug).or_default().push(candidate.clone());
                all.push(candidate);
            }
        }

        Ok(Snapshot {
            slug_map,
            all,
            routes: route_map,
        })
    }

    async fn snapshot(&self) -> Option<Arc<Snapshot>> {
        let state = self.state.read().await;
        state.as_ref().map(|s| s.snapshot.clone())
    }

    /// Resolve a free-text query into stop candidates, best first.
    ///
    /// Matching runs in three passes: exact slug, then case-insensitive
    /// substring, then a fuzzy fallback that only fires when the first two
    /// passes found nothing. At most ten candidates are returned. An empty
    /// result is an expected outcome, not an error.
    pub async fn resolve(&self, query: &str) -> Result<Vec<StopCandidate>, MbtaError> {
        self.ensure_index(false).await?;
        let Some(snapshot) = self.snapshot().await else {
            return Ok(Vec::new());
        };

        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches: Vec<StopCandidate> = Vec::new();

        let slug = slugify(query);
        if !slug.is_empty()
            && let Some(exact) = snapshot.slug_map.get(&slug)
        {
            matches.extend(exact.iter().cloned());
        }

        let lowered = query.to_lowercase();
        for candidate in &snapshot.all {
            if candidate.stop_name.to_lowercase().contains(&lowered)
                && !matches.contains(candidate)
            {
                matches.push(candidate.clone());
            }
        }

        if matches.is_empty() {
            matches.extend(closest_candidates(&snapshot.all, &slug));
        }

        matches.truncate(MAX_RESULTS);
        Ok(matches)
    }

    /// Look up a route from the current snapshot.
    pub async fn route(&self, route_id: &str) -> Option<RouteCandidate> {
        let snapshot = self.snapshot().await?;
        snapshot.routes.get(route_id).cloned()
    }
}

/// Fuzzy fallback: candidates whose slug similarity exceeds the threshold,
/// best first, capped.
fn closest_candidates(all: &[StopCandidate], slug_query: &str) -> Vec<StopCandidate> {
    let mut scored: Vec<(f64, &StopCandidate)> = all
        .iter()
        .filter_map(|candidate| {
            let score = similarity(slug_query, &candidate.slug);
            (score > FUZZY_THRESHOLD).then_some((score, candidate))
        })
        .collect();
    // Stable sort keeps discovery order among equal scores.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(FUZZY_LIMIT)
        .map(|(_, candidate)| candidate.clone())
        .collect()
}
