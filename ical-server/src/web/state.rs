//! Application state for the web layer.

use std::sync::Arc;

use crate::cache::CacheError;
use crate::departures::{DEFAULT_SCHEDULE_TTL, DepartureFetcher};
use crate::mbta::ScheduleSource;
use crate::stops::StopDirectory;

/// Shared application state.
///
/// Generic over the schedule source so handlers can be exercised against
/// the mock in tests.
#[derive(Clone)]
pub struct AppState<S> {
    /// Stop directory backing name resolution
    pub directory: Arc<StopDirectory<S>>,

    /// Cached departure fetcher
    pub fetcher: Arc<DepartureFetcher<S>>,

    /// Schedule source used directly for route inference
    pub source: S,

    /// Fallback home stop when the query string omits one
    pub default_home_stop: Option<String>,

    /// Fallback work stop when the query string omits one
    pub default_work_stop: Option<String>,
}

impl<S: ScheduleSource + Clone> AppState<S> {
    /// Create a new app state with the default schedule cache TTL.
    pub fn new(
        source: S,
        default_home_stop: Option<String>,
        default_work_stop: Option<String>,
    ) -> Result<Self, CacheError> {
        Ok(Self {
            directory: Arc::new(StopDirectory::new(source.clone())),
            fetcher: Arc::new(DepartureFetcher::new(source.clone(), DEFAULT_SCHEDULE_TTL)?),
            source,
            default_home_stop,
            default_work_stop,
        })
    }
}
