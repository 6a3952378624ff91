//! MBTA v3 API HTTP client.
//!
//! Handles authentication, retry with growing backoff, offset pagination,
//! and per-day window splitting for schedule queries. Downstream code only
//! sees complete, typed result sets.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::error::MbtaError;
use super::source::{ScheduleQuery, ScheduleSource};
use super::types::{
    RawPage, RawResource, RawSingle, RouteDto, ScheduleResponse, SideTable, StopDto, decode_route,
    decode_schedule_entry, decode_stop,
};

/// Default base URL for the MBTA v3 API.
const DEFAULT_BASE_URL: &str = "https://api-v3.mbta.com";

/// Default maximum concurrent requests.
const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Retries after the initial attempt, for transient failures only.
const RETRIES: u32 = 2;

/// Base delay between retry attempts; grows linearly per attempt.
const RETRY_DELAY: Duration = Duration::from_millis(300);

/// GTFS route type for commuter rail.
const COMMUTER_RAIL_TYPE: &str = "2";

/// Configuration for the MBTA client.
#[derive(Debug, Clone)]
pub struct MbtaConfig {
    /// Optional API key, sent as the `x-api-key` header.
    pub api_key: Option<String>,
    /// Base URL for the API.
    pub base_url: String,
    /// Maximum concurrent requests.
    pub max_concurrent: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl MbtaConfig {
    /// Create a config with default settings and no API key.
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout_secs: 30,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set maximum concurrent requests.
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl Default for MbtaConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// MBTA v3 API client.
///
/// Uses a semaphore to bound concurrent requests during index rebuild
/// fan-out.
#[derive(Debug, Clone)]
pub struct MbtaClient {
    http: reqwest::Client,
    base_url: String,
    semaphore: Arc<Semaphore>,
}

impl MbtaClient {
    /// Create a new client with the given configuration.
    pub fn new(config: MbtaConfig) -> Result<Self, MbtaError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key).map_err(|_| MbtaError::Api {
                status: 0,
                message: "Invalid API key format".to_string(),
            })?;
            headers.insert(HeaderName::from_static("x-api-key"), value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
        })
    }

    /// Issue one GET and decode the JSON body, retrying transient failures.
    ///
    /// Client-request errors (4xx) fail immediately; 5xx and transport
    /// errors are retried with a growing delay.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, MbtaError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| MbtaError::Api {
                status: 0,
                message: "Semaphore closed".to_string(),
            })?;

        let url = format!("{}{}", self.base_url, path);
        let mut last_err: Option<MbtaError> = None;

        for attempt in 0..=RETRIES {
            if attempt > 0 {
                tokio::time::sleep(RETRY_DELAY * attempt).await;
            }

            let response = match self.http.get(&url).query(params).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(url, attempt, error = %e, "MBTA request failed");
                    last_err = Some(MbtaError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(MbtaError::Unauthorized);
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(MbtaError::RateLimited);
            }
            if status.is_client_error() {
                let body = response.text().await.unwrap_or_default();
                return Err(MbtaError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!(url, attempt, status = status.as_u16(), "MBTA server error");
                last_err = Some(MbtaError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            let body = response.text().await?;
            return serde_json::from_str(&body).map_err(|e| MbtaError::Json {
                message: e.to_string(),
            });
        }

        // Loop only exits without returning when every attempt errored.
        Err(last_err.unwrap_or(MbtaError::Api {
            status: 0,
            message: "retry budget exhausted".to_string(),
        }))
    }

    /// Fetch every page of a list endpoint, following offset pagination.
    async fn get_paginated(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Vec<RawResource>, MbtaError> {
        let mut results = Vec::new();
        let mut next_offset: Option<u64> = None;

        loop {
            let mut page_params = params.to_vec();
            if let Some(offset) = next_offset {
                page_params.push(("page[offset]".to_string(), offset.to_string()));
            }
            let page: RawPage = self.get_json(path, &page_params).await?;
            results.extend(page.data);
            next_offset = page.links.next.as_deref().and_then(parse_next_offset);
            if next_offset.is_none() {
                break;
            }
        }

        Ok(results)
    }

    /// Fetch every page of `/schedules`, collecting entries and side-table.
    async fn collect_schedule_pages(
        &self,
        params: &[(String, String)],
        response: &mut ScheduleResponse,
    ) -> Result<(), MbtaError> {
        let mut next_offset: Option<u64> = None;

        loop {
            let mut page_params = params.to_vec();
            if let Some(offset) = next_offset {
                page_params.push(("page[offset]".to_string(), offset.to_string()));
            }
            let page: RawPage = self.get_json("/schedules", &page_params).await?;
            for resource in &page.data {
                response.entries.push(decode_schedule_entry(resource));
            }
            for resource in &page.included {
                response.side.ingest(resource);
            }
            next_offset = page.links.next.as_deref().and_then(parse_next_offset);
            if next_offset.is_none() {
                break;
            }
        }

        Ok(())
    }
}

impl ScheduleSource for MbtaClient {
    async fn list_routes(&self) -> Result<Vec<RouteDto>, MbtaError> {
        let params = vec![
            ("filter[type]".to_string(), COMMUTER_RAIL_TYPE.to_string()),
            ("page[limit]".to_string(), "100".to_string()),
        ];
        let resources = self.get_paginated("/routes", &params).await?;
        Ok(resources.iter().map(decode_route).collect())
    }

    async fn list_stops(&self, route_id: &str) -> Result<Vec<StopDto>, MbtaError> {
        let params = vec![
            ("filter[route]".to_string(), route_id.to_string()),
            ("page[limit]".to_string(), "200".to_string()),
        ];
        let resources = self.get_paginated("/stops", &params).await?;
        Ok(resources.iter().map(decode_stop).collect())
    }

    async fn route_details(&self, route_id: &str) -> Result<RouteDto, MbtaError> {
        let params = vec![("include".to_string(), "line".to_string())];
        let single: RawSingle = self
            .get_json(&format!("/routes/{route_id}"), &params)
            .await?;
        Ok(decode_route(&single.data))
    }

    async fn schedules(&self, query: &ScheduleQuery) -> Result<ScheduleResponse, MbtaError> {
        if query.end < query.start {
            return Err(MbtaError::InvalidWindow);
        }

        let mut response = ScheduleResponse {
            entries: Vec::new(),
            side: SideTable::default(),
        };

        // The schedules endpoint is per-service-date; split the window into
        // daily queries with time filters on the boundary days.
        let start_date = query.start.date_naive();
        let end_date = query.end.date_naive();
        let mut current = start_date;
        while current <= end_date {
            let mut params = vec![
                ("filter[route]".to_string(), query.route_id.clone()),
                ("filter[stop]".to_string(), query.stop_id.clone()),
                ("filter[date]".to_string(), current.to_string()),
                ("page[limit]".to_string(), "200".to_string()),
                ("sort".to_string(), "departure_time".to_string()),
                ("include".to_string(), "trip,stop".to_string()),
            ];
            if let Some(direction) = query.direction_id {
                params.push(("filter[direction_id]".to_string(), direction.to_string()));
            }
            if current == start_date {
                params.push((
                    "filter[min_time]".to_string(),
                    query.start.format("%H:%M").to_string(),
                ));
            }
            if current == end_date {
                params.push((
                    "filter[max_time]".to_string(),
                    query.end.format("%H:%M").to_string(),
                ));
            }

            self.collect_schedule_pages(&params, &mut response).await?;
            current = current.succ_opt().ok_or(MbtaError::InvalidWindow)?;
        }

        debug!(
            route = %query.route_id,
            stop = %query.stop_id,
            entries = response.entries.len(),
            "fetched schedules"
        );
        Ok(response)
    }
}

/// Extract the `page[offset]` value from a JSON:API `links.next` URL.
fn parse_next_offset(next_link: &str) -> Option<u64> {
    let (_, rest) = next_link.split_once('?')?;
    for part in rest.split('&') {
        let value = part
            .strip_prefix("page[offset]=")
            .or_else(|| part.strip_prefix("page%5Boffset%5D="));
        if let Some(value) = value {
            return value.parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = MbtaConfig::new()
            .with_api_key("test-key")
            .with_base_url("http://localhost:8080")
            .with_max_concurrent(10)
            .with_timeout(60);

        assert_eq!(config.api_key.as_deref(), Some("test-key"));
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.max_concurrent, 10);
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn config_defaults() {
        let config = MbtaConfig::new();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(config.timeout_secs, 30);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn client_creation() {
        assert!(MbtaClient::new(MbtaConfig::new()).is_ok());
        assert!(MbtaClient::new(MbtaConfig::new().with_api_key("key")).is_ok());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = MbtaClient::new(MbtaConfig::new().with_base_url("http://x/")).unwrap();
        assert_eq!(client.base_url, "http://x");
    }

    #[test]
    fn next_offset_parsing() {
        assert_eq!(
            parse_next_offset("/schedules?page[offset]=200&page[limit]=200"),
            Some(200)
        );
        assert_eq!(
            parse_next_offset("https://api-v3.mbta.com/stops?page%5Boffset%5D=50"),
            Some(50)
        );
        assert_eq!(parse_next_offset("/schedules"), None);
        assert_eq!(parse_next_offset("/schedules?sort=departure_time"), None);
    }
}
