//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use serde_json::json;
use tracing::info;

use crate::EASTERN;
use crate::departures::DepartureRequest;
use crate::events::build_events;
use crate::ics::{build_calendar, build_outage_calendar};
use crate::mbta::{MbtaError, ScheduleSource};
use crate::routing::{InferenceError, infer_route_and_directions};
use crate::stops::StopCandidate;

use super::dto::*;
use super::state::AppState;

/// Default calendar window when the request does not name one.
const DEFAULT_WINDOW_DAYS: i64 = 14;

const END_OF_DAY: NaiveTime = match NaiveTime::from_hms_opt(23, 59, 59) {
    Some(t) => t,
    None => panic!("23:59:59 is a valid time"),
};

/// Create the application router.
pub fn create_router<S>(state: AppState<S>) -> Router
where
    S: ScheduleSource + Clone + 'static,
{
    Router::new()
        .route("/healthz", get(healthz))
        .route("/stops", get(stops::<S>))
        .route("/schedule.ical", get(schedule_ical::<S>))
        .with_state(state)
}

/// Health check endpoint.
async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// Resolve stops by partial name or slug.
async fn stops<S>(
    State(state): State<AppState<S>>,
    Query(req): Query<StopsRequest>,
) -> Result<Json<Vec<StopResult>>, AppError>
where
    S: ScheduleSource + Clone + 'static,
{
    let matches = state.directory.resolve(&req.query).await?;
    Ok(Json(matches.into_iter().map(StopResult::from).collect()))
}

/// Serve the commute calendar feed.
async fn schedule_ical<S>(
    State(state): State<AppState<S>>,
    Query(req): Query<ScheduleRequest>,
) -> Result<Response, AppError>
where
    S: ScheduleSource + Clone + 'static,
{
    let home_query = non_empty(req.home_stop).or_else(|| state.default_home_stop.clone());
    let work_query = non_empty(req.work_stop).or_else(|| state.default_work_stop.clone());
    let (Some(home_query), Some(work_query)) = (home_query, work_query) else {
        return Err(AppError::MissingParameters);
    };

    let days = req.days.unwrap_or(DEFAULT_WINDOW_DAYS);
    if !(1..=30).contains(&days) {
        return Err(AppError::InvalidDays);
    }
    let force_refresh = req.force_refresh.unwrap_or(0) != 0;

    let generated_at = Utc::now();
    let now = generated_at.with_timezone(&EASTERN);

    let home_candidates = match state.directory.resolve(&home_query).await {
        Ok(candidates) => candidates,
        Err(e) => return Ok(service_unavailable(&e.to_string(), generated_at)),
    };
    let work_candidates = match state.directory.resolve(&work_query).await {
        Ok(candidates) => candidates,
        Err(e) => return Ok(service_unavailable(&e.to_string(), generated_at)),
    };

    if home_candidates.is_empty() {
        return Err(AppError::HomeStopNotFound { query: home_query });
    }
    if work_candidates.is_empty() {
        return Err(AppError::WorkStopNotFound { query: work_query });
    }

    let Some((home, work)) = select_pair(&home_candidates, &work_candidates) else {
        return Err(AppError::RouteNotFound);
    };

    // Inference looks back to local midnight so early-morning requests
    // still see the whole service day; the feed itself starts now.
    let inference_start = start_of_day(now);
    let window_end = end_of_window(now, days);

    let inferred = match infer_route_and_directions(
        &state.source,
        home,
        work,
        inference_start,
        window_end,
    )
    .await
    {
        Ok(inferred) => inferred,
        Err(e @ InferenceError::NoConnectingRoute) => {
            return Err(AppError::RouteUnresolved {
                message: e.to_string(),
            });
        }
        Err(InferenceError::Source(e)) => {
            return Ok(service_unavailable(&e.to_string(), generated_at));
        }
    };

    let morning_request = DepartureRequest {
        route_id: &inferred.route.route_id,
        origin: home,
        destination: work,
        direction_id: inferred.toward_work,
        window_start: now,
        window_end,
        force_refresh,
    };
    let evening_request = DepartureRequest {
        route_id: &inferred.route.route_id,
        origin: work,
        destination: home,
        direction_id: inferred.toward_home,
        window_start: now,
        window_end,
        force_refresh,
    };

    let morning = match state.fetcher.fetch(&morning_request).await {
        Ok(departures) => departures,
        Err(e) => return Ok(service_unavailable(&e.to_string(), generated_at)),
    };
    let evening = match state.fetcher.fetch(&evening_request).await {
        Ok(departures) => departures,
        Err(e) => return Ok(service_unavailable(&e.to_string(), generated_at)),
    };

    let events = build_events(&inferred.route, home, work, &morning, &evening);
    info!(
        route = %inferred.route.route_id,
        home = %home.stop_id,
        work = %work.stop_id,
        events = events.len(),
        "serving calendar"
    );

    Ok(calendar_response(
        build_calendar(&events, generated_at),
        StatusCode::OK,
    ))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// First home/work candidate pair indexed under the same route.
fn select_pair<'a>(
    home_candidates: &'a [StopCandidate],
    work_candidates: &'a [StopCandidate],
) -> Option<(&'a StopCandidate, &'a StopCandidate)> {
    for home in home_candidates {
        for work in work_candidates {
            if home.route_id == work.route_id {
                return Some((home, work));
            }
        }
    }
    None
}

fn start_of_day(instant: DateTime<Tz>) -> DateTime<Tz> {
    instant
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(EASTERN)
        .earliest()
        .unwrap_or(instant)
}

fn end_of_window(now: DateTime<Tz>, days: i64) -> DateTime<Tz> {
    let last = now + Duration::days(days);
    last.date_naive()
        .and_time(END_OF_DAY)
        .and_local_timezone(EASTERN)
        .latest()
        .unwrap_or(last)
}

fn calendar_response(body: String, status: StatusCode) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
        .into_response()
}

/// 503 with an outage calendar body, so subscribed clients see a single
/// tentative event instead of an empty feed.
fn service_unavailable(reason: &str, generated_at: DateTime<Utc>) -> Response {
    calendar_response(
        build_outage_calendar(reason, generated_at),
        StatusCode::SERVICE_UNAVAILABLE,
    )
}

/// Application error type for 4xx and 503 JSON responses.
#[derive(Debug)]
pub enum AppError {
    MissingParameters,
    InvalidDays,
    HomeStopNotFound { query: String },
    WorkStopNotFound { query: String },
    RouteNotFound,
    RouteUnresolved { message: String },
    Upstream { message: String },
}

impl AppError {
    fn payload(&self) -> (StatusCode, ErrorResponse) {
        let not_found = |error, query: &str| ErrorResponse {
            error,
            message: None,
            query: Some(query.to_string()),
            suggestions: Some(Vec::new()),
        };
        let with_message = |error, message: String| ErrorResponse {
            error,
            message: Some(message),
            query: None,
            suggestions: None,
        };

        match self {
            AppError::MissingParameters => (
                StatusCode::BAD_REQUEST,
                with_message(
                    "missing_parameters",
                    "home_stop and work_stop are required".to_string(),
                ),
            ),
            AppError::InvalidDays => (
                StatusCode::BAD_REQUEST,
                with_message(
                    "invalid_parameters",
                    "days must be between 1 and 30".to_string(),
                ),
            ),
            AppError::HomeStopNotFound { query } => (
                StatusCode::BAD_REQUEST,
                not_found("home_stop_not_found", query),
            ),
            AppError::WorkStopNotFound { query } => (
                StatusCode::BAD_REQUEST,
                not_found("work_stop_not_found", query),
            ),
            AppError::RouteNotFound => (
                StatusCode::BAD_REQUEST,
                with_message(
                    "route_not_found",
                    "Could not find a commuter rail route containing both stops.".to_string(),
                ),
            ),
            AppError::RouteUnresolved { message } => (
                StatusCode::BAD_REQUEST,
                with_message("route_unresolved", message.clone()),
            ),
            AppError::Upstream { message } => (
                StatusCode::SERVICE_UNAVAILABLE,
                with_message("upstream_unavailable", message.clone()),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.payload();
        (status, Json(body)).into_response()
    }
}

// Used where an upstream failure should surface as plain JSON rather
// than an outage calendar.
impl From<MbtaError> for AppError {
    fn from(e: MbtaError) -> Self {
        AppError::Upstream {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mbta::{
        MockScheduleSource, RouteDto, ScheduleEntry, ScheduleResponse, SideTable, StopDto,
        TripInfo,
    };
    use axum::body::to_bytes;

    fn candidate(stop_id: &str, route_id: &str) -> StopCandidate {
        StopCandidate {
            stop_id: stop_id.to_string(),
            stop_name: stop_id.to_string(),
            slug: stop_id.to_string(),
            route_id: route_id.to_string(),
            route_name: route_id.to_string(),
        }
    }

    fn franklin() -> RouteDto {
        RouteDto {
            id: "CR-Franklin".to_string(),
            long_name: "Franklin/Foxboro Line".to_string(),
            short_name: Some("Franklin".to_string()),
            direction_names: vec!["Inbound".to_string(), "Outbound".to_string()],
        }
    }

    fn entry(
        trip_id: &str,
        departure: Option<&str>,
        arrival: Option<&str>,
        stop_sequence: u32,
    ) -> ScheduleEntry {
        ScheduleEntry {
            trip_id: Some(trip_id.to_string()),
            departure_time: departure.map(|t| DateTime::parse_from_rfc3339(t).unwrap()),
            arrival_time: arrival.map(|t| DateTime::parse_from_rfc3339(t).unwrap()),
            stop_sequence: Some(stop_sequence),
        }
    }

    /// A mock with one route, two stops, and enough canned schedules for
    /// both inference (no direction filter) and fetching (filtered).
    fn commute_source() -> MockScheduleSource {
        let mut side = SideTable::default();
        side.insert_trip(
            "Trip-1",
            TripInfo {
                direction_id: Some(0),
                headsign: Some("South Station".to_string()),
            },
        );
        side.insert_trip(
            "Trip-2",
            TripInfo {
                direction_id: Some(1),
                headsign: Some("Forge Park/495".to_string()),
            },
        );

        let home_all = ScheduleResponse {
            entries: vec![entry(
                "Trip-1",
                Some("2024-04-01T07:15:00-04:00"),
                None,
                3,
            )],
            side: side.clone(),
        };
        let work_all = ScheduleResponse {
            entries: vec![entry(
                "Trip-1",
                None,
                Some("2024-04-01T08:05:00-04:00"),
                10,
            )],
            side: side.clone(),
        };
        let home_inbound = home_all.clone();
        let work_inbound = work_all.clone();
        let work_outbound = ScheduleResponse {
            entries: vec![entry(
                "Trip-2",
                Some("2024-04-01T17:20:00-04:00"),
                None,
                2,
            )],
            side: side.clone(),
        };
        let home_outbound = ScheduleResponse {
            entries: vec![entry(
                "Trip-2",
                None,
                Some("2024-04-01T18:10:00-04:00"),
                9,
            )],
            side,
        };

        MockScheduleSource::new()
            .with_route(
                franklin(),
                vec![
                    StopDto {
                        id: "place-forgp".to_string(),
                        name: "Forge Park/495".to_string(),
                    },
                    StopDto {
                        id: "place-sstat".to_string(),
                        name: "South Station".to_string(),
                    },
                ],
            )
            .with_schedule("CR-Franklin", "place-forgp", None, home_all)
            .with_schedule("CR-Franklin", "place-sstat", None, work_all)
            .with_schedule("CR-Franklin", "place-forgp", Some(0), home_inbound)
            .with_schedule("CR-Franklin", "place-sstat", Some(0), work_inbound)
            .with_schedule("CR-Franklin", "place-sstat", Some(1), work_outbound)
            .with_schedule("CR-Franklin", "place-forgp", Some(1), home_outbound)
    }

    fn state(source: MockScheduleSource) -> AppState<MockScheduleSource> {
        AppState::new(source, None, None).unwrap()
    }

    fn request(home: Option<&str>, work: Option<&str>, days: Option<i64>) -> ScheduleRequest {
        ScheduleRequest {
            home_stop: home.map(str::to_string),
            work_stop: work.map(str::to_string),
            days,
            force_refresh: None,
        }
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn serves_a_full_calendar() {
        let response = schedule_ical(
            State(state(commute_source())),
            Query(request(Some("Forge Park/495"), Some("South Station"), None)),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/calendar; charset=utf-8"
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

        let body = body_string(response).await;
        assert!(body.contains("BEGIN:VCALENDAR"));
        // One morning and one evening event.
        assert_eq!(body.matches("BEGIN:VEVENT").count(), 2);
        assert!(body.contains("UID:mbta-CR-Franklin-Trip-1-place-forgp-2024-04-01"));
        assert!(body.contains("UID:mbta-CR-Franklin-Trip-2-place-sstat-2024-04-01"));
    }

    #[tokio::test]
    async fn missing_parameters_is_a_bad_request() {
        let err = schedule_ical(
            State(state(commute_source())),
            Query(request(None, Some("South Station"), None)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::MissingParameters));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        assert!(body.contains("\"missing_parameters\""));
    }

    #[tokio::test]
    async fn defaults_fill_in_missing_parameters() {
        let mut app_state = state(commute_source());
        app_state.default_home_stop = Some("Forge Park/495".to_string());
        app_state.default_work_stop = Some("South Station".to_string());

        let response = schedule_ical(State(app_state), Query(request(None, None, None)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_home_stop_reports_the_query() {
        let err = schedule_ical(
            State(state(commute_source())),
            Query(request(Some("zzzzqqqq"), Some("South Station"), None)),
        )
        .await
        .unwrap_err();

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        assert!(body.contains("\"home_stop_not_found\""));
        assert!(body.contains("\"zzzzqqqq\""));
        assert!(body.contains("\"suggestions\":[]"));
    }

    #[tokio::test]
    async fn days_out_of_range_is_rejected() {
        for days in [0, 31, -1] {
            let err = schedule_ical(
                State(state(commute_source())),
                Query(request(
                    Some("Forge Park/495"),
                    Some("South Station"),
                    Some(days),
                )),
            )
            .await
            .unwrap_err();
            assert!(matches!(err, AppError::InvalidDays));
        }
    }

    #[tokio::test]
    async fn stops_on_different_routes_yield_route_not_found() {
        let source = MockScheduleSource::new()
            .with_route(
                franklin(),
                vec![StopDto {
                    id: "place-forgp".to_string(),
                    name: "Forge Park/495".to_string(),
                }],
            )
            .with_route(
                RouteDto {
                    id: "CR-Fitchburg".to_string(),
                    long_name: "Fitchburg Line".to_string(),
                    short_name: None,
                    direction_names: vec!["Inbound".to_string(), "Outbound".to_string()],
                },
                vec![StopDto {
                    id: "place-north".to_string(),
                    name: "Wachusett".to_string(),
                }],
            );

        let err = schedule_ical(
            State(state(source)),
            Query(request(Some("Forge Park/495"), Some("Wachusett"), None)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::RouteNotFound));
    }

    #[tokio::test]
    async fn no_connecting_trip_yields_route_unresolved() {
        // Stops share a route but no canned schedule links them.
        let source = MockScheduleSource::new().with_route(
            franklin(),
            vec![
                StopDto {
                    id: "place-forgp".to_string(),
                    name: "Forge Park/495".to_string(),
                },
                StopDto {
                    id: "place-sstat".to_string(),
                    name: "South Station".to_string(),
                },
            ],
        );

        let err = schedule_ical(
            State(state(source)),
            Query(request(Some("Forge Park/495"), Some("South Station"), None)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::RouteUnresolved { .. }));
    }

    #[tokio::test]
    async fn stops_endpoint_lists_matches() {
        let response = stops(
            State(state(commute_source())),
            Query(StopsRequest {
                query: "Station".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.0.len(), 1);
        assert_eq!(response.0[0].stop_id, "place-sstat");
        assert_eq!(response.0[0].slug, "south-station");
    }

    #[tokio::test]
    async fn outage_response_is_a_tentative_calendar() {
        let generated_at = Utc::now();
        let response = service_unavailable("MBTA API unreachable", generated_at);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/calendar; charset=utf-8"
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

        let body = body_string(response).await;
        assert!(body.contains("STATUS:TENTATIVE"));
        assert!(body.contains("UID:mbta-outage-"));
    }

    #[test]
    fn select_pair_prefers_shared_routes() {
        let home = vec![
            candidate("h1", "CR-Fitchburg"),
            candidate("h2", "CR-Franklin"),
        ];
        let work = vec![candidate("w1", "CR-Franklin")];

        let (h, w) = select_pair(&home, &work).unwrap();
        assert_eq!(h.stop_id, "h2");
        assert_eq!(w.stop_id, "w1");

        let other = vec![candidate("w2", "CR-Lowell")];
        assert!(select_pair(&home, &other).is_none());
    }
}
