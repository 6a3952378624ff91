//! Aggregation of departures into calendar events.
//!
//! Morning departures (strictly before local noon) become the outbound
//! commute; everything at or after noon is the return. Each day keeps at
//! most the earliest eight events per bucket, and every event gets a
//! deterministic uid so regeneration is idempotent.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use chrono_tz::Tz;

use crate::departures::Departure;
use crate::stops::{RouteCandidate, StopCandidate};

/// Cap on events per calendar day within one bucket.
pub const MAX_EVENTS_PER_DAY: usize = 8;

/// The morning/evening boundary. Exactly noon counts as evening.
const NOON: NaiveTime = match NaiveTime::from_hms_opt(12, 0, 0) {
    Some(t) => t,
    None => panic!("noon is a valid time"),
};

const TRIP_LINK: &str = "https://www.mbta.com/schedules/{route}/line?trip={trip}";

/// One calendar event, ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub uid: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub status: &'static str,
}

/// Which side of the noon boundary a bucket keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Morning,
    Evening,
}

impl Bucket {
    fn keeps(self, departure: &Departure) -> bool {
        match self {
            Bucket::Morning => departure.departure.time() < NOON,
            Bucket::Evening => departure.departure.time() >= NOON,
        }
    }
}

/// Build the full event list for a commute: morning trips from home and
/// evening trips back from work.
pub fn build_events(
    route: &RouteCandidate,
    home: &StopCandidate,
    work: &StopCandidate,
    morning: &[Departure],
    evening: &[Departure],
) -> Vec<CalendarEvent> {
    let mut events = departures_to_events(route, home, work, morning, Bucket::Morning);
    events.extend(departures_to_events(route, work, home, evening, Bucket::Evening));
    events
}

/// Turn one direction's departures into events.
///
/// Departures are filtered to the bucket, grouped by local calendar date
/// (first-seen date order), sorted ascending within each day and capped.
pub fn departures_to_events(
    route: &RouteCandidate,
    origin: &StopCandidate,
    destination: &StopCandidate,
    departures: &[Departure],
    bucket: Bucket,
) -> Vec<CalendarEvent> {
    let mut grouped: Vec<(NaiveDate, Vec<&Departure>)> = Vec::new();
    for departure in departures {
        if !bucket.keeps(departure) {
            continue;
        }
        let date = departure.departure.date_naive();
        match grouped.iter_mut().find(|(d, _)| *d == date) {
            Some((_, day)) => day.push(departure),
            None => grouped.push((date, vec![departure])),
        }
    }

    let mut events = Vec::new();
    for (date, mut day) in grouped {
        day.sort_by_key(|d| d.departure);
        day.truncate(MAX_EVENTS_PER_DAY);
        for departure in day {
            events.push(to_event(route, origin, destination, departure, date));
        }
    }
    events
}

fn to_event(
    route: &RouteCandidate,
    origin: &StopCandidate,
    destination: &StopCandidate,
    departure: &Departure,
    date: NaiveDate,
) -> CalendarEvent {
    let end = match departure.arrival {
        Some(arrival) if arrival > departure.departure => arrival,
        Some(_) => departure.departure + Duration::minutes(1),
        None => departure.departure + Duration::minutes(5),
    };

    let direction_name = direction_name(route, departure.direction_id);
    let time_label = format_clock(departure.departure);
    let route_label = route.short_name.as_deref().unwrap_or(&route.long_name);
    let link = TRIP_LINK
        .replace("{route}", &route.route_id)
        .replace("{trip}", &departure.trip_id);

    let description = [
        format!("Route: {}", route.long_name),
        format!("Origin: {}", origin.stop_name),
        format!("Destination: {}", destination.stop_name),
        format!("Headsign: {}", departure.headsign),
        format!("Direction: {direction_name}"),
        format!("Trip: {}", departure.trip_id),
        format!("Stop sequence: {}", departure.stop_sequence),
        format!("Link: {link}"),
    ]
    .join("\n");

    CalendarEvent {
        // Pure function of its inputs: identical departures regenerate
        // byte-identical uids.
        uid: format!(
            "mbta-{}-{}-{}-{}",
            route.route_id, departure.trip_id, departure.origin_stop_id, date
        ),
        start: departure.departure,
        end,
        summary: format!(
            "CR {route_label} – Trip {} – {direction_name} – {time_label}",
            departure.trip_id
        ),
        description,
        location: format!("{} – {}", route.long_name, origin.stop_name),
        status: "CONFIRMED",
    }
}

/// The route's display name for a direction id, with a fixed fallback.
fn direction_name(route: &RouteCandidate, direction_id: u8) -> String {
    if let Some(name) = route.direction_names.get(direction_id as usize)
        && !name.trim().is_empty()
    {
        return name.clone();
    }
    if direction_id == 0 { "Inbound" } else { "Outbound" }.to_string()
}

/// "7:15 AM" style label: 12-hour clock without a leading zero.
fn format_clock(instant: DateTime<Tz>) -> String {
    let formatted = instant.format("%I:%M %p").to_string();
    formatted.trim_start_matches('0').to_string()
}
