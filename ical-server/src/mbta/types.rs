//! Typed decoding of MBTA v3 (JSON:API) payloads.
//!
//! The raw wire format carries loosely-typed attribute dictionaries and a
//! relationship side-table. Everything is lowered into explicit records
//! here, at the collaborator boundary; the rest of the crate never touches
//! raw JSON.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Raw wire shapes
// ---------------------------------------------------------------------------

/// One page of a JSON:API list response.
#[derive(Debug, Deserialize)]
pub(crate) struct RawPage {
    #[serde(default)]
    pub data: Vec<RawResource>,
    #[serde(default)]
    pub included: Vec<RawResource>,
    #[serde(default)]
    pub links: RawLinks,
}

/// A JSON:API single-resource response.
#[derive(Debug, Deserialize)]
pub(crate) struct RawSingle {
    pub data: RawResource,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawLinks {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawResource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
    #[serde(default)]
    pub relationships: RawRelationships,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawRelationships {
    pub trip: Option<RawRelationship>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawRelationship {
    pub data: Option<RawRelationshipData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawRelationshipData {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
struct RouteAttributes {
    long_name: Option<String>,
    short_name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    direction_names: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StopAttributes {
    name: Option<String>,
    platform_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ScheduleAttributes {
    departure_time: Option<String>,
    arrival_time: Option<String>,
    stop_sequence: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct TripAttributes {
    headsign: Option<String>,
    name: Option<String>,
    direction_id: Option<u8>,
}

// ---------------------------------------------------------------------------
// Typed records seen by the core
// ---------------------------------------------------------------------------

/// A route as listed by the API.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDto {
    pub id: String,
    pub long_name: String,
    pub short_name: Option<String>,
    /// Display names indexed by direction id; exactly two are expected.
    pub direction_names: Vec<String>,
}

/// A stop as listed for a route.
#[derive(Debug, Clone, PartialEq)]
pub struct StopDto {
    pub id: String,
    pub name: String,
}

/// One schedule entry for a (route, stop) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub trip_id: Option<String>,
    pub departure_time: Option<DateTime<FixedOffset>>,
    pub arrival_time: Option<DateTime<FixedOffset>>,
    pub stop_sequence: Option<u32>,
}

/// Per-trip metadata from the response side-table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripInfo {
    pub direction_id: Option<u8>,
    /// Headsign text, falling back to the trip's display name.
    pub headsign: Option<String>,
}

/// Side-table of included entities, keyed by (entity type, entity id).
///
/// Only trip metadata is consulted by the core; other included entity
/// kinds are ignored at decode time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideTable {
    trips: HashMap<String, TripInfo>,
}

impl SideTable {
    /// Look up trip metadata by trip id.
    pub fn trip(&self, trip_id: &str) -> Option<&TripInfo> {
        self.trips.get(trip_id)
    }

    /// Insert trip metadata (for building fixtures).
    pub fn insert_trip(&mut self, trip_id: impl Into<String>, info: TripInfo) {
        self.trips.insert(trip_id.into(), info);
    }

    /// Merge another side-table into this one; the other's entries win.
    pub fn merge(&mut self, other: &SideTable) {
        for (id, info) in &other.trips {
            self.trips.insert(id.clone(), info.clone());
        }
    }

    pub(crate) fn ingest(&mut self, resource: &RawResource) {
        if resource.kind != "trip" {
            return;
        }
        let attrs: TripAttributes =
            serde_json::from_value(resource.attributes.clone()).unwrap_or_default();
        self.trips.insert(
            resource.id.clone(),
            TripInfo {
                direction_id: attrs.direction_id,
                headsign: attrs.headsign.or(attrs.name),
            },
        );
    }
}

/// Schedule entries plus the side-table shipped alongside them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleResponse {
    pub entries: Vec<ScheduleEntry>,
    pub side: SideTable,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

pub(crate) fn decode_route(resource: &RawResource) -> RouteDto {
    let attrs: RouteAttributes =
        serde_json::from_value(resource.attributes.clone()).unwrap_or_default();
    RouteDto {
        long_name: attrs
            .long_name
            .or(attrs.description)
            .unwrap_or_else(|| resource.id.clone()),
        short_name: attrs.short_name,
        direction_names: attrs.direction_names,
        id: resource.id.clone(),
    }
}

pub(crate) fn decode_stop(resource: &RawResource) -> StopDto {
    let attrs: StopAttributes =
        serde_json::from_value(resource.attributes.clone()).unwrap_or_default();
    StopDto {
        name: attrs
            .name
            .or(attrs.platform_name)
            .unwrap_or_else(|| resource.id.clone()),
        id: resource.id.clone(),
    }
}

pub(crate) fn decode_schedule_entry(resource: &RawResource) -> ScheduleEntry {
    let attrs: ScheduleAttributes =
        serde_json::from_value(resource.attributes.clone()).unwrap_or_default();
    ScheduleEntry {
        trip_id: resource
            .relationships
            .trip
            .as_ref()
            .and_then(|rel| rel.data.as_ref())
            .map(|data| data.id.clone()),
        departure_time: attrs.departure_time.as_deref().and_then(parse_time),
        arrival_time: attrs.arrival_time.as_deref().and_then(parse_time),
        stop_sequence: attrs.stop_sequence,
    }
}

/// Parse an RFC 3339 timestamp; malformed values decode to `None`.
fn parse_time(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok()
}
