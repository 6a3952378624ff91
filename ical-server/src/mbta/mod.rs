//! MBTA v3 API integration.
//!
//! This module is the boundary to the upstream schedule source: the HTTP
//! client with its retry and pagination mechanics, the typed decoding of
//! JSON:API payloads, the `ScheduleSource` seam the core depends on, and
//! a mock source for tests.

pub mod client;
pub mod error;
pub mod mock;
pub mod source;
pub mod types;

pub use client::{MbtaClient, MbtaConfig};
pub use error::MbtaError;
pub use mock::MockScheduleSource;
pub use source::{ScheduleQuery, ScheduleSource};
pub use types::{RouteDto, ScheduleEntry, ScheduleResponse, SideTable, StopDto, TripInfo};
