//! Web layer serving the calendar feed.
//!
//! Provides the health check, the stop lookup endpoint and the iCalendar
//! feed itself.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::AppState;
