//! Stop directory: slug normalization, indexing and fuzzy resolution.

pub mod directory;
pub mod slug;

pub use directory::{RouteCandidate, StopCandidate, StopDirectory};
pub use slug::{similarity, slugify};
