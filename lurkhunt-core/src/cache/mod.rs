//! Scan-scoped viewer-sighting cache, sharded across independent Redis
//! connections.

pub mod sightings;

pub use sightings::{CachedSighting, SightingsCache};
