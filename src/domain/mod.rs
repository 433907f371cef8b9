//! Domain layer types and invariants.

pub mod air_quality;
pub mod entities;
pub mod error;
pub mod images;
pub mod related;
pub mod types;
