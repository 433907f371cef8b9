//! Application services: recommendation, caching, content lookups and jobs.

pub mod air_quality;
pub mod content;
pub mod error;
pub mod marketplace;
pub mod optimize;
pub mod related;
pub mod repos;
pub mod reviews;
pub mod storage;
