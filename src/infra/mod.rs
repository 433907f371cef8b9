//! Infrastructure adapters and runtime bootstrap.

pub mod air_quality;
pub mod db;
pub mod error;
pub mod http;
pub mod storage;
pub mod telemetry;
