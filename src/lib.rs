//! Backend for an indoor golf venue site: content, marketplace, air quality
//! and an image optimization job.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
