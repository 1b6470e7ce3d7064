//! Comments and replies on creations.
//!
//! Client writes land in PostgreSQL and hand their cache, search and
//! aggregate fan-out to the bus; reads are served cache-aside from Redis.

pub mod cache;
pub mod config;
pub mod consumers;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod repository;
pub mod services;
pub mod workers;

/// Envelope `source` for every event this service publishes.
pub const SERVICE_NAME: &str = "comment-service";
