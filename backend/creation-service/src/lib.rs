//! Articles, columns and talks, with collections and the cross-kind
//! leaderboard. Also serves the internal façade comment-service uses to keep
//! comment counts in step.

pub mod cache;
pub mod config;
pub mod consumers;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod repository;
pub mod services;
pub mod workers;

pub const SERVICE_NAME: &str = "creation-service";
