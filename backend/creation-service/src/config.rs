/// Configuration for Creation Service, loaded from the environment.
use anyhow::{Context, Result};
use event_dispatch::RedeliveryPolicy;
use resilience::BoundaryTimeouts;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    /// Unset `KAFKA_BROKERS` means in-process publishing and no consumers.
    pub kafka: Option<KafkaConfig>,
    pub cache: CacheConfig,
    pub reviewer: ReviewerConfig,
    pub sweeper: SweeperConfig,
    pub timeouts: BoundaryTimeouts,
    pub redelivery: RedeliveryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub http_port: u16,
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic_prefix: String,
    pub group_id: String,
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub populate_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerConfig {
    pub url: Option<String>,
    pub callback_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub grace: Duration,
    pub batch_size: i64,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_or("PORT", 8082),
            log_format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable not set")?,
            max_connections: env_or("DB_MAX_CONNECTIONS", 20),
            min_connections: env_or("DB_MIN_CONNECTIONS", 5),
        };

        let redis = RedisConfig {
            url: std::env::var("REDIS_URL").context("REDIS_URL environment variable not set")?,
        };

        let kafka = std::env::var("KAFKA_BROKERS")
            .ok()
            .filter(|brokers| !brokers.trim().is_empty())
            .map(|brokers| KafkaConfig {
                brokers,
                topic_prefix: std::env::var("KAFKA_TOPIC_PREFIX")
                    .unwrap_or_else(|_| "quill".to_string()),
                group_id: std::env::var("KAFKA_CREATION_GROUP_ID")
                    .unwrap_or_else(|_| "quill-creation-service".to_string()),
                workers: env_or("CONSUMER_WORKERS", 4),
            });

        let cache = CacheConfig {
            backend: match std::env::var("CACHE_BACKEND").as_deref() {
                Ok("memory") => CacheBackend::Memory,
                _ => CacheBackend::Redis,
            },
            populate_workers: env_or("POPULATE_WORKERS", 64),
        };

        let reviewer = ReviewerConfig {
            url: std::env::var("REVIEWER_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            callback_url: std::env::var("REVIEW_CALLBACK_URL").unwrap_or_else(|_| {
                format!("http://creation-service:{}/callbacks/review", app.http_port)
            }),
        };

        let sweeper = SweeperConfig {
            interval: Duration::from_secs(env_or("REVIEW_SWEEP_INTERVAL_SECS", 60)),
            grace: Duration::from_secs(env_or("REVIEW_SWEEP_GRACE_SECS", 300)),
            batch_size: env_or("REVIEW_SWEEP_BATCH", 100),
        };

        Ok(Config {
            app,
            database,
            redis,
            kafka,
            cache,
            reviewer,
            sweeper,
            timeouts: BoundaryTimeouts::from_env(),
            redelivery: RedeliveryPolicy::from_env(),
        })
    }
}
