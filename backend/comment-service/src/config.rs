/// Configuration management for Comment Service
///
/// Loads configuration from environment variables.
use anyhow::{Context, Result};
use event_dispatch::RedeliveryPolicy;
use resilience::BoundaryTimeouts;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    /// `None` when `KAFKA_BROKERS` is unset; the service then publishes to an
    /// in-process bus and runs no consumers.
    pub kafka: Option<KafkaConfig>,
    pub cache: CacheConfig,
    pub facade: FacadeConfig,
    pub reviewer: ReviewerConfig,
    pub sweeper: SweeperConfig,
    pub timeouts: BoundaryTimeouts,
    pub redelivery: RedeliveryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
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
    /// Parallel consumers on the home topic
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
    /// Max concurrent read-through populate tasks
    pub populate_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacadeConfig {
    /// Base URL of creation-service's internal API
    pub creation_service_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerConfig {
    /// External moderation endpoint; auto-pass when unset
    pub url: Option<String>,
    /// Where the reviewer should post its verdict
    pub callback_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    pub interval: Duration,
    /// How long an entity may stay `reviewing` before its request is resent
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
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_or("PORT", 8081),
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
                group_id: std::env::var("KAFKA_COMMENT_GROUP_ID")
                    .unwrap_or_else(|_| "quill-comment-service".to_string()),
                workers: env_or("CONSUMER_WORKERS", 4),
            });

        let backend = match std::env::var("CACHE_BACKEND").as_deref() {
            Ok("memory") => CacheBackend::Memory,
            _ => CacheBackend::Redis,
        };
        let cache = CacheConfig {
            backend,
            populate_workers: env_or("POPULATE_WORKERS", 64),
        };

        let facade = FacadeConfig {
            creation_service_url: std::env::var("CREATION_SERVICE_URL")
                .unwrap_or_else(|_| "http://creation-service:8082".to_string()),
        };

        let reviewer = ReviewerConfig {
            url: std::env::var("REVIEWER_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            callback_url: std::env::var("REVIEW_CALLBACK_URL")
                .unwrap_or_else(|_| format!("http://comment-service:{}/callbacks/review", app.http_port)),
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
            facade,
            reviewer,
            sweeper,
            timeouts: BoundaryTimeouts::from_env(),
            redelivery: RedeliveryPolicy::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_optional() {
        for name in [
            "PORT",
            "KAFKA_BROKERS",
            "CACHE_BACKEND",
            "REVIEWER_URL",
            "CONSUMER_WORKERS",
            "REVIEW_SWEEP_GRACE_SECS",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_default_values() {
        clear_optional();
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("REDIS_URL", "redis://localhost");

        let config = Config::from_env().unwrap();

        assert_eq!(config.app.env, "development");
        assert_eq!(config.app.http_port, 8081);
        assert_eq!(config.database.max_connections, 20);
        assert!(config.kafka.is_none());
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert!(config.reviewer.url.is_none());
        assert_eq!(config.sweeper.grace, Duration::from_secs(300));
        assert_eq!(config.redelivery.budget(), 5);
    }

    #[test]
    #[serial]
    fn test_kafka_and_memory_cache() {
        clear_optional();
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("REDIS_URL", "redis://localhost");
        std::env::set_var("KAFKA_BROKERS", "kafka:9092");
        std::env::set_var("CONSUMER_WORKERS", "8");
        std::env::set_var("CACHE_BACKEND", "memory");

        let config = Config::from_env().unwrap();
        let kafka = config.kafka.unwrap();

        assert_eq!(kafka.topic_prefix, "quill");
        assert_eq!(kafka.workers, 8);
        assert_eq!(config.cache.backend, CacheBackend::Memory);

        clear_optional();
    }

    #[test]
    #[serial]
    fn test_missing_database_url_fails() {
        clear_optional();
        std::env::remove_var("DATABASE_URL");
        std::env::set_var("REDIS_URL", "redis://localhost");

        assert!(Config::from_env().is_err());
    }
}
