//! Cache error types

use resilience::TimeoutError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache timeout: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("Invalid cache data: {0}")]
    InvalidData(String),

    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
