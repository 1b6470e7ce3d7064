/// Timeout wrappers for async operations
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// The outbound dependency a bounded call talks to. Used to label timeouts
/// in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    Store,
    Cache,
    Bus,
    Facade,
    Reviewer,
    Populate,
}

impl Boundary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Boundary::Store => "store",
            Boundary::Cache => "cache",
            Boundary::Bus => "bus",
            Boundary::Facade => "facade",
            Boundary::Reviewer => "reviewer",
            Boundary::Populate => "populate",
        }
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("Operation timed out after {0:?}")]
    Elapsed(Duration),
    #[error("{boundary} call timed out after {after:?}")]
    BoundaryElapsed { boundary: Boundary, after: Duration },
}

impl TimeoutError {
    pub fn elapsed(&self) -> Duration {
        match self {
            TimeoutError::Elapsed(d) => *d,
            TimeoutError::BoundaryElapsed { after, .. } => *after,
        }
    }
}

/// Execute a future with timeout
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    timeout(duration, future)
        .await
        .map_err(|_| TimeoutError::Elapsed(duration))
}

/// Execute a fallible future against a named boundary.
///
/// The inner error type absorbs the timeout, so callers keep a single error
/// type and use `?` as usual.
pub async fn with_timeout_result<F, T, E>(
    boundary: Boundary,
    duration: Duration,
    future: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TimeoutError>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(boundary = %boundary, after_ms = duration.as_millis() as u64, "Outbound call timed out");
            Err(E::from(TimeoutError::BoundaryElapsed {
                boundary,
                after: duration,
            }))
        }
    }
}
