use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionAddr, ConnectionInfo, IntoConnectionInfo};
use resilience::timeout::with_timeout;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Redis connection pool shared by every cache view of a service.
#[derive(Clone)]
pub struct RedisPool {
    manager: SharedConnectionManager,
    label: String,
}

impl RedisPool {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let info: ConnectionInfo = redis_url
            .into_connection_info()
            .context("failed to parse REDIS_URL connection string")?;
        let label = address_label(&info.addr);

        let client = Client::open(info).context("failed to construct Redis client")?;
        let connection_manager = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;

        info!(addr = %label, "Redis connection manager ready");

        Ok(Self {
            manager: Arc::new(Mutex::new(connection_manager)),
            label,
        })
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Clone a connection out of the shared manager without holding the lock
/// across the command that follows.
pub async fn connection(manager: &SharedConnectionManager) -> ConnectionManager {
    let guard = manager.lock().await;
    guard.clone()
}

/// PING with a bounded wait.
pub async fn ping(manager: &SharedConnectionManager, timeout: Duration) -> Result<()> {
    let mut conn = connection(manager).await;
    let reply: String = with_timeout(timeout, redis::cmd("PING").query_async(&mut conn))
        .await
        .context("redis PING timed out")?
        .context("redis PING failed")?;

    if reply != "PONG" {
        anyhow::bail!("unexpected PING reply: {}", reply);
    }
    Ok(())
}

/// Configuration for the keep-alive probe
#[derive(Clone, Debug)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub alert_after: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(2),
            alert_after: 5,
        }
    }
}

/// Periodically ping Redis so idle connections are recycled by the
/// connection manager before a fan-out script hits a broken pipe.
pub fn spawn_health_check(manager: SharedConnectionManager, config: HealthCheckConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut consecutive_failures = 0u32;

        loop {
            sleep(config.interval).await;

            match ping(&manager, config.timeout).await {
                Ok(()) => {
                    if consecutive_failures > 0 {
                        info!(previous_failures = consecutive_failures, "Redis connection recovered");
                    }
                    consecutive_failures = 0;
                    debug!("Redis health check: OK");
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= config.alert_after {
                        error!(
                            consecutive_failures,
                            error = %e,
                            "Redis health check: multiple consecutive failures"
                        );
                    } else {
                        warn!(consecutive_failures, error = %e, "Redis health check failed");
                    }
                }
            }
        }
    })
}

fn address_label(addr: &ConnectionAddr) -> String {
    match addr {
        ConnectionAddr::Tcp(host, port) => format!("{}:{}", host, port),
        ConnectionAddr::TcpTls { host, port, .. } => format!("{}:{} (tls)", host, port),
        ConnectionAddr::Unix(path) => path.display().to_string(),
        #[allow(unreachable_patterns)]
        _ => "redis".to_string(),
    }
}
