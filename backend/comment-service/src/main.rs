use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use comment_service::config::{CacheBackend, Config};
use comment_service::consumers::handler_table;
use comment_service::handlers::{self, AppState};
use comment_service::repository::{CommentStore, PgCommentStore};
use comment_service::services::{
    AutoPassReviewer, CommentUseCase, CommentWorkflow, ContentReviewer, CreationStatisticsProvider,
    HttpCreationClient, HttpReviewer,
};
use comment_service::workers::review_sweeper;
use comment_service::SERVICE_NAME;
use event_dispatch::{
    ConsumerConfig, DispatchMetrics, Dispatcher, EventPublisher, KafkaDispatchRunner,
    KafkaEventPublisher, KafkaPublisherConfig, MemoryEventPublisher,
};
use event_schema::{EventMode, Topics};
use fanout_cache::{
    CacheStore, FanoutMetrics, MemoryCacheStore, PopulatePool, ReadThrough, RedisCacheStore,
};
use redis_utils::{spawn_health_check, HealthCheckConfig, RedisPool};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.app.log_format);

    info!("🔧 Starting {}", SERVICE_NAME);
    info!(
        "✅ Configuration loaded: env={}, http_port={}",
        config.app.env, config.app.http_port
    );

    // Database
    let pg_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    info!("✅ Database pool created");

    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("✅ Database migrations completed");

    let store: Arc<dyn CommentStore> =
        Arc::new(PgCommentStore::new(pg_pool.clone(), config.timeouts.store));

    // Cache
    let cache: Arc<dyn CacheStore> = match config.cache.backend {
        CacheBackend::Redis => {
            let redis = RedisPool::connect(&config.redis.url)
                .await
                .context("Failed to connect to Redis")?;
            spawn_health_check(redis.manager(), HealthCheckConfig::default());
            info!("✅ Redis connection established: {}", redis.label());
            Arc::new(RedisCacheStore::new(redis.manager(), config.timeouts.cache))
        }
        CacheBackend::Memory => {
            warn!("CACHE_BACKEND=memory: cache views live in this process only");
            Arc::new(MemoryCacheStore::new())
        }
    };
    let views = ReadThrough::new(
        cache.clone(),
        PopulatePool::new(config.cache.populate_workers, config.timeouts.populate),
    );

    let registry = prometheus::default_registry();
    FanoutMetrics::register(registry).context("Failed to register cache metrics")?;
    DispatchMetrics::register(registry).context("Failed to register dispatch metrics")?;
    info!("✅ Metrics registered");

    // Bus
    let topic_prefix = config
        .kafka
        .as_ref()
        .map(|k| k.topic_prefix.clone())
        .unwrap_or_else(|| "quill".to_string());
    let topics = Topics::with_prefix(&topic_prefix);

    let kafka_publisher = match &config.kafka {
        Some(kafka) => {
            let publisher = KafkaEventPublisher::new(&KafkaPublisherConfig {
                brokers: kafka.brokers.clone(),
                client_id: SERVICE_NAME.to_string(),
                topics: topics.clone(),
                send_timeout: config.timeouts.bus,
            })
            .context("Failed to create Kafka producer")?;
            info!("✅ Kafka producer initialized");
            Some(publisher)
        }
        None => {
            warn!("KAFKA_BROKERS not set: events are kept in memory and no consumer runs");
            None
        }
    };
    let publisher: Arc<dyn EventPublisher> = match &kafka_publisher {
        Some(p) => Arc::new(p.clone()),
        None => Arc::new(MemoryEventPublisher::new()),
    };

    // Collaborators
    let creations: Arc<dyn CreationStatisticsProvider> = Arc::new(
        HttpCreationClient::new(&config.facade.creation_service_url, config.timeouts.facade)
            .context("Failed to create creation façade client")?,
    );
    let reviewer: Arc<dyn ContentReviewer> = match &config.reviewer.url {
        Some(url) => Arc::new(
            HttpReviewer::new(url, &config.reviewer.callback_url, config.timeouts.reviewer)
                .context("Failed to create reviewer client")?,
        ),
        None => {
            warn!("REVIEWER_URL not set: every review passes automatically");
            Arc::new(AutoPassReviewer::new(
                publisher.clone(),
                SERVICE_NAME,
                EventMode::CommentReviewResult,
            ))
        }
    };

    let mut join_set: JoinSet<Result<()>> = JoinSet::new();

    // Consumers
    if let (Some(kafka), Some(kafka_publisher)) = (&config.kafka, kafka_publisher) {
        let workflow = Arc::new(CommentWorkflow::new(
            store.clone(),
            cache.clone(),
            publisher.clone(),
            reviewer,
            creations.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            handler_table(workflow),
            config.redelivery.clone(),
        ));
        let runner = KafkaDispatchRunner::new(
            ConsumerConfig {
                brokers: kafka.brokers.clone(),
                group_id: kafka.group_id.clone(),
                topic: topics.comment.clone(),
                workers: kafka.workers,
            },
            dispatcher,
            kafka_publisher,
        );

        let mut consumers = JoinSet::new();
        runner.spawn(&mut consumers);
        join_set.spawn(async move {
            while let Some(result) = consumers.join_next().await {
                if let Err(e) = result {
                    error!("Consumer task panicked: {:#}", e);
                }
            }
            Err(anyhow::anyhow!("All consumers stopped"))
        });
        info!("✅ Consumers started on {}", topics.comment);
    }

    // Review backlog sweeper
    let sweeper_store = store.clone();
    let sweeper_publisher = publisher.clone();
    let sweeper_config = config.sweeper.clone();
    join_set.spawn(async move {
        review_sweeper::run(sweeper_store, sweeper_publisher, sweeper_config).await;
        Ok(())
    });
    info!("✅ Review sweeper started");

    // HTTP
    let state = AppState {
        comments: CommentUseCase::new(store, creations, publisher.clone(), views.clone()),
        publisher,
    };
    let http_addr = format!("{}:{}", config.app.host, config.app.http_port);
    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(handlers::configure)
    })
    .bind(&http_addr)
    .context("Failed to bind HTTP server")?
    .run();
    join_set.spawn(async move {
        http_server
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
    });
    info!("🚀 HTTP server listening on http://{}", http_addr);
    info!("🎉 {} is running", SERVICE_NAME);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("🛑 Shutdown signal received");
                break;
            }
            result = join_set.join_next() => match result {
                Some(Ok(Ok(()))) => info!("Task completed successfully"),
                Some(Ok(Err(e))) => {
                    error!("Task failed: {:#}", e);
                    join_set.abort_all();
                    return Err(e);
                }
                Some(Err(e)) => {
                    error!("Task panicked: {:#}", e);
                    join_set.abort_all();
                    return Err(anyhow::anyhow!("Task panicked: {}", e));
                }
                None => break,
            }
        }
    }

    // Let in-flight cache populates finish before exiting.
    if tokio::time::timeout(Duration::from_secs(5), views.populate_pool().wait_idle())
        .await
        .is_err()
    {
        warn!("Populate tasks still running at shutdown");
    }
    join_set.abort_all();

    info!("🛑 {} shut down", SERVICE_NAME);
    Ok(())
}
