use anyhow::{Context, Result};
use orderflow::cache::TtlCache;
use orderflow::config::AppConfig;
use orderflow::consumer::{
    Consumer, InMemoryBroker, MessageSource, OrderConsumer, OrderMessageProcessor,
};
use orderflow::logging;
use orderflow::server::{self, build_router};
use orderflow::service::{CachedOrderService, OrderService};
use orderflow::storage::{InMemoryOrderRepository, OrderRepository};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const LOCAL_TOPIC: &str = "orders";
const LOCAL_GROUP: &str = "orderflow";

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init(config.env).context("Failed to initialize logging")?;

    tracing::info!(env = ?config.env, "Starting orderflow");

    let shutdown = CancellationToken::new();

    let repository = build_repository(&config).await?;

    let cache = TtlCache::new(config.cache.default_ttl());
    let janitor = cache.spawn_janitor(config.cache.cleanup_interval(), shutdown.child_token());

    let service = Arc::new(CachedOrderService::new(
        repository.clone(),
        Arc::new(cache.clone()),
    ));
    if let Err(e) = service.load_all().await {
        tracing::error!(error = %e, "Cache warm-up failed, starting with an empty cache");
    }

    let source = build_source(&config)?;
    let processor = Arc::new(OrderMessageProcessor::new(
        repository,
        config.consumer.retry_policy(),
    ));
    let mut consumer = OrderConsumer::new(source, processor);
    let consumer_task = {
        let shutdown = shutdown.child_token();
        tokio::spawn(async move { consumer.run(shutdown).await })
    };

    let app = build_router(service, config.http_server.timeout());
    let mut server_task = {
        let shutdown = shutdown.child_token();
        let address = config.http_server.address.clone();
        tokio::spawn(async move { server::serve(app, &address, shutdown).await })
    };

    let server_exited = tokio::select! {
        _ = server::shutdown_signal() => None,
        result = &mut server_task => Some(result),
    };
    shutdown.cancel();

    match tokio::time::timeout(config.consumer.shutdown_timeout(), consumer_task).await {
        Ok(Ok(Ok(stats))) => tracing::info!(?stats, "Consumer finished"),
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "Consumer failed"),
        Ok(Err(e)) => tracing::error!(error = %e, "Consumer task panicked"),
        Err(_) => tracing::warn!("Consumer did not stop in time"),
    }

    let server_result = match server_exited {
        Some(result) => result,
        None => {
            match tokio::time::timeout(config.http_server.shutdown_timeout(), server_task).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("HTTP server did not stop in time");
                    Ok(Ok(()))
                }
            }
        }
    };
    server_result
        .context("HTTP server task panicked")?
        .context("HTTP server failed")?;

    let _ = janitor.await;
    tracing::info!("orderflow stopped");
    Ok(())
}

#[cfg(feature = "postgres")]
async fn build_repository(config: &AppConfig) -> Result<Arc<dyn OrderRepository>> {
    use orderflow::storage::PostgresOrderRepository;
    use orderflow::storage::postgres::ensure_schema;
    use sqlx::postgres::PgPoolOptions;

    let Some(database) = &config.database else {
        tracing::warn!("No database configured, using in-memory storage");
        return Ok(Arc::new(InMemoryOrderRepository::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .acquire_timeout(database.acquire_timeout())
        .connect(&database.url())
        .await
        .with_context(|| format!("Failed to connect to database at {}", database.host))?;
    ensure_schema(&pool).await?;

    tracing::info!(host = %database.host, name = %database.name, "Connected to PostgreSQL");
    Ok(Arc::new(PostgresOrderRepository::new(pool)))
}

#[cfg(not(feature = "postgres"))]
async fn build_repository(config: &AppConfig) -> Result<Arc<dyn OrderRepository>> {
    if config.database.is_some() {
        tracing::warn!("Built without the postgres feature, ignoring database settings");
    }
    tracing::warn!("Using in-memory storage, orders are lost on restart");
    Ok(Arc::new(InMemoryOrderRepository::new()))
}

#[cfg(feature = "kafka")]
fn build_source(config: &AppConfig) -> Result<Arc<dyn MessageSource>> {
    use orderflow::consumer::KafkaSource;

    match &config.kafka {
        Some(kafka) => Ok(Arc::new(KafkaSource::new(kafka)?)),
        None => local_source(),
    }
}

#[cfg(not(feature = "kafka"))]
fn build_source(config: &AppConfig) -> Result<Arc<dyn MessageSource>> {
    if config.kafka.is_some() {
        tracing::warn!("Built without the kafka feature, ignoring kafka settings");
    }
    local_source()
}

fn local_source() -> Result<Arc<dyn MessageSource>> {
    tracing::warn!("No message broker configured, consuming from an in-process broker");
    let broker = InMemoryBroker::new();
    Ok(Arc::new(broker.subscribe(LOCAL_TOPIC, LOCAL_GROUP)?))
}
