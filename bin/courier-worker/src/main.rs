//! Courier background worker.
//!
//! Runs the outbox dispatcher and, in broker mode, the broker consumer.
//! This binary is also the composition root: it builds the registries and
//! wires handlers to their collaborators.
//!
//! ```text
//! courier-worker [--job <name|all>] [--once] [--interval <seconds>]
//!                [--batch-size <n>] [--config <path>]
//! ```
//!
//! Exit codes: 0 on clean shutdown, non-zero on startup/config errors.

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use courier_broker::{EventBus, NoopEventBus, RabbitMqEventBus, RabbitMqSettings};
use courier_config::{AppConfig, BrokerDriver, ConfigLoader, DispatchStrategy};
use courier_domain::{
    BulkImportProcessV1, BulkImportStageV1, MessageRequestReadyToSendV1, MessengerType,
};
use courier_files::{FileStore, LocalDirFileStore};
use courier_importing::{
    BulkImportProcessHandler, BulkImportStageHandler, ImportRegistry, TabularReaderResolver,
};
use courier_messaging::{
    MessageRequestImportHandler, MessengerFactory, MessengerRegistry, SendDispatchHandler,
    TelegramMessengerFactory, UnconfiguredTelegramClientFactory, WhatsappHttpApi,
    WhatsappMessengerFactory,
};
use courier_outbox::{
    run_consumer, BrokerConsumer, OutboxDispatcher, OutboxRegistry,
};
use courier_redis::{RedisStagingStore, StagingStore};
use sqlx::postgres::PgPoolOptions;

const JOB_DISPATCH: &str = "dispatch_outbox_events";
const JOB_CONSUME: &str = "consume_broker_events";

#[derive(Parser, Debug)]
#[command(name = "courier-worker", about = "Run courier background jobs")]
struct Args {
    /// Job name, or 'all'
    #[arg(long, default_value = "all")]
    job: String,

    /// Run one dispatcher tick and exit
    #[arg(long)]
    once: bool,

    /// Override the poll interval in seconds
    #[arg(long)]
    interval: Option<f64>,

    /// Override the dispatch batch size
    #[arg(long)]
    batch_size: Option<u32>,

    /// Explicit config file path
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    courier_common::logging::init_logging("courier-worker");

    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    let known_jobs = [JOB_DISPATCH, JOB_CONSUME];
    if args.job != "all" && !known_jobs.contains(&args.job.as_str()) {
        anyhow::bail!(
            "Unknown job '{}'. Known: {}",
            args.job,
            known_jobs.join(", ")
        );
    }

    info!(job = %args.job, once = args.once, "Starting courier worker");

    let runtime = build_runtime(&config).await?;

    if args.job == JOB_CONSUME && !runtime.event_bus.is_enabled() {
        anyhow::bail!("job '{JOB_CONSUME}' requires broker.driver != 'none'");
    }

    let interval = Duration::from_secs_f64(
        args.interval.unwrap_or(config.outbox.poll_interval_secs),
    );
    let batch_size = args.batch_size.unwrap_or(config.outbox.batch_size);

    if args.once {
        if args.job == JOB_CONSUME {
            anyhow::bail!("--once is not supported for the consumer job");
        }
        let summary = runtime.dispatcher.run_tick(batch_size).await?;
        info!(
            processed = summary.processed,
            rescheduled = summary.rescheduled,
            dead_lettered = summary.dead_lettered,
            "Tick complete"
        );
        return Ok(());
    }

    let mut tasks = Vec::new();

    if args.job == "all" || args.job == JOB_DISPATCH {
        let dispatcher = runtime.dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            dispatcher.run(interval, batch_size).await;
        }));
    }

    if args.job == JOB_CONSUME || (args.job == "all" && runtime.event_bus.is_enabled()) {
        let event_bus = runtime.event_bus.clone();
        let consumer = runtime.consumer.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = run_consumer(event_bus, consumer).await {
                error!(error = %e, "Broker consumer stopped");
            }
        }));
    } else if args.job == "all" && !runtime.event_bus.is_enabled() {
        info!("Broker disabled; consumer job not started");
    }

    if tasks.is_empty() {
        warn!("No jobs selected; exiting");
        return Ok(());
    }

    // health/metrics endpoint
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.worker.metrics_port));
    let metrics_app = axum::Router::new()
        .route("/health", axum::routing::get(health_handler))
        .route("/ready", axum::routing::get(ready_handler));
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics port {metrics_addr}"))?;
    info!("Health endpoint listening on http://{metrics_addr}/health");
    tasks.push(tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics_app).await {
            error!(error = %e, "Metrics server stopped");
        }
    }));

    shutdown_signal().await;
    info!("Shutdown signal received");

    for task in &tasks {
        task.abort();
    }
    let _ = runtime.event_bus.close().await;

    info!("Courier worker shutdown complete");
    Ok(())
}

struct Runtime {
    dispatcher: Arc<OutboxDispatcher>,
    consumer: Arc<BrokerConsumer>,
    event_bus: Arc<dyn EventBus>,
}

async fn build_runtime(config: &AppConfig) -> Result<Runtime> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("failed to connect to PostgreSQL")?;
    courier_store::schema::init_schema(&pool).await?;

    let redis_client =
        redis::Client::open(config.redis.url.as_str()).context("invalid redis url")?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client)
        .await
        .context("failed to connect to Redis")?;
    let staging: Arc<dyn StagingStore> = Arc::new(RedisStagingStore::new(redis_conn));

    let event_bus: Arc<dyn EventBus> = match config.broker.driver {
        BrokerDriver::None => Arc::new(NoopEventBus::new()),
        BrokerDriver::Rabbitmq => Arc::new(RabbitMqEventBus::new(RabbitMqSettings {
            url: config.broker.url.clone(),
            exchange: config.broker.exchange.clone(),
            exchange_type: config.broker.exchange_type.clone(),
            queue: config.broker.queue.clone(),
            routing_key: config.broker.routing_key.clone(),
            prefetch: config.broker.prefetch,
            durable: config.broker.durable,
        })?),
    };

    let file_store: Arc<dyn FileStore> = Arc::new(LocalDirFileStore::new(&config.files.root_dir));

    // Messenger adapters. The MTProto client is an integration point:
    // deployments plug a real TelegramClientFactory in here.
    let mut factories: HashMap<MessengerType, Arc<dyn MessengerFactory>> = HashMap::new();
    factories.insert(
        MessengerType::Telegram,
        Arc::new(TelegramMessengerFactory::new(
            Arc::new(UnconfiguredTelegramClientFactory),
            file_store.clone(),
        )),
    );
    factories.insert(
        MessengerType::Whatsapp,
        Arc::new(WhatsappMessengerFactory::new(
            Arc::new(WhatsappHttpApi::new(
                config.whatsapp.base_url.clone(),
                config.whatsapp.api_key.clone(),
            )),
            file_store.clone(),
        )),
    );
    let messengers = Arc::new(MessengerRegistry::new(factories));

    let mut import_registry = ImportRegistry::new();
    import_registry.register(Arc::new(MessageRequestImportHandler::new()));
    let import_registry = Arc::new(import_registry);

    let tabular_reader = Arc::new(TabularReaderResolver::standard());

    let mut outbox_registry = OutboxRegistry::new();
    outbox_registry.register::<MessageRequestReadyToSendV1, _>(SendDispatchHandler::new(
        messengers.clone(),
    ));
    outbox_registry.register::<BulkImportStageV1, _>(BulkImportStageHandler::new(
        staging.clone(),
        file_store.clone(),
        tabular_reader,
        import_registry.clone(),
        config.import.process_batch_size,
    ));
    outbox_registry.register::<BulkImportProcessV1, _>(BulkImportProcessHandler::new(
        staging.clone(),
        import_registry,
    ));
    let outbox_registry = Arc::new(outbox_registry);

    let strategy = match config.outbox.dispatch_strategy {
        DispatchStrategy::Direct => courier_outbox::DispatchStrategy::Direct,
        DispatchStrategy::Broker => courier_outbox::DispatchStrategy::Broker,
    };

    let dispatcher = Arc::new(OutboxDispatcher::new(
        pool.clone(),
        outbox_registry.clone(),
        event_bus.clone(),
        strategy,
    )?);
    let consumer = Arc::new(BrokerConsumer::new(pool, outbox_registry));

    Ok(Runtime {
        dispatcher,
        consumer,
        event_bus,
    })
}

async fn health_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ready_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({"status": "READY"}))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
