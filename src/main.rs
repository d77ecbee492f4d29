use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use eventline::config::Config;
use eventline::http::build_router;
use eventline::logging::init_tracing;
use eventline::queue::{BrokerConsumer, BrokerQueue, Producer};
use eventline::store::Store;
use eventline::waiter::Waiter;
use eventline::worker::WorkerPool;
use eventline::{AppError, Result};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fatal: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_level, config.log_format);

    info!(version = %eventline::VERSION, "starting eventline");

    let store = Arc::new(Store::new(&config.clickhouse));
    store.migrate().await.map_err(|e| AppError::InitFatal(e.to_string()))?;

    let producer = Producer::new(&config.event_producer)
        .map_err(|e| AppError::InitFatal(e.to_string()))?;
    let consumer = BrokerConsumer::new(&config.event_consumer)
        .map_err(|e| AppError::InitFatal(e.to_string()))?;
    let queue: Arc<BrokerQueue> = Arc::new(BrokerQueue::new(producer, consumer));

    let error_producer = Producer::with_topic(&config.event_producer, config.event_producer.error_topic.clone())
        .map_err(|e| AppError::InitFatal(e.to_string()))?;
    let error_sink: Arc<Producer> = Arc::new(error_producer);

    let pool = Arc::new(WorkerPool::new(
        queue,
        error_sink,
        store,
        config.event_worker.clone(),
    ));
    pool.start();

    let router = build_router(pool.clone())
        .into_make_service_with_connect_info::<SocketAddr>();

    let mut waiter = Waiter::new();
    let cancel = waiter.token();

    let http_addr: SocketAddr = config
        .http_addr
        .parse()
        .map_err(|e| AppError::InitFatal(format!("HTTP_ADDR: {e}")))?;

    {
        let cancel = cancel.clone();
        waiter.add(async move {
            let listener = tokio::net::TcpListener::bind(http_addr)
                .await
                .map_err(AppError::Io)?;
            info!(addr = %http_addr, "http surface listening");

            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { cancel.cancelled().await });

            match tokio::time::timeout(Duration::from_secs(60), serve).await {
                Ok(result) => result.map_err(AppError::Io)?,
                Err(_) => error!("graceful shutdown deadline exceeded, hard-closing http surface"),
            }
            Ok(())
        });
    }

    {
        let pool = pool.clone();
        let cancel = cancel.clone();
        waiter.add(async move {
            cancel.cancelled().await;
            pool.graceful_stop().await;
            if let Some(reason) = pool.fatal_error() {
                error!(reason, "worker pool reported a fatal consumer error");
            }
            Ok(())
        });
    }

    waiter.wait().await
}
