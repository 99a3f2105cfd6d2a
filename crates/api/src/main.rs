//! Saga host entry point.

use api::config::Config;
use saga_store::{InMemorySagaStore, PostgresSagaStore, SagaStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the saga store
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to Postgres");
            let store = PostgresSagaStore::new(pool);
            store.run_migrations().await.expect("migrations failed");
            tracing::info!("using Postgres saga store");
            serve(config, store, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set; sagas will not survive a restart");
            serve(config, InMemorySagaStore::new(), metrics_handle).await;
        }
    }
}

async fn serve<S: SagaStore + 'static>(
    config: Config,
    store: S,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
) {
    let api::SagaHost {
        state,
        runtime,
        mut outbound,
        mut faults,
    } = api::create_default_state(store, config.saga.clone())
        .expect("invalid saga configuration");

    // 4. Start the saga runtime and re-arm timeouts lost with the last process
    let (stop_runtime, runtime_stopped) = oneshot::channel::<()>();
    let runtime_task = tokio::spawn(runtime.run_until(async {
        let _ = runtime_stopped.await;
    }));
    state
        .orchestrator
        .recover()
        .await
        .expect("failed to recover active sagas");

    // 5. Drain outbound commands and faults
    tokio::spawn(async move {
        while let Some(envelope) = outbound.recv().await {
            tracing::info!(
                destination = %envelope.destination,
                command = %envelope.payload.message_type,
                saga_id = ?envelope.saga_id(),
                "saga command dispatched"
            );
        }
    });
    tokio::spawn(async move {
        while let Some(fault) = faults.recv().await {
            tracing::error!(
                saga_id = %fault.saga_id,
                originating = ?fault.originating.as_ref().map(|p| &p.message_type),
                reason = %fault.reason,
                "saga fault requires manual intervention"
            );
            metrics::counter!("saga_faults_total").increment(1);
        }
    });

    // 6. Start server
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting saga host");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = stop_runtime.send(());
    if let Err(e) = runtime_task.await {
        tracing::error!(error = %e, "saga runtime task failed");
    }
    tracing::info!("server shut down gracefully");
}
