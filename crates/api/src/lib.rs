//! HTTP host for command sagas.
//!
//! Wires the saga orchestrator to an in-process bus and tokio timers, runs it
//! behind a bounded inbox, and exposes REST endpoints for launching sagas and
//! acknowledging their commands, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    Envelope, LocalBus, SagaConfig, SagaError, SagaFault, SagaOrchestrator, SagaRuntime,
    TokioTimeoutScheduler,
};
use saga_store::SagaStore;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::sagas::AppState;

/// Everything a host process needs to run: handler state plus the runtime
/// and the channels it feeds.
pub struct SagaHost<S: SagaStore + 'static> {
    pub state: Arc<AppState<S>>,
    pub runtime: SagaRuntime<S, LocalBus, TokioTimeoutScheduler>,
    /// Business commands sent by sagas, for the host's command handlers.
    pub outbound: mpsc::Receiver<Envelope>,
    /// Sagas that could not finish compensating.
    pub faults: mpsc::UnboundedReceiver<SagaFault>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: SagaStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/sagas", post(routes::sagas::launch::<S>))
        .route("/sagas", get(routes::sagas::list::<S>))
        .route("/sagas/{id}", get(routes::sagas::get::<S>))
        .route(
            "/sagas/{id}/continue",
            post(routes::sagas::continue_saga::<S>),
        )
        .route("/sagas/{id}/abort", post(routes::sagas::abort_saga::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires a saga host around `store`.
///
/// The runtime is returned unstarted; spawn [`SagaRuntime::run_until`] and
/// drain `outbound` and `faults` before serving requests.
pub fn create_default_state<S: SagaStore + 'static>(
    store: S,
    config: SagaConfig,
) -> Result<SagaHost<S>, SagaError> {
    let (runtime_handle, inbox) = saga::inbox(config.inbox_capacity);
    let (bus, outbound) = LocalBus::with_outbound(runtime_handle.clone(), config.inbox_capacity);
    let scheduler = TokioTimeoutScheduler::new(runtime_handle.clone());

    let orchestrator = Arc::new(SagaOrchestrator::new(
        store,
        bus.clone(),
        scheduler,
        &config,
    )?);
    let (runtime, faults) = SagaRuntime::new(orchestrator.clone(), inbox, &config);

    let state = Arc::new(AppState {
        orchestrator,
        bus,
        runtime: runtime_handle,
        config,
    });

    Ok(SagaHost {
        state,
        runtime,
        outbound,
        faults,
    })
}
