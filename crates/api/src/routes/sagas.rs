//! Saga launch, inspection and acknowledgment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use saga::{
    CommandSaga, LocalBus, Payload, SagaConfig, SagaId, SagaMessage, SagaOrchestrator,
    SagaRuntimeHandle, SagaState, TokioTimeoutScheduler,
};
use saga_store::SagaStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Orchestrator wired to the in-process bus and tokio timers.
pub type HostOrchestrator<S> = SagaOrchestrator<S, LocalBus, TokioTimeoutScheduler>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: SagaStore + 'static> {
    pub orchestrator: Arc<HostOrchestrator<S>>,
    pub bus: LocalBus,
    pub runtime: SagaRuntimeHandle,
    pub config: SagaConfig,
}

// -- Request types --

#[derive(Deserialize)]
pub struct LaunchSagaRequest {
    pub saga_id: Option<String>,
    pub originating: Option<Payload>,
    pub commands: Vec<Payload>,
    #[serde(default)]
    pub abort_commands: Vec<Payload>,
}

// -- Response types --

#[derive(Serialize)]
pub struct SagaAcceptedResponse {
    pub saga_id: String,
}

#[derive(Serialize)]
pub struct SagaResponse {
    pub saga_id: String,
    pub phase: String,
    pub current_index: usize,
    pub faulted: bool,
    pub current_command: Option<String>,
    pub commands: Vec<String>,
    pub abort_commands: Vec<String>,
    pub originating: Option<String>,
}

impl From<&SagaState> for SagaResponse {
    fn from(state: &SagaState) -> Self {
        let types = |payloads: &[Payload]| {
            payloads
                .iter()
                .map(|p| p.message_type.clone())
                .collect::<Vec<_>>()
        };
        Self {
            saga_id: state.saga_id.to_string(),
            phase: state.phase().to_string(),
            current_index: state.current_index,
            faulted: state.faulted,
            current_command: state.current_command().map(|p| p.message_type.clone()),
            commands: types(&state.commands),
            abort_commands: types(&state.abort_commands),
            originating: state.originating.as_ref().map(|p| p.message_type.clone()),
        }
    }
}

// -- Handlers --

/// POST /sagas: launch a command saga.
#[tracing::instrument(skip(state, req))]
pub async fn launch<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<LaunchSagaRequest>,
) -> Result<(StatusCode, Json<SagaAcceptedResponse>), ApiError> {
    let saga_id = match req.saga_id {
        Some(id) if id.trim().is_empty() => {
            return Err(ApiError::BadRequest("saga_id must not be blank".into()));
        }
        Some(id) => SagaId::from(id),
        None => SagaId::new(),
    };

    let mut saga = CommandSaga::new(state.bus.clone(), &state.config, saga_id, req.originating)?;
    for command in req.commands {
        saga = saga.add_command(command);
    }
    for command in req.abort_commands {
        saga = saga.add_abort_command(command);
    }
    let saga_id = saga.start().await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SagaAcceptedResponse {
            saga_id: saga_id.to_string(),
        }),
    ))
}

/// GET /sagas: list live sagas, oldest first.
pub async fn list<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<SagaResponse>>, ApiError> {
    let sagas = state.orchestrator.active_sagas().await?;
    Ok(Json(sagas.iter().map(SagaResponse::from).collect()))
}

/// GET /sagas/{id}: a live saga's progress. Completed sagas are gone.
pub async fn get<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaResponse>, ApiError> {
    let saga_id = SagaId::from(id);
    let saga = state
        .orchestrator
        .get_saga(&saga_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Saga {saga_id} not found")))?;
    Ok(Json(SagaResponse::from(&saga)))
}

/// POST /sagas/{id}/continue: the destination accepted the current command.
#[tracing::instrument(skip(state))]
pub async fn continue_saga<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.runtime.deliver(SagaMessage::continue_saga(id)).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /sagas/{id}/abort: the destination rejected the current command.
#[tracing::instrument(skip(state))]
pub async fn abort_saga<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.runtime.deliver(SagaMessage::abort_saga(id)).await?;
    Ok(StatusCode::ACCEPTED)
}
