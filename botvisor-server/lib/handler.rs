//! Request handlers for the botvisor server.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use botvisor_core::management::StopAllOutcome;

use crate::{
    error::{ServerResult, ValidationError},
    payload::{
        CreateUnitRequest, RegularMessageResponse, UnitCreatedResponse, UnitListResponse,
        UnitStartedResponse, UnitsStoppedResponse,
    },
    state::AppState,
};

//--------------------------------------------------------------------------------------------------
// Functions: REST API Handlers
//--------------------------------------------------------------------------------------------------

/// Handler for health check
pub async fn health() -> ServerResult<impl IntoResponse> {
    Ok((
        StatusCode::OK,
        Json(RegularMessageResponse {
            message: "service is healthy".to_string(),
        }),
    ))
}

/// Lists every unit.
pub async fn list_units(State(state): State<AppState>) -> ServerResult<impl IntoResponse> {
    let units = state.get_supervisor().list().await;
    Ok((StatusCode::OK, Json(UnitListResponse { units })))
}

/// Creates a unit from the template.
pub async fn create_unit(
    State(state): State<AppState>,
    payload: Result<Json<CreateUnitRequest>, JsonRejection>,
) -> ServerResult<impl IntoResponse> {
    let Json(request) =
        payload.map_err(|e| ValidationError::InvalidInput(e.body_text()))?;

    let unit = state
        .get_supervisor()
        .create(&request.name, &request.credential)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UnitCreatedResponse {
            message: format!("unit '{}' created", unit.name),
            unit,
        }),
    ))
}

/// Starts a unit.
pub async fn start_unit(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let pid = state.get_supervisor().start(&name).await?;

    Ok((
        StatusCode::OK,
        Json(UnitStartedResponse {
            message: format!("unit '{}' started", name),
            pid,
        }),
    ))
}

/// Stops a unit.
pub async fn stop_unit(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ServerResult<impl IntoResponse> {
    state.get_supervisor().stop(&name).await?;

    Ok((
        StatusCode::OK,
        Json(RegularMessageResponse {
            message: format!("unit '{}' stopped", name),
        }),
    ))
}

/// Stops every running unit.
pub async fn stop_all_units(State(state): State<AppState>) -> ServerResult<impl IntoResponse> {
    let response = match state.get_supervisor().stop_all().await? {
        StopAllOutcome::NothingRunning => UnitsStoppedResponse {
            message: "no units are running".to_string(),
            stopped: Vec::new(),
        },
        StopAllOutcome::Stopped(stopped) => UnitsStoppedResponse {
            message: format!("stopped {} units", stopped.len()),
            stopped,
        },
    };

    Ok((StatusCode::OK, Json(response)))
}

/// Marks running units whose process is gone as stopped.
pub async fn reconcile_units(State(state): State<AppState>) -> ServerResult<impl IntoResponse> {
    let stopped = state.get_supervisor().reconcile().await?;

    Ok((
        StatusCode::OK,
        Json(UnitsStoppedResponse {
            message: format!("reconciled {} units", stopped.len()),
            stopped,
        }),
    ))
}
