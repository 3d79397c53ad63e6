//! Request handlers for the API endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::debug;

use super::AppState;
use super::types::{ErrorResponse, StateEntry};
use crate::command::parse_key;
use crate::publish::PointValue;
use crate::scenario::ScenarioInfo;
use crate::store::StoreError;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn store_error(e: &StoreError) -> ApiError {
    error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// `GET /states` → 200 + map of every point
pub async fn list_states(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, PointValue>>, ApiError> {
    state.store.snapshot().map(Json).map_err(|e| store_error(&e))
}

/// `GET /states/{key}` → 200 + `StateEntry`, 404 if never written
pub async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<StateEntry>, ApiError> {
    match state.store.get(&key) {
        Ok(Some(value)) => Ok(Json(StateEntry { key, value })),
        Ok(None) => Err(error(StatusCode::NOT_FOUND, format!("no state \"{key}\""))),
        Err(e) => Err(store_error(&e)),
    }
}

/// `PUT /states/{key}` → 202 once the command is queued, 400 for keys
/// that do not accept commands
pub async fn put_state(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(value): Json<PointValue>,
) -> Result<(StatusCode, Json<StateEntry>), ApiError> {
    if parse_key(&key).is_none() {
        return Err(error(
            StatusCode::BAD_REQUEST,
            format!("\"{key}\" is not a writable state"),
        ));
    }
    debug!(%key, %value, "command received over HTTP");
    state
        .store
        .inject(&key, value.clone())
        .map_err(|e| store_error(&e))?;
    Ok((StatusCode::ACCEPTED, Json(StateEntry { key, value })))
}

/// `GET /scenarios` → 200 + catalog
pub async fn list_scenarios(State(state): State<Arc<AppState>>) -> Json<Vec<ScenarioInfo>> {
    Json(state.catalog.clone())
}
