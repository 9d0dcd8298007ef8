//! ==============================================================================
//! handlers.rs - http api
//! ==============================================================================
//!
//! routes:
//!     POST /api/set   body: reading json       -> 200, empty body
//!     GET  /api/get   ?room=..                 -> 200, newest reading (object)
//!                     ?room=..&startTime=..    -> 200, readings newest first (array)
//!                      [&endTime=..]
//!
//! every failure is a `ServiceError` rendered into a response for that
//! request alone. handlers never panic on client input.
//!
//! ==============================================================================

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::domain::{QueryPlan, Reading, ReadingQuery};
use crate::error::{Result, ServiceError};
use crate::store::ReadingStore;

/// shared handler state: only the store, no per-request data
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReadingStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/set", post(set_reading))
        .route("/api/get", get(get_readings))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// ingest endpoint
/// POST /api/set
async fn set_reading(State(state): State<AppState>, body: Bytes) -> Result<StatusCode> {
    let reading: Reading = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid reading json: {}", e)))?;
    let timestamp = reading.validate()?;

    tracing::info!("[HTTP] set room={} time={}", reading.room, reading.time);
    state.store.insert(reading, timestamp).await?;
    Ok(StatusCode::OK)
}

/// query endpoint
/// GET /api/get?room=kitchen[&startTime=..][&endTime=..]
async fn get_readings(
    State(state): State<AppState>,
    query: std::result::Result<Query<ReadingQuery>, QueryRejection>,
) -> Result<Response> {
    let Query(query) = query.map_err(|e| ServiceError::BadRequest(e.body_text()))?;

    match query.plan()? {
        QueryPlan::Latest { room } => {
            tracing::info!("[HTTP] get latest room={}", room);
            let reading = state
                .store
                .latest(&room)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("no readings for room '{}'", room)))?;
            Ok(Json(reading).into_response())
        }
        QueryPlan::Range { room, start, end } => {
            tracing::info!("[HTTP] get range room={} start={} end={:?}", room, start, end);
            let readings = state.store.range(&room, start, end).await?;
            Ok(Json(readings).into_response())
        }
    }
}
