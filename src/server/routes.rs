//! Demo routes. Each failing route produces one kind of raw error.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::middleware::PipelineError;
use super::AppState;
use crate::error::RawError;

/// Name reported by the health endpoint.
pub const SERVICE_NAME: &str = "errorgate";

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub shutting_down: bool,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let shutting_down = state.shutdown.is_shutting_down();
    let status = if shutting_down {
        "shutting down"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        shutting_down,
    })
}

#[derive(Debug, Deserialize)]
pub struct DatabaseErrorQuery {
    pub kind: Option<String>,
}

/// GET /databaseerror?kind=cast|validation|duplicate
///
/// Makes an insert the store rejects. Defaults to `cast`.
pub async fn database_error(
    State(state): State<AppState>,
    Query(query): Query<DatabaseErrorQuery>,
) -> Result<Json<Value>, PipelineError> {
    let kind = query.kind.as_deref().unwrap_or("cast");
    let stored = match kind {
        "cast" => state.store.insert(json!({ "_id": "invalid_id" })).await?,
        "validation" => state.store.insert(json!({ "someProp": "invalid_type" })).await?,
        "duplicate" => {
            let document = json!({ "someProp": 1 });
            // The first insert may succeed on a fresh store; the second cannot.
            state.store.insert(document.clone()).await?;
            state.store.insert(document).await?
        }
        other => {
            return Err(RawError::api(format!(
                "Unknown database error kind '{}', expected cast, validation or duplicate",
                other
            ))
            .into())
        }
    };
    Ok(Json(stored))
}

/// POST /documents
pub async fn create_document(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), PipelineError> {
    let document: Value = serde_json::from_slice(&body)
        .map_err(|e| RawError::api(format!("Invalid request body: {}", e)))?;

    let stored = state.store.insert(document).await?;
    tracing::info!(id = %stored["_id"], "Stored document");
    Ok((StatusCode::CREATED, Json(stored)))
}

/// GET /apierror
pub async fn api_error() -> Result<StatusCode, PipelineError> {
    Err(RawError::api("Some message").into())
}

/// GET /programmererror
///
/// Fails with an error no rule recognises; the service shuts down.
pub async fn programmer_error() -> Result<StatusCode, PipelineError> {
    Err(RawError::new("TypeError", "x is not a function")
        .with_stack("TypeError: x is not a function\n    at programmer_error (src/server/routes.rs)")
        .into())
}
