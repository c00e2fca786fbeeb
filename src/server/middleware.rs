//! The error chokepoint for the HTTP service.
//!
//! Handlers fail with a [`PipelineError`]. Its response is only a carrier: the
//! [`classify_errors`] middleware finds it in the response extensions,
//! classifies the raw error and lets the policy engine write the real response
//! through an [`AxumResponder`]. Panics inside handlers take the same path.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::AppState;
use crate::error::RawError;
use crate::lifecycle::catch_handled;
use crate::policy::{ResponsePayload, ResponseSink};

/// A handler failure on its way to the policy engine.
#[derive(Debug, Clone)]
pub struct PipelineError(Arc<RawError>);

impl PipelineError {
    pub fn new(raw: RawError) -> Self {
        Self(Arc::new(raw))
    }

    pub fn raw(&self) -> &RawError {
        &self.0
    }

    pub fn into_raw(self) -> Arc<RawError> {
        self.0
    }
}

impl From<RawError> for PipelineError {
    fn from(raw: RawError) -> Self {
        Self::new(raw)
    }
}

impl IntoResponse for PipelineError {
    /// A bare 500 carrying the error in its extensions. Without the middleware
    /// in place this is what the client sees.
    fn into_response(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// [`ResponseSink`] that builds an axum response.
#[derive(Default)]
pub struct AxumResponder {
    response: Option<Response>,
}

impl AxumResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }
}

#[async_trait]
impl ResponseSink for AxumResponder {
    async fn send_response(&mut self, http_status: u16, payload: ResponsePayload) {
        let status = StatusCode::from_u16(http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.response = Some((status, Json(payload)).into_response());
    }
}

impl IntoResponse for AxumResponder {
    fn into_response(self) -> Response {
        self.response
            .unwrap_or_else(|| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

/// Runs the rest of the stack and routes any [`PipelineError`] or panic
/// through classification and the policy engine.
pub async fn classify_errors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = match catch_handled(next.run(request)).await {
        Ok(response) => response,
        Err(panic) => {
            let raw = RawError::from_panic(&*panic);
            tracing::error!(%method, %uri, "handler panicked: {}", raw.message);
            return state.respond(raw).await;
        }
    };

    let carried = response.extensions().get::<PipelineError>().cloned();
    match carried {
        Some(error) => {
            let raw = error.into_raw();
            tracing::debug!(%method, %uri, error = %raw, "handling pipeline error");
            state.respond(raw).await
        }
        None => response,
    }
}
