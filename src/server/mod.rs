//! Demonstration HTTP service.
//!
//! Every route runs behind the [`middleware::classify_errors`] chokepoint, so
//! handler failures reach the client only in the shape the policy engine
//! chooses for the configured environment.

pub mod middleware;
pub mod routes;
pub mod store;

use axum::{
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::error::RawError;
use crate::lifecycle::ShutdownCoordinator;
use crate::policy::ErrorHandler;

pub use middleware::{classify_errors, AxumResponder, PipelineError};
pub use routes::HealthResponse;
pub use store::DemoStore;

/// Shared application state for the demo service
#[derive(Debug, Clone)]
pub struct AppState {
    pub handler: Arc<ErrorHandler>,
    pub store: DemoStore,
    pub shutdown: ShutdownCoordinator,
}

impl AppState {
    pub fn new(handler: ErrorHandler, store: DemoStore, shutdown: ShutdownCoordinator) -> Self {
        Self {
            handler: Arc::new(handler),
            store,
            shutdown,
        }
    }

    /// Classifies `raw` and returns the response the policy engine produced.
    /// Log writes it dispatched keep running after this returns.
    pub async fn respond(&self, raw: impl Into<Arc<RawError>>) -> Response {
        let mut responder = AxumResponder::new();
        let outcome = self.handler.handle_raw(raw, &mut responder).await;
        if outcome.shutdown_requested() {
            tracing::warn!("request failed with an unclassified error, service is shutting down");
        }
        responder.into_response()
    }
}

/// Create the demo router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/databaseerror", get(routes::database_error))
        .route("/documents", post(routes::create_document))
        .route("/apierror", get(routes::api_error))
        .route("/programmererror", get(routes::programmer_error))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn_with_state(state.clone(), classify_errors)),
        )
        .with_state(state)
}
