//! Client-facing response payloads.

use async_trait::async_trait;
use serde::Serialize;

use super::RuntimeEnvironment;
use crate::error::ErrorRecord;

/// JSend-style status label: `"fail"` for 4xx, `"error"` otherwise.
pub fn status_label(http_status: u16) -> &'static str {
    if (400..500).contains(&http_status) {
        "fail"
    } else {
        "error"
    }
}

/// Development payload: everything except the raw cause.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevelopmentPayload {
    pub status: &'static str,
    pub error: ErrorRecord,
    pub message: String,
    pub stack: String,
}

/// Production payload: status and message only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductionPayload {
    pub status: &'static str,
    pub message: String,
}

/// The body sent to the client for a handled error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Development(DevelopmentPayload),
    Production(ProductionPayload),
}

impl ResponsePayload {
    /// Shapes the payload for the given environment.
    pub fn render(record: &ErrorRecord, environment: RuntimeEnvironment) -> Self {
        let status = status_label(record.http_status());
        match environment {
            RuntimeEnvironment::Development => ResponsePayload::Development(DevelopmentPayload {
                status,
                error: record.clone(),
                message: record.message().to_string(),
                stack: record.original_stack().to_string(),
            }),
            RuntimeEnvironment::Production => ResponsePayload::Production(ProductionPayload {
                status,
                message: record.message().to_string(),
            }),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ResponsePayload::Development(payload) => &payload.message,
            ResponsePayload::Production(payload) => &payload.message,
        }
    }
}

/// Emits the protocol-level response. Called exactly once per handled error.
///
/// Implementations own transmission; the policy engine does not depend on
/// the send having succeeded.
#[async_trait]
pub trait ResponseSink: Send {
    async fn send_response(&mut self, http_status: u16, payload: ResponsePayload);
}
