//! Maps raw errors onto the [`ErrorRecord`] taxonomy.

use std::sync::Arc;

use super::messages::{generate_message, DatabaseShape};
use super::record::{ErrorRecord, INTERNAL_SERVER_ERROR};
use super::RawError;

/// Classifies a raw error. First match wins:
///
/// 1. A recognised data-layer tag becomes a database error (400,
///    `DATABASE_ERROR`) with a generated message, or the raw message when the
///    shape is malformed.
/// 2. A raw error marked `INTERNAL_SERVER_ERROR` becomes an API error (500)
///    keeping its message.
/// 3. Anything else passes through as an unclassified, non-operational record
///    keeping its message, description and stack.
///
/// Pure and total: no logging, no I/O, never panics on odd input.
pub fn classify(raw: impl Into<Arc<RawError>>) -> ErrorRecord {
    let raw = raw.into();

    if let Some(shape) = DatabaseShape::from_tag(&raw.name) {
        let message = generate_message(&raw).unwrap_or_else(|| raw.message.clone());
        return ErrorRecord::database_error(shape.kind(), message)
            .cause(raw)
            .build();
    }

    if raw.description.as_deref() == Some(INTERNAL_SERVER_ERROR) {
        return ErrorRecord::api_error(raw.message.clone())
            .cause(raw)
            .build();
    }

    let mut builder = ErrorRecord::unclassified(raw.message.clone()).stack(raw.stack_or_header());
    if let Some(description) = &raw.description {
        builder = builder.description(description.clone());
    }
    builder.cause(raw).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_cast_error() {
        let record = classify(RawError::from(json!({
            "name": "CastError",
            "path": "_id",
            "value": "invalid_id"
        })));
        assert_eq!(record.kind(), ErrorKind::CastOrType);
        assert_eq!(record.message(), "Invalid _id: invalid_id");
        assert_eq!(record.http_status(), 400);
        assert_eq!(record.description(), "DATABASE_ERROR");
        assert!(record.is_operational());
        assert_eq!(record.cause().map(|c| c.name.as_str()), Some("CastError"));
    }

    #[test]
    fn test_malformed_database_shape_falls_back_to_raw_message() {
        let record = classify(RawError::new("ValidationError", "Validation failed"));
        assert_eq!(record.kind(), ErrorKind::Validation);
        assert_eq!(record.message(), "Validation failed");
        assert!(record.is_operational());
    }

    #[test]
    fn test_api_error_marker() {
        let record = classify(RawError::api("bad request body"));
        assert_eq!(record.kind(), ErrorKind::BusinessRule);
        assert_eq!(record.http_status(), 500);
        assert_eq!(record.description(), "INTERNAL_SERVER_ERROR");
        assert_eq!(record.message(), "bad request body");
        assert!(record.is_operational());
    }

    #[test]
    fn test_database_tag_wins_over_api_marker() {
        let raw = RawError::cast("ObjectId", "_id", "nope").with_description(INTERNAL_SERVER_ERROR);
        let record = classify(raw);
        assert_eq!(record.kind(), ErrorKind::CastOrType);
    }

    #[test]
    fn test_unclassified_passes_through() {
        let raw = RawError::new("TypeError", "x is not a function")
            .with_stack("TypeError: x is not a function\n    at handler (app.rs:10)");
        let record = classify(raw);
        assert_eq!(record.kind(), ErrorKind::Unclassified);
        assert!(!record.is_operational());
        assert_eq!(record.message(), "x is not a function");
        assert_eq!(record.http_status(), 500);
        assert_eq!(
            record.original_stack(),
            "TypeError: x is not a function\n    at handler (app.rs:10)"
        );
    }

    #[test]
    fn test_unclassified_keeps_foreign_description() {
        let raw = RawError::new("Error", "quota").with_description("QUOTA_EXCEEDED");
        let record = classify(raw);
        assert_eq!(record.kind(), ErrorKind::Unclassified);
        assert_eq!(record.description(), "QUOTA_EXCEEDED");
    }

    #[test]
    fn test_classify_is_idempotent() {
        let raw = Arc::new(RawError::duplicate_key([("email", "a@b.com")]));
        let first = classify(Arc::clone(&raw));
        let second = classify(Arc::clone(&raw));
        assert_eq!(first.kind(), second.kind());
        assert_eq!(first.message(), second.message());
        assert_eq!(first.http_status(), second.http_status());
        assert_eq!(first.description(), second.description());
        assert_eq!(first.is_operational(), second.is_operational());
        assert_eq!(first.cause(), second.cause());
    }

    #[test]
    fn test_garbage_input_is_unclassified() {
        for value in [json!(null), json!(17), json!([1, 2]), json!({"name": {}})] {
            let record = classify(RawError::from(value));
            assert_eq!(record.kind(), ErrorKind::Unclassified);
            assert!(!record.is_operational());
        }
    }
}
