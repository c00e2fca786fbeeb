//! In-memory document store standing in for the service's database.
//!
//! Enforces the schema of the demo collection: `_id` must be a 24-digit hex
//! object id, `someProp` must be a number and is unique. Rule violations come
//! back as [`RawError`]s shaped like the data layer's native errors, so they
//! exercise every classification rule.

use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

use crate::error::raw::display_value;
use crate::error::RawError;

/// The unique, numeric field of the demo collection.
pub const UNIQUE_FIELD: &str = "someProp";

const ID_FIELD: &str = "_id";

fn object_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("object id pattern is valid"))
}

#[derive(Debug, Default)]
struct StoreInner {
    documents: RwLock<Vec<Map<String, Value>>>,
    disconnected: AtomicBool,
    next_id: AtomicU64,
}

/// Shared handle to the demo collection.
#[derive(Debug, Clone, Default)]
pub struct DemoStore {
    inner: Arc<StoreInner>,
}

impl DemoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.disconnected.load(Ordering::SeqCst)
    }

    /// Closes the store. Every later insert fails.
    pub async fn disconnect(&self) {
        if !self.inner.disconnected.swap(true, Ordering::SeqCst) {
            let count = self.inner.documents.read().await.len();
            tracing::info!(documents = count, "Disconnected from store");
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Validates and stores `document`, returning it with its `_id`.
    pub async fn insert(&self, document: Value) -> Result<Value, RawError> {
        if !self.is_connected() {
            return Err(RawError::new(
                "MongoNotConnectedError",
                "Client must be connected before running operations",
            ));
        }

        let mut document = match document {
            Value::Object(map) => map,
            other => {
                return Err(RawError::validation([(
                    "document",
                    format!(
                        "Parameter \"obj\" to Document() must be an object, got {}",
                        display_value(&other)
                    ),
                )]))
            }
        };

        let id = match document.get(ID_FIELD) {
            Some(Value::String(id)) if object_id_pattern().is_match(id) => id.to_lowercase(),
            Some(other) => return Err(RawError::cast("ObjectId", ID_FIELD, other.clone())),
            None => self.generate_id(),
        };

        if let Some(value) = document.get(UNIQUE_FIELD) {
            let number = cast_to_number(value).ok_or_else(|| {
                RawError::validation([(
                    UNIQUE_FIELD,
                    format!(
                        "Cast to Number failed for value {} at path \"{}\"",
                        value, UNIQUE_FIELD
                    ),
                )])
            })?;
            document.insert(UNIQUE_FIELD.to_string(), Value::Number(number));
        }

        let mut documents = self.inner.documents.write().await;
        for existing in documents.iter() {
            if existing.get(ID_FIELD).and_then(Value::as_str) == Some(id.as_str()) {
                return Err(RawError::duplicate_key([(ID_FIELD, id)]));
            }
            if let (Some(stored), Some(incoming)) =
                (existing.get(UNIQUE_FIELD), document.get(UNIQUE_FIELD))
            {
                if stored == incoming {
                    return Err(RawError::duplicate_key([(UNIQUE_FIELD, incoming.clone())]));
                }
            }
        }

        document.shift_remove(ID_FIELD);
        let mut stored = Map::with_capacity(document.len() + 1);
        stored.insert(ID_FIELD.to_string(), Value::String(id));
        stored.extend(document);

        documents.push(stored.clone());
        Ok(Value::Object(stored))
    }

    /// 4-byte seconds timestamp followed by an 8-byte counter, hex encoded.
    fn generate_id(&self) -> String {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();
        let counter = self.inner.next_id.fetch_add(1, Ordering::SeqCst);

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..].copy_from_slice(&counter.to_be_bytes());
        hex::encode(bytes)
    }
}

/// Numbers pass through; numeric strings are converted.
fn cast_to_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Some(Number::from(i))
            } else {
                s.parse::<f64>().ok().and_then(Number::from_f64)
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, ErrorKind};
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_assigns_object_id() {
        let store = DemoStore::new();
        let stored = store.insert(json!({"someProp": 1})).await.unwrap();

        let id = stored["_id"].as_str().unwrap();
        assert!(object_id_pattern().is_match(id));
        assert_eq!(stored["someProp"], json!(1));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_generated_ids_are_distinct() {
        let store = DemoStore::new();
        let a = store.insert(json!({})).await.unwrap();
        let b = store.insert(json!({})).await.unwrap();
        assert_ne!(a["_id"], b["_id"]);
    }

    #[tokio::test]
    async fn test_invalid_id_is_cast_error() {
        let store = DemoStore::new();
        let err = store.insert(json!({"_id": "invalid_id"})).await.unwrap_err();

        assert_eq!(err.name, "CastError");
        assert_eq!(err.field("path"), Some(&json!("_id")));
        assert_eq!(err.field("value"), Some(&json!("invalid_id")));
        assert_eq!(classify(err).message(), "Invalid _id: invalid_id");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_non_numeric_prop_is_validation_error() {
        let store = DemoStore::new();
        let err = store
            .insert(json!({"someProp": "invalid_type"}))
            .await
            .unwrap_err();

        assert_eq!(err.name, "ValidationError");
        let record = classify(err);
        assert_eq!(record.kind(), ErrorKind::Validation);
        assert_eq!(
            record.message(),
            "Invalid data input: Cast to Number failed for value \"invalid_type\" at path \"someProp\""
        );
    }

    #[tokio::test]
    async fn test_numeric_string_is_cast() {
        let store = DemoStore::new();
        let stored = store.insert(json!({"someProp": "42"})).await.unwrap();
        assert_eq!(stored["someProp"], json!(42));

        let err = store.insert(json!({"someProp": 42})).await.unwrap_err();
        assert_eq!(err.name, "MongoError");
    }

    #[tokio::test]
    async fn test_duplicate_prop_is_duplicate_key() {
        let store = DemoStore::new();
        store.insert(json!({"someProp": 1})).await.unwrap();
        let err = store.insert(json!({"someProp": 1})).await.unwrap_err();

        assert_eq!(err.field("keyValue"), Some(&json!({"someProp": 1})));
        assert_eq!(
            classify(err).message(),
            "Property: someProp has a duplicate field: 1. Please use another value."
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_id() {
        let store = DemoStore::new();
        let id = "507f1f77bcf86cd799439011";
        store.insert(json!({"_id": id})).await.unwrap();
        let err = store.insert(json!({"_id": id})).await.unwrap_err();
        assert_eq!(err.field("keyValue"), Some(&json!({"_id": id})));
    }

    #[tokio::test]
    async fn test_non_object_document() {
        let store = DemoStore::new();
        let err = store.insert(json!([1, 2])).await.unwrap_err();
        assert_eq!(err.name, "ValidationError");
    }

    #[tokio::test]
    async fn test_insert_after_disconnect_is_unclassified() {
        let store = DemoStore::new();
        store.disconnect().await;
        assert!(!store.is_connected());

        let err = store.insert(json!({"someProp": 1})).await.unwrap_err();
        assert_eq!(err.name, "MongoNotConnectedError");
        assert!(!classify(err).is_operational());
    }
}
