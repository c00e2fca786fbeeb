//! Raw, loosely-typed errors as they surface from handlers and the data layer.
//!
//! A `RawError` carries the native error-type name (its tag), a message, an
//! optional description marker, an optional stack, and any shape-specific
//! fields as an insertion-ordered JSON object. Nothing here is validated:
//! classification must cope with whatever shape arrives.

use serde::Serialize;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;

/// Tag used when an incoming value carries no usable name.
pub const DEFAULT_ERROR_NAME: &str = "Error";

/// An unclassified error value, before it enters the taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawError {
    /// Native error-type name, e.g. `CastError` or `TypeError`.
    pub name: String,
    /// The error's own message.
    pub message: String,
    /// Machine-stable marker, e.g. `INTERNAL_SERVER_ERROR` for business errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stack text captured where the error was raised, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Shape-specific data (`path`, `value`, `keyValue`, `errors`, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawError {
    /// Creates a raw error with the given tag and message and no extra fields.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            description: None,
            stack: None,
            fields: Map::new(),
        }
    }

    /// A failed cast of `value` at `path` to the data layer type `kind`.
    pub fn cast(kind: &str, path: impl Into<String>, value: impl Into<Value>) -> Self {
        let path = path.into();
        let value = value.into();
        let message = format!(
            "Cast to {} failed for value {} at path \"{}\"",
            kind, value, path
        );
        Self::new("CastError", message)
            .with_field("kind", kind)
            .with_field("path", path)
            .with_field("value", value)
    }

    /// A unique-index violation on the given field/value pairs.
    pub fn duplicate_key<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let key_value: Map<String, Value> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let dup_key = key_value
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        Self::new(
            "MongoError",
            format!("E11000 duplicate key error dup key: {{ {} }}", dup_key),
        )
        .with_field("code", 11000)
        .with_field("keyValue", Value::Object(key_value))
    }

    /// A document validation failure with one message per offending field.
    pub fn validation<I, K, M>(errors: I) -> Self
    where
        I: IntoIterator<Item = (K, M)>,
        K: Into<String>,
        M: Into<String>,
    {
        let mut by_field = Map::new();
        let mut summary = Vec::new();
        for (field, message) in errors {
            let field = field.into();
            let message = message.into();
            summary.push(format!("{}: {}", field, message));
            let mut sub_error = Map::new();
            sub_error.insert("name".into(), Value::from("ValidatorError"));
            sub_error.insert("path".into(), Value::from(field.clone()));
            sub_error.insert("message".into(), Value::from(message));
            by_field.insert(field, Value::Object(sub_error));
        }
        Self::new(
            "ValidationError",
            format!("Validation failed: {}", summary.join(", ")),
        )
        .with_field("errors", Value::Object(by_field))
    }

    /// A business/API error marked with the `INTERNAL_SERVER_ERROR` description.
    pub fn api(message: impl Into<String>) -> Self {
        Self::new(DEFAULT_ERROR_NAME, message)
            .with_description(crate::error::record::INTERNAL_SERVER_ERROR)
    }

    /// Wraps any Rust error. The tag is the error's type name; the source chain
    /// becomes the stack text.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error,
    {
        let full_name = std::any::type_name::<E>();
        let path = full_name.split('<').next().unwrap_or(full_name);
        let name = path.rsplit("::").next().unwrap_or(path);

        let mut stack = format!("{}: {}", name, error);
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push_str(&format!("\n    caused by: {}", cause));
            source = cause.source();
        }

        Self::new(name, error.to_string()).with_stack(stack)
    }

    /// Wraps a panic payload as caught by `catch_unwind` or a `JoinError`.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        Self::new("Panic", message)
    }

    /// Sets the description marker.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the stack text.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Adds a shape-specific field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Looks up a shape-specific field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The stack to report for this error: its own, or a one-line header.
    pub fn stack_or_header(&self) -> String {
        self.stack
            .clone()
            .unwrap_or_else(|| format!("{}: {}", self.name, self.message))
    }
}

impl From<Value> for RawError {
    /// Total conversion from arbitrary JSON.
    ///
    /// Objects contribute `name`, `message`, `description` and `stack` when
    /// they are strings; every other key is kept in `fields`. Non-object
    /// values become a plain `Error` whose message is the value's text.
    fn from(value: Value) -> Self {
        let mut fields = match value {
            Value::Object(map) => map,
            other => return Self::new(DEFAULT_ERROR_NAME, display_value(&other)),
        };

        let mut take_string = |key: &str| {
            if !matches!(fields.get(key), Some(Value::String(_))) {
                return None;
            }
            match fields.shift_remove(key) {
                Some(Value::String(s)) => Some(s),
                _ => None,
            }
        };

        let name = take_string("name").unwrap_or_else(|| DEFAULT_ERROR_NAME.to_string());
        let message = take_string("message").unwrap_or_default();
        let description = take_string("description");
        let stack = take_string("stack");

        Self {
            name,
            message,
            description,
            stack,
            fields,
        }
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for RawError {}

/// Renders a JSON value the way it reads inside a message: strings bare,
/// arrays comma-joined, objects opaque.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => display_value(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}
