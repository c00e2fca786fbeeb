//! Human-readable messages for data-layer errors.
//!
//! Each generator reads the shape-specific fields of a [`RawError`] and returns
//! `None` when the shape is not what it expects; callers then fall back to the
//! raw error's own message.

use serde_json::Value;

use super::raw::display_value;
use super::record::DatabaseKind;
use super::RawError;

/// The data-layer error shapes recognised by their native tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatabaseShape {
    /// `MongoError` / `MongoServerError` carrying `keyValue`.
    DuplicateKey,
    /// `CastError` carrying `path` and `value`.
    Cast,
    /// `ValidationError` carrying `errors`.
    Validation,
}

impl DatabaseShape {
    /// Maps a native error tag to its shape.
    pub fn from_tag(name: &str) -> Option<Self> {
        match name {
            "MongoError" | "MongoServerError" => Some(DatabaseShape::DuplicateKey),
            "CastError" => Some(DatabaseShape::Cast),
            "ValidationError" => Some(DatabaseShape::Validation),
            _ => None,
        }
    }

    pub fn kind(self) -> DatabaseKind {
        match self {
            DatabaseShape::DuplicateKey => DatabaseKind::Duplicate,
            DatabaseShape::Cast => DatabaseKind::CastOrType,
            DatabaseShape::Validation => DatabaseKind::Validation,
        }
    }
}

/// Picks the generator for the raw error's tag.
///
/// Returns `None` for unrecognised tags and for recognised tags whose fields
/// are missing or malformed.
pub fn generate_message(err: &RawError) -> Option<String> {
    match DatabaseShape::from_tag(&err.name)? {
        DatabaseShape::DuplicateKey => duplicate_error_message(err),
        DatabaseShape::Cast => cast_error_message(err),
        DatabaseShape::Validation => validation_error_message(err),
    }
}

/// `Invalid {path}: {value}`
pub fn cast_error_message(err: &RawError) -> Option<String> {
    let path = err.field("path")?;
    let value = err.field("value")?;
    Some(format!(
        "Invalid {}: {}",
        display_value(path),
        display_value(value)
    ))
}

/// `Property: {keys} has a duplicate field: {values}. Please use another value.`
///
/// Keys and values are comma-joined in the order the `keyValue` map holds them.
pub fn duplicate_error_message(err: &RawError) -> Option<String> {
    let key_value = err.field("keyValue")?.as_object()?;
    if key_value.is_empty() {
        return None;
    }

    let keys = key_value
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",");
    let values = key_value
        .values()
        .map(display_value)
        .collect::<Vec<_>>()
        .join(",");

    Some(format!(
        "Property: {} has a duplicate field: {}. Please use another value.",
        keys, values
    ))
}

/// `Invalid data input: ` followed by each field error's message, one per line.
pub fn validation_error_message(err: &RawError) -> Option<String> {
    let errors = err.field("errors")?.as_object()?;
    if errors.is_empty() {
        return None;
    }

    let messages = errors
        .values()
        .map(|sub_error| match sub_error.get("message") {
            Some(Value::String(message)) => message.clone(),
            Some(other) => display_value(other),
            None => display_value(sub_error),
        })
        .collect::<Vec<_>>();

    Some(format!("Invalid data input: {}", messages.join("\n")))
}
