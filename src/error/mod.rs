//! Error taxonomy and classification.
//!
//! Raw errors from handlers and the data layer are turned into typed
//! [`ErrorRecord`]s by [`classify`]. Each record carries the response metadata
//! (status, description) and whether the failure is operational.

pub mod classifier;
pub mod messages;
pub mod raw;
pub mod record;

pub use classifier::classify;
pub use messages::{generate_message, DatabaseShape};
pub use raw::RawError;
pub use record::{
    common_http, DatabaseKind, ErrorKind, ErrorRecord, ErrorRecordBuilder, DATABASE_ERROR,
    INTERNAL_SERVER_ERROR, UNCLASSIFIED_ERROR,
};
