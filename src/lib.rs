//! errorgate - error classification and response shaping for HTTP services
//!
//! Raw errors from handlers and the data layer are classified into a small
//! taxonomy ([`error`]), then a single policy engine ([`policy`]) decides the
//! client response, the log writes ([`sink`]) and whether the process must
//! shut down ([`lifecycle`]). [`server`] wires all of it into an axum service.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod policy;
pub mod server;
pub mod sink;
