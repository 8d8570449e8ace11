//! REST API Handlers
//!
//! HTTP endpoint handlers organized by operation.

pub mod action;
pub mod admin;
pub mod catalog;
pub mod execute;
pub mod schema;
pub mod templates;

use axum::http::HeaderMap;

/// Header carrying the caller's session id
pub const SESSION_HEADER: &str = "x-session-id";

/// Session id from the `x-session-id` header, if present and non-empty.
pub fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}
