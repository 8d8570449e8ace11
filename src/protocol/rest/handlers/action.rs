//! Action Handlers
//!
//! Named actions and session refresh.

use std::sync::Arc;

use axum::{body::Bytes, http::HeaderMap, Extension, Json};
use serde_json::Value;

use crate::protocol::descriptor::DEFAULT_SESSION_ID;
use crate::protocol::rest::dto::{ActionRequest, RefreshRequest, SuccessDto};
use crate::protocol::rest::error::RestError;
use crate::protocol::Handler;

use super::session_from_headers;

/// Invoke an action; the reply is returned as JSON or wrapped as `raw` text
pub async fn run_action(
    Extension(handler): Extension<Arc<Handler>>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<Value>, RestError> {
    let reply = handler
        .run_action(&request.action_type, request.payload.as_ref())
        .await?;
    Ok(Json(reply.into_json()))
}

/// Refresh one table (`tableName`) or the whole session.
///
/// Only an empty body means "every table". Any other body must parse as a
/// refresh request, whatever its content type.
pub async fn refresh(
    Extension(handler): Extension<Arc<Handler>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SuccessDto>, RestError> {
    let session_id =
        session_from_headers(&headers).unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());
    let request = parse_refresh_body(&body)?;
    handler
        .refresh(&session_id, request.table_name.as_deref())
        .await?;
    Ok(Json(SuccessDto::ok()))
}

fn parse_refresh_body(body: &[u8]) -> Result<RefreshRequest, RestError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RefreshRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| RestError::bad_request(format!("Invalid refresh request: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_refreshes_everything() {
        assert!(parse_refresh_body(b"").unwrap().table_name.is_none());
        assert!(parse_refresh_body(b" \n").unwrap().table_name.is_none());
        assert!(parse_refresh_body(b"{}").unwrap().table_name.is_none());
    }

    #[test]
    fn test_table_name_is_read() {
        let request = parse_refresh_body(br#"{"tableName":"orders"}"#).unwrap();
        assert_eq!(request.table_name.as_deref(), Some("orders"));
    }

    #[test]
    fn test_bad_bodies_are_rejected() {
        for body in [&br#"{"tableName":5}"#[..], br#"{"tableName":"ord"#, b"orders"] {
            let err = parse_refresh_body(body).unwrap_err();
            assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
        }
    }
}
