//! REST API Error Types
//!
//! Every failed request answers with `{"error": message}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::protocol::error::BridgeError;

/// REST API error that can be returned from handlers
#[derive(Debug)]
pub struct RestError {
    pub status: StatusCode,
    pub message: String,
}

impl RestError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

// Conversions from domain errors
impl From<BridgeError> for RestError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NoEndpoints | BridgeError::TemplateNotFound { .. } => {
                RestError::not_found(err.to_string())
            }
            BridgeError::InvalidTemplate { .. } | BridgeError::LocalExecutorDisabled => {
                RestError::bad_request(err.to_string())
            }
            other => {
                tracing::warn!(error = %other, "request_failed");
                RestError::internal(other.to_string())
            }
        }
    }
}

impl From<tokio::task::JoinError> for RestError {
    fn from(err: tokio::task::JoinError) -> Self {
        RestError::internal(format!("Background task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_endpoints_is_404_with_message() {
        let err = RestError::from(BridgeError::NoEndpoints);
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "No endpoints found");
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                BridgeError::TemplateNotFound {
                    slug: "x".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (BridgeError::LocalExecutorDisabled, StatusCode::BAD_REQUEST),
            (
                BridgeError::InvalidTemplate {
                    message: "bad".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (BridgeError::MissingTicket, StatusCode::INTERNAL_SERVER_ERROR),
            (
                BridgeError::Upstream(tonic::Status::unavailable("down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(RestError::from(err).status, status);
        }
    }

    #[tokio::test]
    async fn test_body_is_error_object() {
        let response = RestError::internal("boom").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({"error": "boom"}));
    }
}
