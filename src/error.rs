//! ==============================================================================
//! error.rs - per-request error taxonomy
//! ==============================================================================
//!
//! purpose:
//!     every failure a request can hit is one of these variants. each variant
//!     maps onto an http status, so a failing request ends in an error
//!     response for that request only. nothing here terminates the process.
//!
//! relationships:
//!     - produced by: config.rs, domain.rs, mongo.rs, store.rs
//!     - rendered by: handlers.rs (through `IntoResponse`)
//!
//! ==============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// A required setting is missing from the environment/config file
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The store could not be reached or did not answer the ping
    #[error("cannot reach database: {0}")]
    Connectivity(String),

    /// Malformed body or query parameters
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Single-result query matched nothing
    #[error("not found: {0}")]
    NotFound(String),

    /// Insert/query itself failed, including deadline expiry
    #[error("persistence error: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("[HTTP] {} -> {}", self, status);
        } else {
            tracing::warn!("[HTTP] {} -> {}", self, status);
        }

        let body = serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_map_to_expected_status() {
        let cases = [
            (ServiceError::Configuration("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ServiceError::Connectivity("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ServiceError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::Persistence("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected, "{err}");
        }
    }

    #[tokio::test]
    async fn response_carries_json_message() {
        let response = ServiceError::NotFound("no readings for room 'attic'".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "not found: no readings for room 'attic'");
    }
}
