// crates/relay-lib/src/error.rs

//! Central error types + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Why a connection attempt was refused at the boundary.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication error: No token provided")]
    MissingToken,

    #[error("Authentication error: Invalid token")]
    InvalidToken,
}

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Membership lookup failed: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Unroutable frame: {0}")]
    Dispatch(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Auth(_) => StatusCode::UNAUTHORIZED,
            RelayError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Dispatch(_) => StatusCode::BAD_REQUEST,
            RelayError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            RelayError::Json(_) | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            RelayError::Auth(AuthError::MissingToken) => "AUTH_001",
            RelayError::Auth(AuthError::InvalidToken) => "AUTH_002",
            RelayError::Storage(_) => "STORE_001",
            RelayError::Dispatch(_) => "DISPATCH_001",
            RelayError::RateLimitExceeded => "RATE_001",
            RelayError::Json(_) => "JSON_001",
            RelayError::Internal(_) => "INT_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            RelayError::Auth(err) => err.to_string(),
            RelayError::Storage(_) => "Membership lookup unavailable".to_string(),
            RelayError::Dispatch(_) => "Invalid frame".to_string(),
            RelayError::RateLimitExceeded => {
                "Rate limit exceeded, please try again later".to_string()
            },
            RelayError::Json(_) => "Invalid request format".to_string(),
            RelayError::Internal(_) => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AuthError::MissingToken.to_string(),
            "Authentication error: No token provided"
        );
        assert_eq!(
            RelayError::Dispatch("missing projectId".to_string()).to_string(),
            "Unroutable frame: missing projectId"
        );
        assert_eq!(
            RelayError::RateLimitExceeded.to_string(),
            "Rate limit exceeded"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RelayError::from(AuthError::MissingToken).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            RelayError::from(AuthError::InvalidToken).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            RelayError::Dispatch("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::RateLimitExceeded.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            RelayError::Storage(sqlx::Error::PoolTimedOut).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_codes_are_distinct_per_auth_failure() {
        // Clients distinguish "no token" from "bad token" by code
        assert_eq!(
            RelayError::from(AuthError::MissingToken).error_code(),
            "AUTH_001"
        );
        assert_eq!(
            RelayError::from(AuthError::InvalidToken).error_code(),
            "AUTH_002"
        );
    }

    #[test]
    fn test_into_response() {
        let response = RelayError::from(AuthError::InvalidToken).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response_headers = response.headers();
        assert!(response_headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("application/json"));
    }
}
