//! HTTP mapping of pairing errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use screenlink_core::PairingError;
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    Pairing(PairingError),
    BadRequest(String),
    Forbidden(String),
}

impl From<PairingError> for ApiError {
    fn from(e: PairingError) -> Self {
        ApiError::Pairing(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Pairing(e) => match e {
                PairingError::AccessDenied(_) | PairingError::CodeExpired => StatusCode::FORBIDDEN,
                PairingError::IncorrectCode => StatusCode::UNAUTHORIZED,
                PairingError::InvalidRequest(_) | PairingError::MissingPeerKey => {
                    StatusCode::BAD_REQUEST
                }
                PairingError::KeyExchangeFailed(_) | PairingError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "invalid_request",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Pairing(e) => e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::BadRequest(msg) | ApiError::Forbidden(msg) => msg.clone(),
            // Internal details stay in the log.
            ApiError::Pairing(e) if status.is_server_error() => {
                error!(error = %e, "Pairing request failed");
                "internal error".to_string()
            }
            ApiError::Pairing(e) => e.to_string(),
        };
        (status, Json(json!({ "error": self.code(), "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenlink_core::{DenyReason, KeyExchangeError};

    #[test]
    fn maps_status_codes() {
        let status = |e: PairingError| ApiError::from(e).status();
        assert_eq!(status(PairingError::AccessDenied(DenyReason::Blacklisted)), StatusCode::FORBIDDEN);
        assert_eq!(status(PairingError::CodeExpired), StatusCode::FORBIDDEN);
        assert_eq!(status(PairingError::IncorrectCode), StatusCode::UNAUTHORIZED);
        assert_eq!(status(PairingError::MissingPeerKey), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(PairingError::KeyExchangeFailed(KeyExchangeError::NoLocalKey)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
