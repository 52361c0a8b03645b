use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use thiserror::Error;

/// Set via VALETGATE_ENV=production. Internal error details are replaced
/// with a generic message in that mode.
static PRODUCTION: Lazy<bool> = Lazy::new(|| {
    std::env::var("VALETGATE_ENV")
        .map(|v| v == "production")
        .unwrap_or(false)
});

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("access key code is required")]
    MissingKey,

    #[error("invalid access key")]
    InvalidKey,

    #[error("access revoked by the administrator")]
    AccessRevoked { reason: Option<String> },

    #[error("access expired")]
    AccessExpired { expires_at: DateTime<Utc> },

    #[error("could not generate a unique access key code")]
    CodeGenerationFailed,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token not provided")]
    MissingToken,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status and stable machine code for this error. Plain
    /// validation errors carry no code.
    pub fn status_and_code(&self) -> (StatusCode, Option<&'static str>) {
        match self {
            AppError::MissingKey => (StatusCode::BAD_REQUEST, Some("MISSING_KEY")),
            AppError::InvalidKey => (StatusCode::UNAUTHORIZED, Some("INVALID_KEY")),
            AppError::AccessRevoked { .. } => {
                (StatusCode::UNAUTHORIZED, Some("ACCESS_REVOKED"))
            }
            AppError::AccessExpired { .. } => {
                (StatusCode::UNAUTHORIZED, Some("ACCESS_EXPIRED"))
            }
            AppError::CodeGenerationFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Some("CODE_GENERATION_FAILED"),
            ),
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, Some("INVALID_CREDENTIALS"))
            }
            AppError::MissingToken => (StatusCode::UNAUTHORIZED, Some("MISSING_TOKEN")),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, Some("INVALID_TOKEN")),
            AppError::NotAuthenticated => {
                (StatusCode::UNAUTHORIZED, Some("NOT_AUTHENTICATED"))
            }
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, Some("FORBIDDEN")),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, Some("NOT_FOUND")),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, None),
            AppError::Database(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Some("INTERNAL_ERROR"))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("database error: {}", e);
                if *PRODUCTION {
                    "internal server error".to_string()
                } else {
                    e.to_string()
                }
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                if *PRODUCTION {
                    "internal server error".to_string()
                } else {
                    e.to_string()
                }
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "success": false,
            "error": message,
        });
        if let Some(code) = code {
            body["code"] = Value::String(code.to_string());
        }
        match &self {
            AppError::AccessRevoked { reason } => {
                body["reason"] = json!(reason);
            }
            AppError::AccessExpired { expires_at } => {
                body["expiresAt"] = json!(expires_at);
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_licensing_errors_are_401_with_codes() {
        assert_eq!(
            AppError::InvalidKey.status_and_code(),
            (StatusCode::UNAUTHORIZED, Some("INVALID_KEY"))
        );
        assert_eq!(
            AppError::AccessRevoked { reason: None }.status_and_code(),
            (StatusCode::UNAUTHORIZED, Some("ACCESS_REVOKED"))
        );
        assert_eq!(
            AppError::AccessExpired { expires_at: Utc::now() }.status_and_code(),
            (StatusCode::UNAUTHORIZED, Some("ACCESS_EXPIRED"))
        );
    }

    #[test]
    fn test_input_errors_are_400() {
        assert_eq!(
            AppError::MissingKey.status_and_code(),
            (StatusCode::BAD_REQUEST, Some("MISSING_KEY"))
        );
        let (status, code) =
            AppError::Validation("expiresAt is required".into()).status_and_code();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, None);
    }

    #[test]
    fn test_authorization_errors() {
        assert_eq!(
            AppError::MissingToken.status_and_code().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden("no".into()).status_and_code(),
            (StatusCode::FORBIDDEN, Some("FORBIDDEN"))
        );
        assert_eq!(
            AppError::NotFound("tenant").status_and_code().0,
            StatusCode::NOT_FOUND
        );
    }
}
