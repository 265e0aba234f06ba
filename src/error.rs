use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::users::repo::StoreError;

/// Every failure a handler can surface. Converted into the uniform
/// `{status, code, message}` envelope.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input data. {0}")]
    Validation(String),

    #[error("This email is already in use. Please use another one.")]
    DuplicateEmail,

    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("You are not logged in. Please log in to get access.")]
    Unauthenticated,

    #[error("Your session is invalid or has expired. Please log in again.")]
    InvalidToken,

    #[error("Your session is invalid or has expired. Please log in again.")]
    StalePassword,

    #[error("Your session is invalid or has expired. Please log in again.")]
    SessionUserGone,

    #[error("Your current password is wrong.")]
    WrongCurrentPassword,

    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("There is no user with that email address.")]
    UserNotFound,

    #[error("Token is invalid or has expired.")]
    InvalidOrExpiredToken,

    #[error("There was an error sending the email. Try again later.")]
    EmailDeliveryFailed,

    #[error("Something went wrong.")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    code: &'static str,
    message: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::DuplicateEmail
            | AppError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials
            | AppError::Unauthenticated
            | AppError::InvalidToken
            | AppError::StalePassword
            | AppError::SessionUserGone
            | AppError::WrongCurrentPassword => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::UserNotFound => StatusCode::NOT_FOUND,
            AppError::EmailDeliveryFailed | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable code. Session failures share one code so clients
    /// cannot tell a forged token from a stale one.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::DuplicateEmail => "duplicate_email",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::Unauthenticated => "unauthenticated",
            AppError::InvalidToken | AppError::StalePassword | AppError::SessionUserGone => {
                "invalid_session"
            }
            AppError::WrongCurrentPassword => "wrong_current_password",
            AppError::Forbidden => "forbidden",
            AppError::UserNotFound => "user_not_found",
            AppError::InvalidOrExpiredToken => "invalid_or_expired_token",
            AppError::EmailDeliveryFailed => "email_delivery_failed",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AppError::DuplicateEmail,
            StoreError::Other(e) => AppError::Internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(e) = &self {
            error!(error = ?e, "internal error");
        }
        let status = self.status_code();
        let body = Json(ErrorBody {
            status: if status.is_server_error() { "error" } else { "fail" },
            code: self.error_code(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn session_failures_are_indistinguishable() {
        let invalid = body_of(AppError::InvalidToken).await;
        let stale = body_of(AppError::StalePassword).await;
        let gone = body_of(AppError::SessionUserGone).await;
        assert_eq!(invalid.0, StatusCode::UNAUTHORIZED);
        assert_eq!(invalid, stale);
        assert_eq!(invalid, gone);
    }

    #[tokio::test]
    async fn client_errors_use_fail_status() {
        let (status, body) = body_of(AppError::Validation("Name is required".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "fail");
        assert_eq!(body["code"], "validation_error");
        assert_eq!(body["message"], "Invalid input data. Name is required");
    }

    #[tokio::test]
    async fn internal_errors_hide_their_cause() {
        let (status, body) =
            body_of(AppError::Internal(anyhow::anyhow!("connection refused to 10.0.0.3"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert!(!body["message"].as_str().unwrap().contains("10.0.0.3"));
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(AppError::DuplicateEmail.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::UserNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::InvalidOrExpiredToken.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::EmailDeliveryFailed.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
