//! Passcode request, verification, and resend endpoints.

pub mod request;
pub mod resend;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_support;

use axum::{http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::otp::models::RegistrationProfile;
use crate::otp::{IssueError, ResendError, VerifyError};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OtpRequest {
    pub contact: String,
    pub profile: Option<RegistrationProfile>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OtpVerifyRequest {
    pub contact: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OtpResendRequest {
    pub contact: String,
}

/// Issuance success: seconds until the code expires, server-computed so
/// the client countdown never assumes the TTL.
///
/// Wire field names stay camelCase; the browser flow consuming this API
/// predates the service.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IssuedResponse {
    pub expires_in: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifiedResponse {
    pub verified: bool,
}

/// Discriminated failure body. Every engine failure keeps its own `error`
/// code; the UI copy depends on telling them apart.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
            attempts_remaining: None,
            retry_after: None,
        }
    }

    #[must_use]
    pub fn rate_limited(retry_after: i64) -> Self {
        Self {
            error: "rate_limited".to_string(),
            attempts_remaining: None,
            retry_after: Some(retry_after),
        }
    }
}

pub(crate) fn error_body(status: StatusCode, error: ErrorResponse) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(error))
}

pub(crate) fn issue_error_response(err: &IssueError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        IssueError::RateLimited {
            retry_after_seconds,
        } => error_body(
            StatusCode::TOO_MANY_REQUESTS,
            ErrorResponse::rate_limited(*retry_after_seconds),
        ),
        IssueError::EmailDelivery(source) => {
            error!("Failed to deliver otp email: {source}");
            error_body(
                StatusCode::BAD_GATEWAY,
                ErrorResponse::new("email_delivery_failed"),
            )
        }
        IssueError::Store(source) => {
            error!("Failed to issue otp: {source}");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("infrastructure_error"),
            )
        }
    }
}

pub(crate) fn verify_error_response(err: &VerifyError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        VerifyError::NotFound => {
            error_body(StatusCode::NOT_FOUND, ErrorResponse::new("otp_not_found"))
        }
        VerifyError::AlreadyUsed => error_body(
            StatusCode::CONFLICT,
            ErrorResponse::new("otp_already_used"),
        ),
        VerifyError::Expired => error_body(StatusCode::GONE, ErrorResponse::new("otp_expired")),
        VerifyError::TooManyAttempts => error_body(
            StatusCode::TOO_MANY_REQUESTS,
            ErrorResponse::new("too_many_attempts"),
        ),
        VerifyError::InvalidCode { attempts_remaining } => error_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorResponse {
                error: "invalid_otp".to_string(),
                attempts_remaining: Some(*attempts_remaining),
                retry_after: None,
            },
        ),
        VerifyError::Store(source) => {
            error!("Failed to verify otp: {source}");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("infrastructure_error"),
            )
        }
    }
}

pub(crate) fn resend_error_response(err: &ResendError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        ResendError::NoPendingRegistration => error_body(
            StatusCode::NOT_FOUND,
            ErrorResponse::new("no_pending_registration"),
        ),
        ResendError::RateLimited {
            retry_after_seconds,
        } => error_body(
            StatusCode::TOO_MANY_REQUESTS,
            ErrorResponse::rate_limited(*retry_after_seconds),
        ),
        ResendError::EmailDelivery(source) => {
            error!("Failed to deliver otp email: {source}");
            error_body(
                StatusCode::BAD_GATEWAY,
                ErrorResponse::new("email_delivery_failed"),
            )
        }
        ResendError::Store(source) => {
            error!("Failed to resend otp: {source}");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("infrastructure_error"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn error_response_skips_empty_fields() {
        let body = serde_json::to_value(ErrorResponse::new("otp_expired")).expect("serializes");
        assert_eq!(body.get("error").and_then(|v| v.as_str()), Some("otp_expired"));
        assert!(body.get("attemptsRemaining").is_none());
        assert!(body.get("retryAfter").is_none());
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let body =
            serde_json::to_value(ErrorResponse::rate_limited(42)).expect("serializes");
        assert_eq!(body.get("retryAfter").and_then(|v| v.as_i64()), Some(42));
    }

    #[test]
    fn verify_errors_map_to_distinct_codes() {
        let cases = [
            (VerifyError::NotFound, StatusCode::NOT_FOUND, "otp_not_found"),
            (
                VerifyError::AlreadyUsed,
                StatusCode::CONFLICT,
                "otp_already_used",
            ),
            (VerifyError::Expired, StatusCode::GONE, "otp_expired"),
            (
                VerifyError::TooManyAttempts,
                StatusCode::TOO_MANY_REQUESTS,
                "too_many_attempts",
            ),
            (
                VerifyError::InvalidCode {
                    attempts_remaining: 2,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_otp",
            ),
            (
                VerifyError::Store(anyhow!("db down")),
                StatusCode::INTERNAL_SERVER_ERROR,
                "infrastructure_error",
            ),
        ];
        for (err, expected_status, expected_code) in cases {
            let (status, Json(body)) = verify_error_response(&err);
            assert_eq!(status, expected_status);
            assert_eq!(body.error, expected_code);
        }
    }

    #[test]
    fn invalid_otp_reports_attempts_remaining() {
        let (_, Json(body)) = verify_error_response(&VerifyError::InvalidCode {
            attempts_remaining: 3,
        });
        assert_eq!(body.attempts_remaining, Some(3));
    }
}
