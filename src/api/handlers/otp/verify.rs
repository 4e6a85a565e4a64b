use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::debug;

use crate::api::handlers::{extract_client_ip, normalize_email, valid_email};
use crate::otp::code::valid_code_format;
use crate::otp::rate_limit::{RateLimitAction, RateLimitDecision, RateLimiter};
use crate::otp::OtpEngine;

use super::{verify_error_response, ErrorResponse, OtpVerifyRequest, VerifiedResponse};

/// Verify a submitted passcode against the newest record for the contact.
///
/// On success the pending registration is promoted to a user account.
#[utoipa::path(
    post,
    path = "/v1/otp/verify",
    request_body = OtpVerifyRequest,
    responses(
        (status = 200, description = "Code verified, registration complete", body = VerifiedResponse),
        (status = 400, description = "Invalid email or code format", body = ErrorResponse),
        (status = 404, description = "No code issued for this contact", body = ErrorResponse),
        (status = 409, description = "Code already used", body = ErrorResponse),
        (status = 410, description = "Code expired", body = ErrorResponse),
        (status = 422, description = "Wrong code", body = ErrorResponse),
        (status = 429, description = "Attempt cap reached or rate limited", body = ErrorResponse),
        (status = 500, description = "Infrastructure error", body = ErrorResponse)
    ),
    tag = "otp"
)]
pub async fn verify_otp(
    headers: HeaderMap,
    engine: Extension<Arc<OtpEngine>>,
    limiter: Extension<Arc<dyn RateLimiter>>,
    payload: Option<Json<OtpVerifyRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("invalid_request")),
        )
            .into_response();
    };

    let contact = normalize_email(&request.contact);
    if !valid_email(&contact) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("invalid_email")),
        )
            .into_response();
    }
    // Six digits exactly; anything else never reaches the store.
    if !valid_code_format(&request.code) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("invalid_code_format")),
        )
            .into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if limiter.check_ip(client_ip.as_deref(), RateLimitAction::Verify)
        == RateLimitDecision::Limited
    {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse::new("rate_limited")),
        )
            .into_response();
    }

    match engine.verify(&contact, &request.code).await {
        Ok(verified) => {
            debug!(contact = %verified.contact, account = ?verified.account, "otp verified");
            (StatusCode::OK, Json(VerifiedResponse { verified: true })).into_response()
        }
        Err(err) => verify_error_response(&err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::request::request_otp;
    use super::super::test_support::{harness, harness_with};
    use super::super::OtpRequest;
    use super::*;
    use crate::otp::OtpConfig;
    use anyhow::Result;
    use axum::body::to_bytes;

    async fn body_json(response: axum::response::Response) -> Result<serde_json::Value> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn issue(h: &super::super::test_support::TestHarness, contact: &str) {
        let response = request_otp(
            HeaderMap::new(),
            Extension(h.engine.clone()),
            Extension(h.limiter.clone()),
            Some(Json(OtpRequest {
                contact: contact.to_string(),
                profile: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn submit(
        h: &super::super::test_support::TestHarness,
        contact: &str,
        code: &str,
    ) -> axum::response::Response {
        verify_otp(
            HeaderMap::new(),
            Extension(h.engine.clone()),
            Extension(h.limiter.clone()),
            Some(Json(OtpVerifyRequest {
                contact: contact.to_string(),
                code: code.to_string(),
            })),
        )
        .await
        .into_response()
    }

    fn wrong_code(code: &str) -> String {
        let value: u32 = code.parse().expect("numeric code");
        format!("{:06}", (value + 1) % 1_000_000)
    }

    #[tokio::test]
    async fn verify_succeeds_once_then_conflicts() -> Result<()> {
        let h = harness();
        issue(&h, "a@x.com").await;
        let code = h.sender.last_code().await;

        let response = submit(&h, "a@x.com", &code).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await?;
        assert_eq!(body.get("verified").and_then(|v| v.as_bool()), Some(true));

        // Same correct code again: the record is consumed.
        let response = submit(&h, "a@x.com", &code).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await?;
        assert_eq!(
            body.get("error").and_then(|v| v.as_str()),
            Some("otp_already_used")
        );
        Ok(())
    }

    #[tokio::test]
    async fn verify_wrong_code_reports_attempts_remaining() -> Result<()> {
        let h = harness();
        issue(&h, "a@x.com").await;
        let code = h.sender.last_code().await;

        let response = submit(&h, "a@x.com", &wrong_code(&code)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await?;
        assert_eq!(
            body.get("error").and_then(|v| v.as_str()),
            Some("invalid_otp")
        );
        assert_eq!(
            body.get("attemptsRemaining").and_then(|v| v.as_i64()),
            Some(4)
        );
        Ok(())
    }

    #[tokio::test]
    async fn verify_expired_code() -> Result<()> {
        let h = harness_with(OtpConfig::new().with_ttl_seconds(-1));
        issue(&h, "a@x.com").await;
        let code = h.sender.last_code().await;

        let response = submit(&h, "a@x.com", &code).await;
        assert_eq!(response.status(), StatusCode::GONE);
        let body = body_json(response).await?;
        assert_eq!(
            body.get("error").and_then(|v| v.as_str()),
            Some("otp_expired")
        );
        Ok(())
    }

    #[tokio::test]
    async fn verify_unknown_contact_is_not_found() -> Result<()> {
        let h = harness();
        let response = submit(&h, "nobody@x.com", "123456").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await?;
        assert_eq!(
            body.get("error").and_then(|v| v.as_str()),
            Some("otp_not_found")
        );
        Ok(())
    }

    #[tokio::test]
    async fn verify_rejects_malformed_code_before_store_work() -> Result<()> {
        let h = harness();
        // No record exists, yet the format error wins: input checks come first.
        for code in ["12345", "1234567", "12345a", ""] {
            let response = submit(&h, "a@x.com", code).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await?;
            assert_eq!(
                body.get("error").and_then(|v| v.as_str()),
                Some("invalid_code_format")
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn verify_attempt_cap_locks_even_for_correct_code() -> Result<()> {
        let h = harness();
        issue(&h, "a@x.com").await;
        let code = h.sender.last_code().await;
        let wrong = wrong_code(&code);

        for _ in 0..4 {
            let response = submit(&h, "a@x.com", &wrong).await;
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }
        // Fifth wrong submission hits the cap.
        let response = submit(&h, "a@x.com", &wrong).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await?;
        assert_eq!(
            body.get("error").and_then(|v| v.as_str()),
            Some("too_many_attempts")
        );
        // Sixth submission with the correct code stays locked.
        let response = submit(&h, "a@x.com", &code).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        Ok(())
    }
}
