use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use crate::api::handlers::{extract_client_ip, normalize_email, valid_email};
use crate::otp::rate_limit::{RateLimitAction, RateLimitDecision, RateLimiter};
use crate::otp::OtpEngine;

use super::{issue_error_response, ErrorResponse, IssuedResponse, OtpRequest};

/// Issue a passcode for a contact and email it.
#[utoipa::path(
    post,
    path = "/v1/otp/request",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "Code issued", body = IssuedResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 502, description = "Email delivery failed", body = ErrorResponse),
        (status = 500, description = "Infrastructure error", body = ErrorResponse)
    ),
    tag = "otp"
)]
pub async fn request_otp(
    headers: HeaderMap,
    engine: Extension<Arc<OtpEngine>>,
    limiter: Extension<Arc<dyn RateLimiter>>,
    payload: Option<Json<OtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("invalid_request")),
        )
            .into_response();
    };

    // Input errors are rejected before any store work.
    let contact = normalize_email(&request.contact);
    if !valid_email(&contact) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("invalid_email")),
        )
            .into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if limiter.check_ip(client_ip.as_deref(), RateLimitAction::Request)
        == RateLimitDecision::Limited
    {
        let retry_after = engine.config().issuance_window_seconds();
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse::rate_limited(retry_after)),
        )
            .into_response();
    }

    match engine
        .issue(&contact, request.profile.unwrap_or_default())
        .await
    {
        Ok(issued) => (
            StatusCode::OK,
            Json(IssuedResponse {
                expires_in: issued.expires_in,
            }),
        )
            .into_response(),
        Err(err) => issue_error_response(&err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::harness;
    use super::*;
    use anyhow::Result;
    use axum::body::to_bytes;
    use axum::http::HeaderMap;

    async fn body_json(response: axum::response::Response) -> Result<serde_json::Value> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[tokio::test]
    async fn request_issues_and_reports_expiry() -> Result<()> {
        let h = harness();
        let response = request_otp(
            HeaderMap::new(),
            Extension(h.engine),
            Extension(h.limiter),
            Some(Json(OtpRequest {
                contact: "a@x.com".to_string(),
                profile: None,
            })),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await?;
        assert_eq!(body.get("expiresIn").and_then(|v| v.as_i64()), Some(300));
        assert_eq!(h.sender.last_code().await.len(), 6);
        Ok(())
    }

    #[tokio::test]
    async fn request_normalizes_the_contact() -> Result<()> {
        let h = harness();
        let response = request_otp(
            HeaderMap::new(),
            Extension(h.engine.clone()),
            Extension(h.limiter),
            Some(Json(OtpRequest {
                contact: " Ada@X.COM ".to_string(),
                profile: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let record = h.engine.store().latest_record("ada@x.com").await?;
        assert!(record.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn request_rejects_invalid_email() -> Result<()> {
        let h = harness();
        let response = request_otp(
            HeaderMap::new(),
            Extension(h.engine),
            Extension(h.limiter),
            Some(Json(OtpRequest {
                contact: "not-an-email".to_string(),
                profile: None,
            })),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await?;
        assert_eq!(
            body.get("error").and_then(|v| v.as_str()),
            Some("invalid_email")
        );
        Ok(())
    }

    #[tokio::test]
    async fn request_missing_payload() {
        let h = harness();
        let response = request_otp(
            HeaderMap::new(),
            Extension(h.engine),
            Extension(h.limiter),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn request_window_exhaustion_is_rate_limited() -> Result<()> {
        let h = harness();
        for _ in 0..3 {
            let response = request_otp(
                HeaderMap::new(),
                Extension(h.engine.clone()),
                Extension(h.limiter.clone()),
                Some(Json(OtpRequest {
                    contact: "a@x.com".to_string(),
                    profile: None,
                })),
            )
            .await
            .into_response();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = request_otp(
            HeaderMap::new(),
            Extension(h.engine),
            Extension(h.limiter),
            Some(Json(OtpRequest {
                contact: "a@x.com".to_string(),
                profile: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await?;
        assert_eq!(
            body.get("error").and_then(|v| v.as_str()),
            Some("rate_limited")
        );
        assert!(body.get("retryAfter").and_then(|v| v.as_i64()).is_some());
        Ok(())
    }
}
