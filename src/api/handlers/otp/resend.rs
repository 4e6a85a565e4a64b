use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use crate::api::handlers::{extract_client_ip, normalize_email, valid_email};
use crate::otp::rate_limit::{RateLimitAction, RateLimitDecision, RateLimiter};
use crate::otp::OtpEngine;

use super::{resend_error_response, ErrorResponse, IssuedResponse, OtpResendRequest};

/// Re-issue a passcode for a pending registration.
///
/// Also the recovery path after expiry; the stored profile context is
/// reused so nothing has to be resubmitted.
#[utoipa::path(
    post,
    path = "/v1/otp/resend",
    request_body = OtpResendRequest,
    responses(
        (status = 200, description = "Fresh code issued", body = IssuedResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse),
        (status = 404, description = "No pending registration", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 502, description = "Email delivery failed", body = ErrorResponse),
        (status = 500, description = "Infrastructure error", body = ErrorResponse)
    ),
    tag = "otp"
)]
pub async fn resend_otp(
    headers: HeaderMap,
    engine: Extension<Arc<OtpEngine>>,
    limiter: Extension<Arc<dyn RateLimiter>>,
    payload: Option<Json<OtpResendRequest>>,
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

    let client_ip = extract_client_ip(&headers);
    if limiter.check_ip(client_ip.as_deref(), RateLimitAction::Resend)
        == RateLimitDecision::Limited
    {
        let retry_after = engine.config().issuance_window_seconds();
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse::rate_limited(retry_after)),
        )
            .into_response();
    }

    match engine.resend(&contact).await {
        Ok(issued) => (
            StatusCode::OK,
            Json(IssuedResponse {
                expires_in: issued.expires_in,
            }),
        )
            .into_response(),
        Err(err) => resend_error_response(&err).into_response(),
    }
}
