//! OpenAPI document for the HTTP surface.
//!
//! The `sesamo-openapi` binary prints this document; routes stay wired in
//! `api::router` and are annotated with `#[utoipa::path]` at the handlers.

use utoipa::OpenApi;

use super::handlers::{health, otp};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        otp::request::request_otp,
        otp::verify::verify_otp,
        otp::resend::resend_otp,
    ),
    components(schemas(
        health::Health,
        otp::OtpRequest,
        otp::OtpVerifyRequest,
        otp::OtpResendRequest,
        otp::IssuedResponse,
        otp::VerifiedResponse,
        otp::ErrorResponse,
        crate::otp::models::RegistrationProfile,
    )),
    tags(
        (name = "otp", description = "Passcode issuance and verification"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
