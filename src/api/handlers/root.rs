use axum::response::IntoResponse;

use crate::APP_USER_AGENT;

// Undocumented banner route; kept out of the OpenAPI spec on purpose.
pub async fn root() -> impl IntoResponse {
    APP_USER_AGENT
}
