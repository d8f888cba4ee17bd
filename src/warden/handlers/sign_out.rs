use super::{auth_error_response, extract_bearer_token};
use crate::auth::Authenticator;
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

#[utoipa::path(
    post,
    path = "/signout",
    responses (
        (status = 204, description = "API token revoked"),
        (status = 401, description = "Missing or unknown bearer token"),
        (status = 503, description = "Credential store unavailable")
    ),
    tag = "auth"
)]
pub async fn sign_out(
    headers: HeaderMap,
    authenticator: Extension<Arc<Authenticator>>,
) -> impl IntoResponse {
    let Some(token) = extract_bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, "Missing bearer token".to_string()).into_response();
    };

    let principal = match authenticator.authenticate_token(&token).await {
        Ok(principal) => principal,
        Err(err) => return auth_error_response(&err),
    };

    match authenticator.sign_out(&principal).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => auth_error_response(&err),
    }
}
