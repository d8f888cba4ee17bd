use super::{ClientIpSource, auth_error_response, resolve_client_ip, valid_email};
use crate::auth::{Authenticator, store::normalize_identity};
use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tracing::debug;
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize)]
pub struct SignInRequest {
    email: String,
    password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignInResponse {
    pub api_token: String,
}

#[utoipa::path(
    post,
    path = "/signin",
    request_body = SignInRequest,
    responses (
        (status = 200, description = "Signed in, a fresh API token was issued", body = SignInResponse),
        (status = 400, description = "Missing payload or invalid email"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many attempts, see Retry-After"),
        (status = 503, description = "Credential store or attempt counter unavailable")
    ),
    tag = "auth"
)]
pub async fn sign_in(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    authenticator: Extension<Arc<Authenticator>>,
    ip_source: Extension<ClientIpSource>,
    payload: Option<Json<SignInRequest>>,
) -> impl IntoResponse {
    let request: SignInRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_identity(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    if request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing password".to_string()).into_response();
    }

    let client_ip = resolve_client_ip(
        ip_source.0,
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
    );
    let password = SecretString::from(request.password);

    match authenticator.sign_in(&email, &password, &client_ip).await {
        Ok(principal) => match principal.api_token {
            Some(api_token) => (StatusCode::OK, Json(SignInResponse { api_token })).into_response(),
            None => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable".to_string(),
            )
                .into_response(),
        },
        Err(err) => {
            debug!("Sign-in rejected: {err}");
            auth_error_response(&err)
        }
    }
}
