pub mod health;
pub mod sign_in;
pub mod sign_out;

use crate::auth::AuthError;
use axum::{
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, RETRY_AFTER},
    },
    response::{IntoResponse, Response},
};
use regex::Regex;
use std::{net::SocketAddr, sync::OnceLock};

fn email_regex() -> Option<&'static Regex> {
    static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_REGEX
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    email_regex().is_some_and(|regex| regex.is_match(email_normalized))
}

/// Where the client IP of a sign-in attempt is taken from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientIpSource {
    /// The TCP peer address. Forwarding headers are ignored.
    #[default]
    Peer,
    /// `x-forwarded-for` / `x-real-ip`, falling back to the peer. Only safe
    /// behind a reverse proxy that overwrites these headers.
    ForwardedHeaders,
}

/// Client IP for throttling, `"unknown"` when nothing identifies the peer.
pub(crate) fn resolve_client_ip(
    source: ClientIpSource,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> String {
    let forwarded = match source {
        ClientIpSource::ForwardedHeaders => extract_client_ip(headers),
        ClientIpSource::Peer => None,
    };
    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Client IP as reported by the reverse proxy, first hop wins.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Map an auth failure to its HTTP response.
pub(crate) fn auth_error_response(err: &AuthError) -> Response {
    match err {
        AuthError::AuthenticationFailed => {
            (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()).into_response()
        }
        AuthError::LockedOut { .. } => {
            let seconds = err.retry_after_seconds().unwrap_or(1);
            let mut headers = HeaderMap::new();
            headers.insert(RETRY_AFTER, HeaderValue::from(seconds));
            (StatusCode::TOO_MANY_REQUESTS, headers, err.to_string()).into_response()
        }
        AuthError::Unavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service unavailable".to_string(),
        )
            .into_response(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::ClientIpSource;
    use crate::auth::{
        Authenticator, MemoryAttemptCounter, MemoryCredentialStore, RandomTokenGenerator,
        SignInConfig, Throttle,
    };
    use anyhow::Result;
    use axum::{
        Router,
        body::{Body, to_bytes},
        extract::ConnectInfo,
        http::{Request, Response},
    };
    use serde_json::json;
    use std::{net::SocketAddr, sync::Arc, time::Duration};

    pub const EMAIL: &str = "user@mail.com";
    pub const PASSWORD: &str = "secret123";

    pub async fn app(max_attempts: u32) -> Result<(Router, Arc<MemoryCredentialStore>)> {
        app_with(max_attempts, ClientIpSource::Peer).await
    }

    pub async fn app_with(
        max_attempts: u32,
        ip_source: ClientIpSource,
    ) -> Result<(Router, Arc<MemoryCredentialStore>)> {
        let store = Arc::new(MemoryCredentialStore::new());
        store.insert(EMAIL, PASSWORD).await?;
        let config = SignInConfig::new(Throttle::new(max_attempts, Duration::from_secs(40))?)
            .with_store_timeout(Duration::from_secs(30))?;
        let authenticator = Arc::new(Authenticator::new(
            store.clone(),
            Arc::new(MemoryAttemptCounter::new()),
            Arc::new(RandomTokenGenerator),
            config,
        ));
        Ok((crate::warden::router(authenticator, ip_source), store))
    }

    /// Sign-in request arriving from the TCP peer `ip`.
    pub fn sign_in_request(email: &str, password: &str, ip: &str) -> Result<Request<Body>> {
        let payload = json!({ "email": email, "password": password }).to_string();
        let peer: SocketAddr = format!("{ip}:40000").parse()?;
        let mut request = Request::builder()
            .method("POST")
            .uri("/signin")
            .header("Content-Type", "application/json")
            .body(Body::from(payload))?;
        request.extensions_mut().insert(ConnectInfo(peer));
        Ok(request)
    }

    /// Same as `sign_in_request`, with a client-chosen `x-forwarded-for`.
    pub fn forwarded_sign_in_request(
        email: &str,
        password: &str,
        peer_ip: &str,
        forwarded_for: &str,
    ) -> Result<Request<Body>> {
        let mut request = sign_in_request(email, password, peer_ip)?;
        request
            .headers_mut()
            .insert("x-forwarded-for", forwarded_for.parse()?);
        Ok(request)
    }

    pub async fn body_json(response: Response<Body>) -> Result<serde_json::Value> {
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
