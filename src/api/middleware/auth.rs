//! Shared-token authentication for agents and operators

use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

/// Reject requests whose `Authorization: Bearer <token>` does not carry the hub token.
///
/// Installed as a route layer, so unknown paths still answer 404.
pub async fn auth_middleware(
    State(hub_token): State<String>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let presented = bearer_token(request.headers())?;

    if !tokens_match(presented, &hub_token) {
        debug!(path = %request.uri().path(), "rejected request with wrong hub token");
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidFormat)
}

/// Compares every byte so the time taken does not depend on the mismatch position.
fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len()
        && presented
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

/// Why a request was turned away
#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "hub token required"),
            AuthError::InvalidFormat => (StatusCode::UNAUTHORIZED, "expected 'Authorization: Bearer <token>'"),
            AuthError::InvalidToken => (StatusCode::FORBIDDEN, "hub token rejected"),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
