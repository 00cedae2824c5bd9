use axum::extract::{FromRef, FromRequestParts};
use axum::http::{request::Parts, HeaderMap};
use sha2::{Digest, Sha256};

use crate::response::AppError;
use crate::state::AppState;

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth_header| auth_header.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Compares digests so the comparison time does not depend on the token.
pub fn token_matches(presented: &str, expected: &str) -> bool {
    let presented = hash_token(presented);
    let expected = hash_token(expected);
    presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Operator authenticated with the configured admin token.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// SHA-256 of the presented token, for log correlation.
    pub token_hash: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?;

        if !token_matches(&token, &app_state.config().admin_token) {
            return Err(AppError::unauthorized("Invalid admin token"));
        }

        Ok(AdminAuth {
            token_hash: hash_token(&token),
        })
    }
}
