//! Access control for the records API.
//!
//! Both guards return early on failure; `next` only runs on the success path.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::auth::TokenService;
use crate::errors::ApiError;
use crate::models::{Claims, Role};
use crate::rest::AppState;

/// Pull the token out of `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthenticated("missing authorization header"))?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next()) {
        (Some("Bearer"), Some(token)) if !token.is_empty() => Ok(token),
        (Some("Bearer"), _) => Err(ApiError::Unauthenticated("missing bearer token")),
        _ => Err(ApiError::Unauthenticated("authorization scheme must be Bearer")),
    }
}

fn verify_bearer(headers: &HeaderMap, tokens: &TokenService) -> Result<Claims, ApiError> {
    let token = bearer_token(headers)?;
    tokens
        .verify(token)
        .map_err(|_| ApiError::Unauthenticated("invalid or expired token"))
}

/// Reject requests without a valid bearer token; cache the claims in the
/// request extensions for handlers and later guards.
pub async fn require_authenticated(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = verify_bearer(req.headers(), &state.tokens).map_err(|err| {
        tracing::warn!(method = %req.method(), uri = %req.uri(), error = %err, "authentication failed");
        err
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// State for [`require_role`]: the role to demand and a verifier for requests
/// whose claims were not cached by [`require_authenticated`].
#[derive(Clone)]
pub struct RoleGuard {
    pub role: Role,
    pub tokens: Arc<TokenService>,
}

pub async fn require_role(
    State(guard): State<RoleGuard>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = match req.extensions().get::<Claims>() {
        Some(claims) => claims.clone(),
        None => verify_bearer(req.headers(), &guard.tokens)?,
    };

    if claims.role != guard.role {
        tracing::warn!(
            username = %claims.username,
            role = %claims.role,
            required = %guard.role,
            "authorization failed"
        );
        return Err(ApiError::Forbidden { required: guard.role });
    }

    Ok(next.run(req).await)
}
