//! Per-request authorization gate.
//!
//! Two stages: `authenticate` verifies the bearer token and attaches the
//! decoded claims to the request; `require_role` checks the role against
//! an allowed set. Handlers read the claims back through the `Claims`
//! extractor.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;

use crate::errors::AppError;
use crate::models::user::Role;
use crate::session::SessionClaims;
use crate::AppState;

pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// Bearer token from the standard Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// First stage: verify signature and expiry, attach claims.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers()).ok_or(AppError::MissingToken)?;
    let claims = state.issuer.verify(token)?;
    if claims.tenant_id.is_none() {
        // Downstream tenant-scoped queries would silently run
        // tenant-less; reports reject such sessions outright.
        tracing::warn!(user = %claims.sub, "session token carries no tenant claim");
    }
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Second stage: role check. `NOT_AUTHENTICATED` when layered without a
/// prior gate pass.
pub async fn require_role(
    allowed: &'static [Role],
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = req
        .extensions()
        .get::<SessionClaims>()
        .ok_or(AppError::NotAuthenticated)?;
    if !allowed.contains(&claims.role) {
        tracing::warn!(user = %claims.sub, role = claims.role.as_str(), "role not allowed");
        return Err(AppError::Forbidden("access not allowed".into()));
    }
    Ok(next.run(req).await)
}

/// Extractor form of the gate result.
pub struct Claims(pub SessionClaims);

#[async_trait]
impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionClaims>()
            .cloned()
            .map(Claims)
            .ok_or(AppError::NotAuthenticated)
    }
}
