use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::middleware::auth_gate::{bearer_token, Claims};
use crate::session;
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub login_handle: String,
    pub password: String,
}

/// POST /auth/login — mint a session token bound to the user's tenant.
///
/// Unknown handle, inactive account, and wrong password all produce the
/// identical generic failure; the concrete cause is logged at debug
/// level only.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    let user = match state.store.users.find_by_handle(&payload.login_handle).await? {
        Some(user) if user.active => user,
        Some(_) => {
            tracing::debug!(handle = %payload.login_handle, "login rejected: inactive user");
            return Err(AppError::InvalidCredentials);
        }
        None => {
            tracing::debug!(handle = %payload.login_handle, "login rejected: unknown handle");
            return Err(AppError::InvalidCredentials);
        }
    };

    if !session::verify_password(&payload.password, &user.password_hash) {
        tracing::debug!(handle = %payload.login_handle, "login rejected: bad password");
        return Err(AppError::InvalidCredentials);
    }

    // Tenant attachment is a required login step, not a warning: a
    // session without a tenant cannot be scoped downstream.
    let tenant_id = state.keys.tenant_for_user(user.id).await?;
    let Some(tenant_id) = tenant_id else {
        tracing::debug!(handle = %payload.login_handle, "login rejected: no tenant binding");
        return Err(AppError::Forbidden(
            "user is not associated with a tenant".into(),
        ));
    };

    let token = state.issuer.mint(&user, Some(tenant_id))?;
    tracing::info!(user = %user.id, tenant = %tenant_id, "login succeeded");

    Ok(Json(json!({
        "success": true,
        "data": {
            "user": user,
            "token": token,
        },
    })))
}

/// POST /auth/refresh — re-issue a token from a possibly expired one.
/// The signature must verify; only the expiry check is waived.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::MissingToken)?;
    let fresh = state.issuer.refresh(token)?;
    Ok(Json(json!({
        "success": true,
        "data": { "token": fresh },
    })))
}

/// GET /auth/me — the authenticated user.
pub async fn me(
    State(state): State<Arc<AppState>>,
    Claims(claims): Claims,
) -> Result<Json<Value>, AppError> {
    let user = state
        .store
        .users
        .find(claims.sub)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    Ok(Json(json!({
        "success": true,
        "data": { "user": user },
    })))
}
