use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::keys::{NewAccessKey, ValidateRequest};
use crate::models::key::AccessKeyPatch;
use crate::AppState;

// ── Request DTOs ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccessKeyRequest {
    /// Present only to reject it: the owning tenant is immutable.
    pub client_id: Option<Uuid>,
    #[serde(flatten)]
    pub patch: AccessKeyPatch,
}

#[derive(Deserialize)]
pub struct RevokeRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct RenewRequest {
    pub months: Option<u32>,
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /access-keys/validate — mobile-client activation. Unauthenticated;
/// every attempt is audited.
pub async fn validate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ValidateRequest>,
) -> Result<Json<Value>, AppError> {
    let result = state.keys.validate(&payload).await?;
    Ok(Json(json!({
        "success": true,
        "message": "access key is valid",
        "data": result,
    })))
}

/// POST /access-keys/generate — issue a new key for a tenant.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewAccessKey>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let key = state.keys.create(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "access key created",
            "data": key,
        })),
    ))
}

/// GET /access-keys — all keys, newest-first.
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let keys = state.store.keys.list().await?;
    Ok(Json(json!({
        "success": true,
        "count": keys.len(),
        "data": keys,
    })))
}

/// GET /access-keys/:id — one key plus its bound users.
pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let key = state
        .store
        .keys
        .find(id)
        .await?
        .ok_or(AppError::NotFound("access key"))?;
    let users = state.store.keys.users_for_key(id).await?;

    let mut data = serde_json::to_value(&key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("serialization: {e}")))?;
    data["users"] = serde_json::to_value(&users)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("serialization: {e}")))?;
    Ok(Json(json!({ "success": true, "data": data })))
}

/// PUT /access-keys/:id — typed partial update.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAccessKeyRequest>,
) -> Result<Json<Value>, AppError> {
    if payload.client_id.is_some() {
        return Err(AppError::Validation(
            "the owning tenant of an access key cannot be changed".into(),
        ));
    }
    let key = state.keys.update(id, payload.patch).await?;
    Ok(Json(json!({
        "success": true,
        "message": "access key updated",
        "data": key,
    })))
}

/// PUT /access-keys/:id/revoke — terminal state, carries the reason.
pub async fn revoke(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RevokeRequest>,
) -> Result<Json<Value>, AppError> {
    let key = state.keys.revoke(id, payload.reason).await?;
    Ok(Json(json!({
        "success": true,
        "message": "access key revoked",
        "data": key,
    })))
}

/// PUT|PATCH /access-keys/:id/renew — renew from today.
pub async fn renew(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RenewRequest>,
) -> Result<Json<Value>, AppError> {
    let key = state.keys.renew(id, payload.months).await?;
    Ok(Json(json!({
        "success": true,
        "message": "access key renewed",
        "data": key,
    })))
}

/// GET /access-keys/:id/logs — last 50 validation attempts, newest-first.
pub async fn logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let entries = state.store.audit.recent_for(id, 50).await?;
    Ok(Json(json!({
        "success": true,
        "count": entries.len(),
        "data": entries,
    })))
}

/// POST /access-keys/:id/bind-user/:user_id
pub async fn bind_user(
    State(state): State<Arc<AppState>>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    let users = state.keys.bind_user(id, user_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "user bound to access key",
        "data": users,
    })))
}

/// DELETE /access-keys/:id/unbind-user/:user_id
pub async fn unbind_user(
    State(state): State<Arc<AppState>>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    let users = state.keys.unbind_user(id, user_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "user unbound from access key",
        "data": users,
    })))
}
