use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::{Role, User};
use crate::session;
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub handle: String,
    pub password: String,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub active: bool,
}

/// POST /users — create an operator account.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let handle = payload.handle.trim().to_string();
    if handle.is_empty() {
        return Err(AppError::Validation("handle is required".into()));
    }
    if payload.password.len() < 6 {
        return Err(AppError::Validation(
            "password must be at least 6 characters".into(),
        ));
    }
    if state.store.users.find_by_handle(&handle).await?.is_some() {
        return Err(AppError::Validation(
            "a user with this handle already exists".into(),
        ));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        name: payload.name,
        handle,
        password_hash: session::hash_password(&payload.password)?,
        phone: payload.phone,
        role: payload.role.unwrap_or(Role::Operator),
        active: true,
        created_at: now,
        updated_at: now,
    };
    state.store.users.insert(&user).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "user created",
            "data": { "user": user },
        })),
    ))
}

/// GET /users
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let users = state.store.users.list().await?;
    Ok(Json(json!({
        "success": true,
        "count": users.len(),
        "data": users,
    })))
}

/// PUT /users/:id/status — activate or deactivate. Deactivation is the
/// indirect revocation path for outstanding session tokens.
pub async fn set_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let updated = state.store.users.set_active(id, payload.active).await?;
    if !updated {
        return Err(AppError::NotFound("user"));
    }
    tracing::info!(user = %id, active = payload.active, "user status changed");
    Ok(Json(json!({
        "success": true,
        "message": if payload.active { "user activated" } else { "user deactivated" },
    })))
}
