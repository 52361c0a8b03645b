use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::key::KeyStatus;
use crate::models::tenant::{Tenant, TenantPatch};
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
}

/// POST /tenants
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name is required".into()));
    }
    let now = Utc::now();
    let tenant = Tenant {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        email: payload.email,
        phone: payload.phone,
        company_name: payload.company_name,
        active: true,
        created_at: now,
        updated_at: now,
    };
    state.store.tenants.insert(&tenant).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "tenant created",
            "data": tenant,
        })),
    ))
}

/// GET /tenants
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let tenants = state.store.tenants.list().await?;
    Ok(Json(json!({
        "success": true,
        "count": tenants.len(),
        "data": tenants,
    })))
}

/// GET /tenants/:id — the tenant plus its key counts.
pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let tenant = state
        .store
        .tenants
        .find(id)
        .await?
        .ok_or(AppError::NotFound("tenant"))?;
    let (key_count, active_key_count) = tokio::try_join!(
        state.store.keys.count_for_tenant(id, None),
        state.store.keys.count_for_tenant(id, Some(KeyStatus::Active)),
    )?;
    Ok(Json(json!({
        "success": true,
        "data": {
            "tenant": tenant,
            "keyCount": key_count,
            "activeKeyCount": active_key_count,
        },
    })))
}

/// PUT /tenants/:id
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(patch): Json<TenantPatch>,
) -> Result<Json<Value>, AppError> {
    let mut tenant = state
        .store
        .tenants
        .find(id)
        .await?
        .ok_or(AppError::NotFound("tenant"))?;
    tenant.apply(patch);
    tenant.updated_at = Utc::now();
    state.store.tenants.update(&tenant).await?;
    Ok(Json(json!({
        "success": true,
        "message": "tenant updated",
        "data": tenant,
    })))
}

/// DELETE /tenants/:id — refused while the tenant owns active keys.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if state.store.tenants.find(id).await?.is_none() {
        return Err(AppError::NotFound("tenant"));
    }
    let active = state
        .store
        .keys
        .count_for_tenant(id, Some(KeyStatus::Active))
        .await?;
    if active > 0 {
        return Err(AppError::Validation(
            "cannot delete a tenant with active access keys; deactivate them first".into(),
        ));
    }
    state.store.tenants.delete(id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "tenant deleted",
    })))
}
