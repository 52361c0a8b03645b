//! End-to-end auth and routing tests: login → token → gate → admin
//! surface, driven through the router with `oneshot` requests.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use valetgate::api;
use valetgate::models::key::KeyStatus;
use valetgate::models::user::Role;

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn send_json(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Full fixture: a tenant with one key, a bound admin and a bound
/// operator, and the router.
async fn fixture() -> (
    std::sync::Arc<valetgate::AppState>,
    Router,
    valetgate::models::tenant::Tenant,
    valetgate::models::key::AccessKey,
) {
    let (state, _) = common::state();
    let tenant = common::seed_tenant(&state, "Acme Valet").await;
    let key = common::seed_key(
        &state,
        &tenant,
        "VALET-1234567890AB",
        KeyStatus::Active,
        Utc::now() + Duration::days(30),
    )
    .await;
    let admin = common::seed_user(&state, "admin", "admin-pass", Role::Admin).await;
    let operator = common::seed_user(&state, "joao", "joao-pass", Role::Operator).await;
    state.keys.bind_user(key.id, admin.id).await.unwrap();
    state.keys.bind_user(key.id, operator.id).await.unwrap();
    let app = api::router(state.clone());
    (state, app, tenant, key)
}

#[tokio::test]
async fn login_mints_a_tenant_scoped_token() {
    let (state, app, tenant, _) = fixture().await;

    let (status, body) = send(
        &app,
        send_json(
            "POST",
            "/auth/login",
            None,
            json!({"loginHandle": "admin", "password": "admin-pass"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["data"]["user"].get("passwordHash").is_none());

    let token = body["data"]["token"].as_str().unwrap();
    let claims = state.issuer.verify(token).unwrap();
    assert_eq!(claims.handle, "admin");
    assert_eq!(claims.role, Role::Admin);
    assert_eq!(claims.tenant_id, Some(tenant.id));

    // The token opens the authenticated surface.
    let (status, body) = send(&app, get("/auth/me", Some(token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["handle"], "admin");
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let (state, app, _, _) = fixture().await;

    let (status_wrong, body_wrong) = send(
        &app,
        send_json(
            "POST",
            "/auth/login",
            None,
            json!({"loginHandle": "admin", "password": "wrong"}),
        ),
    )
    .await;

    // Deactivate the operator and try a correct password.
    let operator = state
        .store
        .users
        .find_by_handle("joao")
        .await
        .unwrap()
        .unwrap();
    state.store.users.set_active(operator.id, false).await.unwrap();
    let (status_inactive, body_inactive) = send(
        &app,
        send_json(
            "POST",
            "/auth/login",
            None,
            json!({"loginHandle": "joao", "password": "joao-pass"}),
        ),
    )
    .await;

    let (status_unknown, body_unknown) = send(
        &app,
        send_json(
            "POST",
            "/auth/login",
            None,
            json!({"loginHandle": "nobody", "password": "whatever"}),
        ),
    )
    .await;

    assert_eq!(status_wrong, StatusCode::UNAUTHORIZED);
    assert_eq!(status_inactive, StatusCode::UNAUTHORIZED);
    assert_eq!(status_unknown, StatusCode::UNAUTHORIZED);
    // Identical bodies: no account enumeration.
    assert_eq!(body_wrong, body_inactive);
    assert_eq!(body_wrong, body_unknown);
    assert_eq!(body_wrong["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn login_without_tenant_binding_is_refused() {
    let (state, _) = common::state();
    common::seed_user(&state, "stray", "stray-pass", Role::Operator).await;
    let app = api::router(state.clone());

    let (status, body) = send(
        &app,
        send_json(
            "POST",
            "/auth/login",
            None,
            json!({"loginHandle": "stray", "password": "stray-pass"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn gate_rejects_missing_invalid_and_expired_tokens() {
    let (state, app, tenant, _) = fixture().await;

    let (status, body) = send(&app, get("/access-keys", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "MISSING_TOKEN");

    let (status, body) = send(&app, get("/access-keys", Some("garbage.token.here"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_TOKEN");

    let admin = state
        .store
        .users
        .find_by_handle("admin")
        .await
        .unwrap()
        .unwrap();
    let expired = state
        .issuer
        .mint_with_ttl(&admin, Some(tenant.id), Duration::hours(-1))
        .unwrap();
    let (status, body) = send(&app, get("/access-keys", Some(&expired))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn operator_role_cannot_reach_the_admin_surface() {
    let (state, app, tenant, _) = fixture().await;
    let operator = state
        .store
        .users
        .find_by_handle("joao")
        .await
        .unwrap()
        .unwrap();
    let token = state.issuer.mint(&operator, Some(tenant.id)).unwrap();

    let (status, body) = send(&app, get("/access-keys", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = send(&app, get("/reports/parked-vehicles", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    // The authenticated-but-not-admin surface still works.
    let (status, _) = send(&app, get("/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_revives_an_expired_token_but_never_a_tampered_one() {
    let (state, app, tenant, _) = fixture().await;
    let admin = state
        .store
        .users
        .find_by_handle("admin")
        .await
        .unwrap()
        .unwrap();
    let expired = state
        .issuer
        .mint_with_ttl(&admin, Some(tenant.id), Duration::hours(-1))
        .unwrap();

    let (status, body) = send(
        &app,
        send_json("POST", "/auth/refresh", Some(&expired), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let fresh = body["data"]["token"].as_str().unwrap();

    let claims = state.issuer.verify(fresh).unwrap();
    assert_eq!(claims.sub, admin.id);
    assert_eq!(claims.tenant_id, Some(tenant.id));

    // The refreshed token opens the admin surface again.
    let (status, _) = send(&app, get("/access-keys", Some(fresh))).await;
    assert_eq!(status, StatusCode::OK);

    let mut tampered = expired[..expired.len() - 2].to_string();
    tampered.push_str("xx");
    let (status, body) = send(
        &app,
        send_json("POST", "/auth/refresh", Some(&tampered), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_TOKEN");

    let (status, body) = send(&app, send_json("POST", "/auth/refresh", None, json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "MISSING_TOKEN");
}

#[tokio::test]
async fn validate_endpoint_speaks_the_error_envelope() {
    let (_, app, _, _) = fixture().await;

    let (status, body) = send(
        &app,
        send_json("POST", "/access-keys/validate", None, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "MISSING_KEY");

    let (status, body) = send(
        &app,
        send_json(
            "POST",
            "/access-keys/validate",
            None,
            json!({"code": "VALET-DOESNOTEXIST", "deviceId": "d1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_KEY");

    let (status, body) = send(
        &app,
        send_json(
            "POST",
            "/access-keys/validate",
            None,
            json!({"code": "VALET-1234567890AB", "deviceId": "d1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["daysRemaining"], 30);
}

#[tokio::test]
async fn revoked_key_surfaces_reason_through_the_api() {
    let (state, app, _, key) = fixture().await;
    state
        .keys
        .revoke(key.id, Some("non-payment".into()))
        .await
        .unwrap();

    let (status, body) = send(
        &app,
        send_json(
            "POST",
            "/access-keys/validate",
            None,
            json!({"code": "VALET-1234567890AB"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "ACCESS_REVOKED");
    assert_eq!(body["reason"], "non-payment");
}

#[tokio::test]
async fn key_update_rejects_tenant_reassignment() {
    let (state, app, tenant, key) = fixture().await;
    let admin = state
        .store
        .users
        .find_by_handle("admin")
        .await
        .unwrap()
        .unwrap();
    let token = state.issuer.mint(&admin, Some(tenant.id)).unwrap();

    let (status, _) = send(
        &app,
        send_json(
            "PUT",
            &format!("/access-keys/{}", key.id),
            Some(&token),
            json!({"clientId": uuid::Uuid::new_v4(), "clientName": "Hijack"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Without the tenant field the same patch goes through.
    let (status, body) = send(
        &app,
        send_json(
            "PUT",
            &format!("/access-keys/{}", key.id),
            Some(&token),
            json!({"clientName": "Acme Valet SA"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["clientName"], "Acme Valet SA");
    assert_eq!(body["data"]["tenantId"], tenant.id.to_string());
}

#[tokio::test]
async fn tenant_deletion_is_refused_while_active_keys_exist() {
    let (state, app, tenant, key) = fixture().await;
    let admin = state
        .store
        .users
        .find_by_handle("admin")
        .await
        .unwrap()
        .unwrap();
    let token = state.issuer.mint(&admin, Some(tenant.id)).unwrap();

    let (status, body) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/tenants/{}", tenant.id))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    // Revoke the only key, then deletion goes through.
    state.keys.revoke(key.id, None).await.unwrap();
    let (status, body) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/tenants/{}", tenant.id))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn peak_hours_endpoint_returns_the_empty_shape() {
    let (state, app, tenant, _) = fixture().await;
    let admin = state
        .store
        .users
        .find_by_handle("admin")
        .await
        .unwrap()
        .unwrap();
    let token = state.issuer.mint(&admin, Some(tenant.id)).unwrap();

    let (status, body) = send(
        &app,
        get("/reports/peak-hours?all_time=true", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["highest_peak"], Value::Null);
    assert_eq!(body["avg_movements"], 0);
}
