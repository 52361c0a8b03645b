use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::auth_gate::{self, ADMIN_ONLY};
use crate::AppState;

pub mod access_keys;
pub mod auth;
pub mod reports;
pub mod tenants;
pub mod users;

/// Build the application router. Admin routes sit behind the two-stage
/// gate (authenticate, then role check); validation, login, and refresh
/// are public by design.
pub fn router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/access-keys/validate", post(access_keys::validate))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh));

    let authenticated = Router::new()
        .route("/auth/me", get(auth::me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_gate::authenticate,
        ));

    let admin = Router::new()
        .route(
            "/access-keys",
            get(access_keys::list),
        )
        .route("/access-keys/generate", post(access_keys::generate))
        .route(
            "/access-keys/:id",
            get(access_keys::get_by_id).put(access_keys::update),
        )
        .route("/access-keys/:id/revoke", put(access_keys::revoke))
        .route(
            "/access-keys/:id/renew",
            put(access_keys::renew).patch(access_keys::renew),
        )
        .route("/access-keys/:id/logs", get(access_keys::logs))
        .route(
            "/access-keys/:id/bind-user/:user_id",
            post(access_keys::bind_user),
        )
        .route(
            "/access-keys/:id/unbind-user/:user_id",
            delete(access_keys::unbind_user),
        )
        .route("/tenants", get(tenants::list).post(tenants::create))
        .route(
            "/tenants/:id",
            get(tenants::get_by_id)
                .put(tenants::update)
                .delete(tenants::remove),
        )
        .route("/users", get(users::list).post(users::create))
        .route("/users/:id/status", put(users::set_status))
        .route("/reports/daily-movement", get(reports::daily_movement))
        .route("/reports/peak-hours", get(reports::peak_hours))
        .route("/reports/vehicles", get(reports::vehicles))
        .route("/reports/parked-vehicles", get(reports::parked_vehicles))
        .route_layer(middleware::from_fn(|req, next| {
            auth_gate::require_role(ADMIN_ONLY, req, next)
        }))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_gate::authenticate,
        ));

    Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(admin)
        .fallback(fallback_404)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}
