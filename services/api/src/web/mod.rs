pub mod auth;
pub mod dashboard;
pub mod middleware;
pub mod rest;
pub mod session;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

pub use dashboard::dashboard_handler;
pub use middleware::require_auth;
pub use rest::{create_record_handler, delete_record_handler, list_records_handler, update_record_handler};

use state::AppState;

/// Builds the API routes: public auth endpoints plus the session-protected
/// record and dashboard endpoints.
pub fn api_router(app_state: Arc<AppState>) -> Router {
    // Public routes (no login required)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/status", get(auth::status_handler));

    // Protected routes (login required)
    let protected_routes = Router::new()
        .route("/records", post(create_record_handler).get(list_records_handler))
        .route(
            "/records/{id}",
            put(update_record_handler).delete(delete_record_handler),
        )
        .route("/dashboard", get(dashboard_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
