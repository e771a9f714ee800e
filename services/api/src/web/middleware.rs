//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::info;

use crate::web::session::session_id_from_headers;
use crate::web::state::AppState;

/// The identity of the logged-in caller, inserted by [`require_auth`].
#[derive(Clone, Debug)]
pub struct CurrentUser(pub String);

/// Middleware that checks the session cookie, applies the inactivity timeout,
/// and extracts the logged-in identity.
///
/// If valid, inserts a [`CurrentUser`] into request extensions for handlers to use.
/// If invalid, missing or timed out, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Parse session ID from cookie
    let session_id = session_id_from_headers(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Apply the inactivity timeout and refresh the activity clock
    let now = state.now();
    let timeout = state.config.session_timeout_minutes;
    let identity = state
        .sessions
        .with_existing(&session_id, now, |ctx| {
            let before = ctx.identity.clone();
            let after = ctx.touch(now, timeout);
            if before.is_some() && after.is_none() {
                info!("Session timed out for {:?}", before);
            }
            after
        })
        .await
        .flatten()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 3. Insert the identity into request extensions
    req.extensions_mut().insert(CurrentUser(identity));

    // 4. Continue to the handler
    Ok(next.run(req).await)
}
