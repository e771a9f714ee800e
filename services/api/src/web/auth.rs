//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for registration, login, logout and session status.
//!
//! Every login attempt passes through the session's `LoginGuard` before the
//! password is checked.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use weight_tracker_core::domain::IdentityEntry;
use weight_tracker_core::guard::{locked_message, Admission, AttemptVerdict};

use crate::error::{store_failure, Rejection};
use crate::web::session::{resolve_session_id, session_id_from_headers};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CredentialsRequest {
    pub identity: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub identity: String,
}

#[derive(Serialize, ToSchema)]
pub struct IdentityStatus {
    pub identity: String,
    /// `None` when the identity directory could not be read.
    pub registered: Option<bool>,
    pub locked: bool,
    pub remaining_lock_minutes: i64,
}

#[derive(Serialize, ToSchema)]
pub struct SessionStatusResponse {
    pub identity: Option<String>,
    pub logged_in: bool,
    /// Minutes left before the inactivity timeout, when logged in.
    pub session_remaining_minutes: Option<i64>,
    /// True exactly once after the session was closed for inactivity.
    pub timed_out: bool,
    pub identities: Vec<IdentityStatus>,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Attaches the session cookie when one was minted for this request.
fn with_cookie(mut response: Response, cookie: Option<String>) -> Response {
    if let Some(value) = cookie.and_then(|c| HeaderValue::from_str(&c).ok()) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

fn hash_password(password: &str) -> Result<(String, String), argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string();
    Ok((hash, salt.as_str().to_string()))
}

fn verify_password(password: &str, entry: &IdentityEntry) -> bool {
    match PasswordHash::new(&entry.password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            error!("Failed to parse password hash: {:?}", e);
            false
        }
    }
}

fn check_identity(state: &AppState, identity: &str) -> Result<(), Rejection> {
    if state.config.is_known_identity(identity) {
        Ok(())
    } else {
        Err((StatusCode::BAD_REQUEST, "Invalid user identity".to_string()))
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Register one of the configured identities
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "Identity registered and logged in", body = AuthResponse),
        (status = 400, description = "Unknown identity or empty password"),
        (status = 409, description = "Identity already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CredentialsRequest>,
) -> Response {
    let (session_id, cookie) = resolve_session_id(&headers);
    let result = register(&state, &session_id, req).await;
    with_cookie(result.into_response(), cookie)
}

async fn register(
    state: &AppState,
    session_id: &str,
    req: CredentialsRequest,
) -> Result<impl IntoResponse, Rejection> {
    // 1. Only the configured identities may register
    check_identity(state, &req.identity)?;
    if req.password.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Password must not be empty".to_string()));
    }

    // 2. Hash the password
    let (password_hash, salt) = hash_password(&req.password).map_err(|e| {
        error!("Failed to hash password: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash password".to_string())
    })?;

    // 3. Create the identity, unless someone else already did
    let now = state.now();
    let entry = IdentityEntry {
        password_hash,
        salt,
        registered_at: now,
    };
    let created = state
        .identities
        .create_identity_if_absent(&req.identity, &entry)
        .await
        .map_err(|e| store_failure("register identity", e))?;
    if !created {
        return Err((
            StatusCode::CONFLICT,
            "This identity is already registered".to_string(),
        ));
    }

    // 4. Log the session in
    state
        .sessions
        .with_session(session_id, now, |ctx| ctx.log_in(&req.identity, now))
        .await;
    info!("Registered identity {}", req.identity);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            identity: req.identity,
        }),
    ))
}

/// POST /auth/login - Login with a registered identity
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Unknown identity"),
        (status = 401, description = "Wrong credentials, with attempts remaining"),
        (status = 429, description = "Identity locked, with minutes remaining"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CredentialsRequest>,
) -> Response {
    let (session_id, cookie) = resolve_session_id(&headers);
    let result = login(&state, &session_id, req).await;
    with_cookie(result.into_response(), cookie)
}

async fn login(
    state: &AppState,
    session_id: &str,
    req: CredentialsRequest,
) -> Result<impl IntoResponse, Rejection> {
    check_identity(state, &req.identity)?;

    // 1. Refuse outright while the identity is locked for this session
    let now = state.now();
    let admission = state
        .sessions
        .with_session(session_id, now, |ctx| ctx.guard.admit(&req.identity, now))
        .await;
    if let Admission::Refused { remaining_minutes } = admission {
        return Err((StatusCode::TOO_MANY_REQUESTS, locked_message(remaining_minutes)));
    }

    // 2. Check the password against the directory
    let entry = state
        .identities
        .find_identity(&req.identity)
        .await
        .map_err(|e| store_failure("look up identity", e))?;
    let valid = entry
        .as_ref()
        .is_some_and(|entry| verify_password(&req.password, entry));

    // 3. Record the outcome, refusing it if a parallel attempt locked the identity meanwhile
    let verdict = state
        .sessions
        .with_session(session_id, now, |ctx| {
            let verdict = ctx.guard.attempt(&req.identity, now, || valid);
            if verdict == AttemptVerdict::Authenticated {
                ctx.log_in(&req.identity, now);
            }
            verdict
        })
        .await;

    match verdict {
        AttemptVerdict::Authenticated => {
            info!("Login succeeded for {}", req.identity);
            Ok((
                StatusCode::OK,
                Json(AuthResponse {
                    identity: req.identity,
                }),
            ))
        }
        AttemptVerdict::Rejected { .. } => Err((
            StatusCode::UNAUTHORIZED,
            verdict.message().unwrap_or_default(),
        )),
        AttemptVerdict::LockedOut { .. } => {
            warn!("Login refused for {}: identity locked", req.identity);
            Err((
                StatusCode::TOO_MANY_REQUESTS,
                verdict.message().unwrap_or_default(),
            ))
        }
    }
}

/// POST /auth/logout - End the logged-in part of the session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Rejection> {
    let session_id = session_id_from_headers(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .sessions
        .with_existing(&session_id, state.now(), |ctx| ctx.log_out())
        .await
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    Ok(StatusCode::OK)
}

/// GET /auth/status - Describe the session and each identity's login state
#[utoipa::path(
    get,
    path = "/auth/status",
    responses(
        (status = 200, description = "Current session status", body = SessionStatusResponse)
    )
)]
pub async fn status_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let (session_id, cookie) = resolve_session_id(&headers);
    let now = state.now();
    let timeout = state.config.session_timeout_minutes;
    let known = state.config.identities.clone();

    // 1. Refresh the session and snapshot its state
    let (identity, remaining, timed_out, locks) = state
        .sessions
        .with_session(&session_id, now, |ctx| {
            let identity = ctx.touch(now, timeout);
            let locks: Vec<(bool, i64)> = known
                .iter()
                .map(|id| (ctx.guard.is_locked(id, now), ctx.guard.remaining_lock_minutes(id, now)))
                .collect();
            (
                identity,
                ctx.remaining_minutes(now, timeout),
                ctx.take_timeout_notice(),
                locks,
            )
        })
        .await;

    // 2. Look up which identities have registered
    let registered = match state.identities.read_all_identities().await {
        Ok(directory) => Some(directory),
        Err(e) => {
            error!("Failed to read identity directory: {:?}", e);
            None
        }
    };

    let identities = known
        .iter()
        .zip(locks)
        .map(|(id, (locked, remaining_lock_minutes))| IdentityStatus {
            identity: id.clone(),
            registered: registered.as_ref().map(|d| d.contains_key(id)),
            locked,
            remaining_lock_minutes,
        })
        .collect();

    let response = SessionStatusResponse {
        logged_in: identity.is_some(),
        identity,
        session_remaining_minutes: remaining,
        timed_out,
        identities,
    };
    with_cookie(Json(response).into_response(), cookie)
}
