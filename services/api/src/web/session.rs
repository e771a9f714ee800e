//! services/api/src/web/session.rs
//!
//! Per-browser session contexts. Each context carries the logged-in identity,
//! the login guard for that browser, and the inactivity clock. Contexts live in
//! process memory only and are gone after a restart.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration, FixedOffset};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;
use weight_tracker_core::guard::LoginGuard;

pub const SESSION_COOKIE: &str = "session";

//=========================================================================================
// SessionContext (Specific to One Browser)
//=========================================================================================

#[derive(Debug, Default)]
pub struct SessionContext {
    pub identity: Option<String>,
    pub guard: LoginGuard,
    pub last_activity: Option<DateTime<FixedOffset>>,
    /// Set when the session was logged out for inactivity; reported once.
    pub timeout_notice: bool,
    /// The last request that reached this context, logged in or not.
    pub last_seen: Option<DateTime<FixedOffset>>,
}

impl SessionContext {
    pub fn log_in(&mut self, identity: &str, now: DateTime<FixedOffset>) {
        self.identity = Some(identity.to_string());
        self.last_activity = Some(now);
        self.timeout_notice = false;
    }

    pub fn log_out(&mut self) {
        self.identity = None;
        self.last_activity = None;
    }

    /// Applies the inactivity timeout and refreshes the activity clock.
    ///
    /// Returns the identity that is still logged in, if any.
    pub fn touch(&mut self, now: DateTime<FixedOffset>, timeout_minutes: i64) -> Option<String> {
        self.identity.as_ref()?;

        let last = *self.last_activity.get_or_insert(now);
        if now - last > Duration::minutes(timeout_minutes) {
            self.log_out();
            self.timeout_notice = true;
            return None;
        }

        self.last_activity = Some(now);
        self.identity.clone()
    }

    /// Whole minutes left before the inactivity timeout, when logged in.
    pub fn remaining_minutes(&self, now: DateTime<FixedOffset>, timeout_minutes: i64) -> Option<i64> {
        self.identity.as_ref()?;
        let last = self.last_activity?;
        let left = Duration::minutes(timeout_minutes) - (now - last);
        Some(left.num_seconds().max(0) / 60)
    }

    /// Returns and clears the pending timeout notice.
    pub fn take_timeout_notice(&mut self) -> bool {
        std::mem::take(&mut self.timeout_notice)
    }

    /// Whether the registry may drop this context.
    ///
    /// Contexts holding a live lockout are kept. Anonymous contexts go after
    /// `idle`; logged-in or timed-out ones get twice that, so the timeout
    /// notice can still be reported.
    pub fn is_stale(&self, now: DateTime<FixedOffset>, idle: Duration) -> bool {
        if self.guard.has_live_lock(now) {
            return false;
        }
        let Some(seen) = self.last_seen else {
            return true;
        };
        let limit = if self.identity.is_some() || self.timeout_notice {
            idle * 2
        } else {
            idle
        };
        now - seen > limit
    }
}

//=========================================================================================
// SessionRegistry (Shared Across All Requests)
//=========================================================================================

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionContext>>,
    idle: Duration,
}

impl SessionRegistry {
    /// `idle_minutes` is how long an unused context is kept; normally the
    /// session timeout.
    pub fn new(idle_minutes: i64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle: Duration::minutes(idle_minutes),
        }
    }

    /// Runs `f` against the context for `session_id`, creating it if unseen.
    ///
    /// Creating a context first drops every stale one.
    pub async fn with_session<R>(
        &self,
        session_id: &str,
        now: DateTime<FixedOffset>,
        f: impl FnOnce(&mut SessionContext) -> R,
    ) -> R {
        let mut sessions = self.sessions.lock().await;
        if !sessions.contains_key(session_id) {
            let before = sessions.len();
            sessions.retain(|_, context| !context.is_stale(now, self.idle));
            let dropped = before - sessions.len();
            if dropped > 0 {
                debug!("Dropped {} idle sessions", dropped);
            }
        }
        let context = sessions.entry(session_id.to_string()).or_default();
        context.last_seen = Some(now);
        f(context)
    }

    /// Runs `f` against an existing context only.
    pub async fn with_existing<R>(
        &self,
        session_id: &str,
        now: DateTime<FixedOffset>,
        f: impl FnOnce(&mut SessionContext) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(session_id).map(|context| {
            context.last_seen = Some(now);
            f(context)
        })
    }

    /// Number of contexts currently held.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

//=========================================================================================
// Cookie Helpers
//=========================================================================================

/// Extracts the session id from the `Cookie` header, if present.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE).and_then(|v| v.to_str().ok())?;
    cookie_header
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// The caller's session id, or a freshly minted one plus the cookie that sets it.
pub fn resolve_session_id(headers: &HeaderMap) -> (String, Option<String>) {
    match session_id_from_headers(headers) {
        Some(id) => (id, None),
        None => {
            let id = Uuid::new_v4().to_string();
            let cookie = format!(
                "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/",
                SESSION_COOKIE, id
            );
            (id, Some(cookie))
        }
    }
}
