//! crates/weight_tracker_core/src/guard.rs
//!
//! Login throttling. Each identity is either open for attempts or locked
//! until a point in time; three consecutive failures lock it for fifteen
//! minutes.

use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset};

pub const MAX_FAILED_ATTEMPTS: u32 = 3;
pub const LOCKOUT_MINUTES: i64 = 15;

/// Attempt bookkeeping for one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginAttemptState {
    pub count: u32,
    pub locked_until: Option<DateTime<FixedOffset>>,
}

impl LoginAttemptState {
    fn is_locked_at(&self, now: DateTime<FixedOffset>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }
}

/// Whether an attempt may proceed to credential checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Refused { remaining_minutes: i64 },
}

/// What the guard concluded after a credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    Authenticated,
    Rejected { remaining_attempts: u32 },
    LockedOut { remaining_minutes: i64 },
}

impl AttemptVerdict {
    /// A user-facing description of a failed attempt.
    pub fn message(&self) -> Option<String> {
        match self {
            AttemptVerdict::Authenticated => None,
            AttemptVerdict::Rejected { remaining_attempts } => Some(format!(
                "Incorrect password. Attempts remaining: {remaining_attempts}"
            )),
            AttemptVerdict::LockedOut { remaining_minutes } => Some(locked_message(*remaining_minutes)),
        }
    }
}

pub fn locked_message(remaining_minutes: i64) -> String {
    format!("Account locked. Please try again in {remaining_minutes} minutes.")
}

/// Per-identity login attempt tracking for one session.
#[derive(Debug, Clone, Default)]
pub struct LoginGuard {
    attempts: HashMap<String, LoginAttemptState>,
}

impl LoginGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state for `identity`; unseen identities are open with no attempts.
    pub fn state(&self, identity: &str) -> LoginAttemptState {
        self.attempts.get(identity).cloned().unwrap_or_default()
    }

    pub fn is_locked(&self, identity: &str, now: DateTime<FixedOffset>) -> bool {
        self.attempts
            .get(identity)
            .is_some_and(|state| state.is_locked_at(now))
    }

    /// Whether any identity tracked by this guard is locked at `now`.
    pub fn has_live_lock(&self, now: DateTime<FixedOffset>) -> bool {
        self.attempts.values().any(|state| state.is_locked_at(now))
    }

    /// Whole minutes left on the lock (truncated), or 0 when not locked.
    pub fn remaining_lock_minutes(&self, identity: &str, now: DateTime<FixedOffset>) -> i64 {
        match self.attempts.get(identity).and_then(|s| s.locked_until) {
            Some(until) if now < until => (until - now).num_seconds() / 60,
            _ => 0,
        }
    }

    /// Gatekeeps an attempt before credentials are checked.
    ///
    /// An expired lock is cleared here (count back to 0), so the attempt is
    /// then processed under open rules. A live lock refuses without changing state.
    pub fn admit(&mut self, identity: &str, now: DateTime<FixedOffset>) -> Admission {
        let Some(state) = self.attempts.get_mut(identity) else {
            return Admission::Admitted;
        };
        match state.locked_until {
            Some(until) if now < until => Admission::Refused {
                remaining_minutes: (until - now).num_seconds() / 60,
            },
            Some(_) => {
                *state = LoginAttemptState::default();
                Admission::Admitted
            }
            None => Admission::Admitted,
        }
    }

    /// Records the outcome of a credential check for an admitted attempt.
    pub fn record(&mut self, identity: &str, succeeded: bool, now: DateTime<FixedOffset>) -> AttemptVerdict {
        if succeeded {
            self.attempts.insert(identity.to_string(), LoginAttemptState::default());
            return AttemptVerdict::Authenticated;
        }

        let state = self.attempts.entry(identity.to_string()).or_default();
        state.count += 1;
        if state.count >= MAX_FAILED_ATTEMPTS {
            let until = now + Duration::minutes(LOCKOUT_MINUTES);
            state.locked_until = Some(until);
            AttemptVerdict::LockedOut {
                remaining_minutes: (until - now).num_seconds() / 60,
            }
        } else {
            AttemptVerdict::Rejected {
                remaining_attempts: MAX_FAILED_ATTEMPTS - state.count,
            }
        }
    }

    /// Runs one full attempt: admission, then the credential outcome.
    ///
    /// `check` is only invoked when the attempt is admitted.
    pub fn attempt(
        &mut self,
        identity: &str,
        now: DateTime<FixedOffset>,
        check: impl FnOnce() -> bool,
    ) -> AttemptVerdict {
        match self.admit(identity, now) {
            Admission::Refused { remaining_minutes } => AttemptVerdict::LockedOut { remaining_minutes },
            Admission::Admitted => self.record(identity, check(), now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 1, 10, 0, 0)
            .unwrap()
    }

    #[test]
    fn unseen_identity_is_open() {
        let guard = LoginGuard::new();
        assert_eq!(guard.state("alice"), LoginAttemptState::default());
        assert!(!guard.is_locked("alice", t0()));
        assert_eq!(guard.remaining_lock_minutes("alice", t0()), 0);
    }

    #[test]
    fn failures_count_down_then_lock() {
        let mut guard = LoginGuard::new();
        assert_eq!(
            guard.attempt("alice", t0(), || false),
            AttemptVerdict::Rejected { remaining_attempts: 2 }
        );
        assert_eq!(
            guard.attempt("alice", t0(), || false),
            AttemptVerdict::Rejected { remaining_attempts: 1 }
        );
        assert_eq!(
            guard.attempt("alice", t0(), || false),
            AttemptVerdict::LockedOut { remaining_minutes: 15 }
        );
        assert!(guard.is_locked("alice", t0()));
        assert!(!guard.is_locked("bob", t0()));
    }

    #[test]
    fn correct_password_is_refused_while_locked() {
        let mut guard = LoginGuard::new();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            guard.attempt("alice", t0(), || false);
        }
        let before = guard.state("alice");

        let later = t0() + Duration::minutes(5) + Duration::seconds(30);
        let mut checked = false;
        let verdict = guard.attempt("alice", later, || {
            checked = true;
            true
        });

        assert_eq!(verdict, AttemptVerdict::LockedOut { remaining_minutes: 9 });
        assert!(!checked);
        assert_eq!(guard.state("alice"), before);
    }

    #[test]
    fn expired_lock_reopens_with_zero_count() {
        let mut guard = LoginGuard::new();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            guard.attempt("alice", t0(), || false);
        }
        let expiry = t0() + Duration::minutes(LOCKOUT_MINUTES);

        assert_eq!(guard.admit("alice", expiry), Admission::Admitted);
        assert_eq!(guard.state("alice"), LoginAttemptState::default());

        // A failure after expiry starts a fresh count.
        assert_eq!(
            guard.record("alice", false, expiry),
            AttemptVerdict::Rejected { remaining_attempts: 2 }
        );
    }

    #[test]
    fn live_lock_is_reported_until_expiry() {
        let mut guard = LoginGuard::new();
        assert!(!guard.has_live_lock(t0()));
        for _ in 0..MAX_FAILED_ATTEMPTS {
            guard.attempt("bob", t0(), || false);
        }
        assert!(guard.has_live_lock(t0() + Duration::minutes(14)));
        assert!(!guard.has_live_lock(t0() + Duration::minutes(LOCKOUT_MINUTES)));
    }

    #[test]
    fn success_resets_the_count() {
        let mut guard = LoginGuard::new();
        guard.attempt("alice", t0(), || false);
        guard.attempt("alice", t0(), || false);
        assert_eq!(guard.attempt("alice", t0(), || true), AttemptVerdict::Authenticated);
        assert_eq!(guard.state("alice").count, 0);
        assert_eq!(
            guard.attempt("alice", t0(), || false),
            AttemptVerdict::Rejected { remaining_attempts: 2 }
        );
    }

    #[test]
    fn verdict_messages_distinguish_rejection_from_lockout() {
        assert!(AttemptVerdict::Authenticated.message().is_none());
        assert_eq!(
            AttemptVerdict::Rejected { remaining_attempts: 1 }.message().unwrap(),
            "Incorrect password. Attempts remaining: 1"
        );
        assert_eq!(
            AttemptVerdict::LockedOut { remaining_minutes: 12 }.message().unwrap(),
            "Account locked. Please try again in 12 minutes."
        );
    }
}
