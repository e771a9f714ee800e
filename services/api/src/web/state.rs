//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the source of "now".

use crate::config::Config;
use crate::web::session::SessionRegistry;
use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Arc;
use weight_tracker_core::ports::{IdentityDirectory, RecordStore};

//=========================================================================================
// Clock
//=========================================================================================

/// Supplies the current instant; handlers never read the wall clock directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub records: Arc<dyn RecordStore>,
    pub identities: Arc<dyn IdentityDirectory>,
    pub sessions: Arc<SessionRegistry>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}

impl AppState {
    /// The current instant in the reference timezone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.clock.now().with_timezone(&self.config.reference_offset)
    }
}
