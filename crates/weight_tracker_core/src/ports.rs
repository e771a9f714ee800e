//! crates/weight_tracker_core/src/ports.rs
//!
//! Defines the storage contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete document store.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::{IdentityEntry, WeightRecord};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Key-value persistence of weight records, partitioned per user key.
///
/// Every call is a single attempt; failures are reported to the caller and
/// never retried.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists a new record and returns the id minted for it.
    async fn create(&self, user_key: &str, record: &WeightRecord) -> PortResult<String>;

    /// Returns every record under `user_key`, in insertion order, with `id` set.
    async fn read_all(&self, user_key: &str) -> PortResult<Vec<WeightRecord>>;

    /// Replaces the record stored under `id`. The stored copy is marked as edited.
    async fn update(&self, user_key: &str, id: &str, record: &WeightRecord) -> PortResult<()>;

    async fn delete(&self, user_key: &str, id: &str) -> PortResult<()>;
}

/// The directory of registered login identities.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn read_all_identities(&self) -> PortResult<BTreeMap<String, IdentityEntry>>;

    async fn find_identity(&self, identity: &str) -> PortResult<Option<IdentityEntry>>;

    /// Atomically registers `identity` unless it already exists.
    ///
    /// Returns `false` when another registration got there first.
    async fn create_identity_if_absent(
        &self,
        identity: &str,
        entry: &IdentityEntry,
    ) -> PortResult<bool>;
}
