//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `RecordStore` and `IdentityDirectory` ports from the `core` crate. Records
//! are kept as JSON documents keyed by id, partitioned by user key, in PostgreSQL.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;
use weight_tracker_core::domain::{IdentityEntry, RecordDocument, WeightRecord};
use weight_tracker_core::ports::{IdentityDirectory, PortError, PortResult, RecordStore};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Record ids are UUIDs; anything else cannot name a stored record.
fn parse_record_id(id: &str) -> PortResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| PortError::NotFound(format!("Record {}", id)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct DocumentRow {
    id: Uuid,
    document: Json<RecordDocument>,
}
impl DocumentRow {
    fn to_domain(self) -> PortResult<WeightRecord> {
        WeightRecord::from_document(Some(self.id.to_string()), self.document.0)
            .map_err(|e| PortError::Unexpected(format!("Stored record {} is invalid: {}", self.id, e)))
    }
}

#[derive(FromRow)]
struct IdentityRow {
    identity: String,
    password_hash: String,
    salt: String,
    registered_at: String,
}
impl IdentityRow {
    fn to_domain(self) -> PortResult<(String, IdentityEntry)> {
        let registered_at = DateTime::parse_from_rfc3339(&self.registered_at).map_err(|e| {
            PortError::Unexpected(format!("Identity {} has a bad registration time: {}", self.identity, e))
        })?;
        Ok((
            self.identity,
            IdentityEntry {
                password_hash: self.password_hash,
                salt: self.salt,
                registered_at,
            },
        ))
    }
}

//=========================================================================================
// `RecordStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecordStore for DbAdapter {
    async fn create(&self, user_key: &str, record: &WeightRecord) -> PortResult<String> {
        let id = Uuid::new_v4();
        let mut document = record.to_document();
        document.edited = false;

        sqlx::query("INSERT INTO weight_records (id, user_key, document) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(user_key)
            .bind(Json(document))
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(id.to_string())
    }

    async fn read_all(&self, user_key: &str) -> PortResult<Vec<WeightRecord>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, document FROM weight_records WHERE user_key = $1 ORDER BY seq ASC",
        )
        .bind(user_key)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn update(&self, user_key: &str, id: &str, record: &WeightRecord) -> PortResult<()> {
        let record_id = parse_record_id(id)?;
        let mut document = record.to_document();
        document.edited = true;

        let result = sqlx::query(
            "UPDATE weight_records SET document = $1 WHERE id = $2 AND user_key = $3",
        )
        .bind(Json(document))
        .bind(record_id)
        .bind(user_key)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Record {}", id)));
        }
        Ok(())
    }

    async fn delete(&self, user_key: &str, id: &str) -> PortResult<()> {
        let record_id = parse_record_id(id)?;
        let result = sqlx::query("DELETE FROM weight_records WHERE id = $1 AND user_key = $2")
            .bind(record_id)
            .bind(user_key)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Record {}", id)));
        }
        Ok(())
    }
}

//=========================================================================================
// `IdentityDirectory` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityDirectory for DbAdapter {
    async fn read_all_identities(&self) -> PortResult<BTreeMap<String, IdentityEntry>> {
        let rows = sqlx::query_as::<_, IdentityRow>(
            "SELECT identity, password_hash, salt, registered_at FROM identities",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn find_identity(&self, identity: &str) -> PortResult<Option<IdentityEntry>> {
        let row = sqlx::query_as::<_, IdentityRow>(
            "SELECT identity, password_hash, salt, registered_at FROM identities WHERE identity = $1",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        row.map(|r| r.to_domain().map(|(_, entry)| entry)).transpose()
    }

    async fn create_identity_if_absent(
        &self,
        identity: &str,
        entry: &IdentityEntry,
    ) -> PortResult<bool> {
        let result = sqlx::query(
            "INSERT INTO identities (identity, password_hash, salt, registered_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (identity) DO NOTHING",
        )
        .bind(identity)
        .bind(&entry.password_hash)
        .bind(&entry.salt)
        .bind(entry.registered_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(result.rows_affected() == 1)
    }
}
