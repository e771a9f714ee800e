//! services/api/src/adapters/memory.rs
//!
//! A process-local implementation of the storage ports. Records go through the
//! same document serialization as the database adapter, so the two behave alike.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;
use weight_tracker_core::domain::{IdentityEntry, RecordDocument, WeightRecord};
use weight_tracker_core::ports::{IdentityDirectory, PortError, PortResult, RecordStore};

/// In-memory document store. Each user key maps to `(id, document)` pairs in
/// insertion order.
#[derive(Default)]
pub struct MemoryAdapter {
    records: RwLock<HashMap<String, Vec<(String, RecordDocument)>>>,
    identities: RwLock<BTreeMap<String, IdentityEntry>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryAdapter {
    async fn create(&self, user_key: &str, record: &WeightRecord) -> PortResult<String> {
        let id = Uuid::new_v4().to_string();
        let mut document = record.to_document();
        document.edited = false;

        self.records
            .write()
            .await
            .entry(user_key.to_string())
            .or_default()
            .push((id.clone(), document));
        Ok(id)
    }

    async fn read_all(&self, user_key: &str) -> PortResult<Vec<WeightRecord>> {
        let records = self.records.read().await;
        let Some(documents) = records.get(user_key) else {
            return Ok(Vec::new());
        };

        documents
            .iter()
            .map(|(id, document)| {
                WeightRecord::from_document(Some(id.clone()), document.clone()).map_err(|e| {
                    PortError::Unexpected(format!("Stored record {} is invalid: {}", id, e))
                })
            })
            .collect()
    }

    async fn update(&self, user_key: &str, id: &str, record: &WeightRecord) -> PortResult<()> {
        let mut records = self.records.write().await;
        let slot = records
            .get_mut(user_key)
            .and_then(|documents| documents.iter_mut().find(|(stored, _)| stored == id))
            .ok_or_else(|| PortError::NotFound(format!("Record {}", id)))?;

        let mut document = record.to_document();
        document.edited = true;
        slot.1 = document;
        Ok(())
    }

    async fn delete(&self, user_key: &str, id: &str) -> PortResult<()> {
        let mut records = self.records.write().await;
        let documents = records
            .get_mut(user_key)
            .ok_or_else(|| PortError::NotFound(format!("Record {}", id)))?;
        let position = documents
            .iter()
            .position(|(stored, _)| stored == id)
            .ok_or_else(|| PortError::NotFound(format!("Record {}", id)))?;
        documents.remove(position);
        Ok(())
    }
}

#[async_trait]
impl IdentityDirectory for MemoryAdapter {
    async fn read_all_identities(&self) -> PortResult<BTreeMap<String, IdentityEntry>> {
        Ok(self.identities.read().await.clone())
    }

    async fn find_identity(&self, identity: &str) -> PortResult<Option<IdentityEntry>> {
        Ok(self.identities.read().await.get(identity).cloned())
    }

    async fn create_identity_if_absent(
        &self,
        identity: &str,
        entry: &IdentityEntry,
    ) -> PortResult<bool> {
        let mut identities = self.identities.write().await;
        if identities.contains_key(identity) {
            return Ok(false);
        }
        identities.insert(identity.to_string(), entry.clone());
        Ok(true)
    }
}
