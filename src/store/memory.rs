//! MemoryStore - map-backed record store for tests and local development.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use tokio::sync::RwLock;

use super::{Backend, RecordStore, StoreError};
use crate::record::{NewRecord, Record, RecordPatch};

/// In-memory record store.
///
/// Ids are ObjectId hex strings, so they sort in creation order and look
/// like MongoDB ids. Timestamps are tracked the way the MongoDB backend
/// tracks them. Clone-friendly via Arc; clones share records.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<BTreeMap<String, Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, record: NewRecord) -> Result<Record, StoreError> {
        let fields = record.validate()?;
        let now = Utc::now();
        let record = Record {
            id: ObjectId::new().to_hex(),
            kind: fields.kind,
            data: fields.data,
            metadata: fields.metadata,
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn list_by_type(&self, kind: Option<&str>) -> Result<Vec<Record>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| kind.is_none_or(|k| r.kind == k))
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update_by_id(&self, id: &str, patch: RecordPatch) -> Result<Option<Record>, StoreError> {
        let update = patch.validate()?;
        let mut records = self.records.write().await;
        Ok(records.get_mut(id).map(|record| {
            record.apply(&update);
            record.updated_at = Some(Utc::now());
            record.clone()
        }))
    }

    async fn delete_by_id(&self, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.records.write().await.remove(id))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> Option<Backend> {
        None
    }
}
