//! In-memory history store used by tests and dedup previews.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::history::{append_note_text, HistoryStore};
use crate::models::record::{ApplicationRecord, ApplicationStatus};

/// RwLock-guarded map. The single write lock serializes writers per record
/// (and across records, which is stricter than required but harmless at
/// this scale); reads are concurrent.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    records: RwLock<HashMap<Uuid, ApplicationRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn insert(&self, record: &ApplicationRecord) -> Result<(), CoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(CoreError::History(format!(
                "record {} already exists",
                record.id
            )));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ApplicationRecord>, CoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        next: ApplicationStatus,
    ) -> Result<ApplicationRecord, CoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| CoreError::History(format!("record {id} not found")))?;

        if !record.status.can_transition(next) {
            return Err(CoreError::InvalidTransition {
                from: record.status,
                to: next,
            });
        }

        record.status = next;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn append_note(&self, id: Uuid, note: &str) -> Result<(), CoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| CoreError::History(format!("record {id} not found")))?;

        record.notes = Some(append_note_text(record.notes.as_deref(), note));
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn find_by_canonical_url(
        &self,
        user_id: Uuid,
        canonical_url: &str,
    ) -> Result<Option<ApplicationRecord>, CoreError> {
        // Newest record wins, same as the Postgres store's
        // ORDER BY created_at DESC LIMIT 1.
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id && r.canonical_url == canonical_url)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn applied_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ApplicationRecord>, CoreError> {
        let mut matches: Vec<ApplicationRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id && r.created_at >= since)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }
}
