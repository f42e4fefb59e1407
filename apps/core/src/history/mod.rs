//! History Store — durable, append-friendly record of every application.
//!
//! The store is the only mutable shared state in the deduplication core:
//! reads may be concurrent, writes are append/transition-only. Status
//! changes go through [`HistoryStore::transition`], which enforces the
//! forward-only state machine; historical fields are never rewritten.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::record::{ApplicationRecord, ApplicationStatus};

/// Record-oriented storage for application records. Implementations must
/// serialize writes per record; independent records may be written
/// concurrently.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persists a new record. Fails if the id already exists.
    async fn insert(&self, record: &ApplicationRecord) -> Result<(), CoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<ApplicationRecord>, CoreError>;

    /// Moves a record to `next`, enforcing the state machine, and returns
    /// the updated record. A transition is not considered complete until
    /// the write is acknowledged.
    async fn transition(
        &self,
        id: Uuid,
        next: ApplicationStatus,
    ) -> Result<ApplicationRecord, CoreError>;

    /// Appends a timestamped free-text note without touching other fields.
    async fn append_note(&self, id: Uuid, note: &str) -> Result<(), CoreError>;

    /// Exact-duplicate lookup by canonical URL for one user.
    async fn find_by_canonical_url(
        &self,
        user_id: Uuid,
        canonical_url: &str,
    ) -> Result<Option<ApplicationRecord>, CoreError>;

    /// All of a user's records created at or after `since`, newest first.
    async fn applied_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ApplicationRecord>, CoreError>;
}

/// Formats a note the way every store appends it: newest entry last,
/// prefixed with a UTC timestamp.
pub(crate) fn append_note_text(existing: Option<&str>, note: &str) -> String {
    let stamped = format!("[{}] {note}", Utc::now().format("%Y-%m-%dT%H:%M:%SZ"));
    match existing {
        Some(prior) if !prior.is_empty() => format!("{prior}\n{stamped}"),
        _ => stamped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_appends_on_new_line() {
        let first = append_note_text(None, "scored 0.82");
        assert!(first.contains("scored 0.82"));
        assert!(!first.contains('\n'));

        let second = append_note_text(Some(&first), "submission failed");
        let lines: Vec<&str> = second.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("submission failed"));
    }
}
