//! Postgres-backed history store.
//!
//! Runtime queries with row structs converted to domain types; status
//! transitions take a row lock so concurrent writers to the same record
//! serialize, while independent records proceed in parallel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::history::{append_note_text, HistoryStore};
use crate::models::record::{ApplicationRecord, ApplicationStatus, SubmissionMethod};

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ApplicationRow {
    id: Uuid,
    user_id: Uuid,
    candidate_id: Uuid,
    job_url: String,
    canonical_url: String,
    title: String,
    company: String,
    location: Option<String>,
    description: String,
    source: String,
    status: String,
    method: String,
    relevance_score: Option<f64>,
    document_ids: Vec<Uuid>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for ApplicationRecord {
    type Error = CoreError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        let status: ApplicationStatus = row.status.parse().map_err(CoreError::History)?;
        let method: SubmissionMethod = row.method.parse().map_err(CoreError::History)?;
        Ok(ApplicationRecord {
            id: row.id,
            user_id: row.user_id,
            candidate_id: row.candidate_id,
            job_url: row.job_url,
            canonical_url: row.canonical_url,
            title: row.title,
            company: row.company,
            location: row.location,
            description: row.description,
            source: row.source,
            status,
            method,
            relevance_score: row.relevance_score,
            document_ids: row.document_ids,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, user_id, candidate_id, job_url, canonical_url, title, company, \
     location, description, source, status, method, relevance_score, document_ids, notes, \
     created_at, updated_at";

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn insert(&self, record: &ApplicationRecord) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO application_records \
             (id, user_id, candidate_id, job_url, canonical_url, title, company, location, \
              description, source, status, method, relevance_score, document_ids, notes, \
              created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.candidate_id)
        .bind(&record.job_url)
        .bind(&record.canonical_url)
        .bind(&record.title)
        .bind(&record.company)
        .bind(&record.location)
        .bind(&record.description)
        .bind(&record.source)
        .bind(record.status.to_string())
        .bind(record.method.to_string())
        .bind(record.relevance_score)
        .bind(&record.document_ids)
        .bind(&record.notes)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ApplicationRecord>, CoreError> {
        let row: Option<ApplicationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM application_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ApplicationRecord::try_from).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        next: ApplicationStatus,
    ) -> Result<ApplicationRecord, CoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<ApplicationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM application_records WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let record: ApplicationRecord = row
            .ok_or_else(|| CoreError::History(format!("record {id} not found")))?
            .try_into()?;

        if !record.status.can_transition(next) {
            return Err(CoreError::InvalidTransition {
                from: record.status,
                to: next,
            });
        }

        let updated_at = Utc::now();
        sqlx::query("UPDATE application_records SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(next.to_string())
            .bind(updated_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ApplicationRecord {
            status: next,
            updated_at,
            ..record
        })
    }

    async fn append_note(&self, id: Uuid, note: &str) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<Option<String>> =
            sqlx::query_scalar("SELECT notes FROM application_records WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let existing =
            existing.ok_or_else(|| CoreError::History(format!("record {id} not found")))?;
        let combined = append_note_text(existing.as_deref(), note);

        sqlx::query("UPDATE application_records SET notes = $1, updated_at = $2 WHERE id = $3")
            .bind(combined)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_canonical_url(
        &self,
        user_id: Uuid,
        canonical_url: &str,
    ) -> Result<Option<ApplicationRecord>, CoreError> {
        let row: Option<ApplicationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM application_records \
             WHERE user_id = $1 AND canonical_url = $2 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(user_id)
        .bind(canonical_url)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ApplicationRecord::try_from).transpose()
    }

    async fn applied_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ApplicationRecord>, CoreError> {
        let rows: Vec<ApplicationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM application_records \
             WHERE user_id = $1 AND created_at >= $2 \
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ApplicationRecord::try_from).collect()
    }
}
