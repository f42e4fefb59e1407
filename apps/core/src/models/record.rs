use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::candidate::JobCandidate;
use crate::similarity::normalize_url;

/// Lifecycle of an application record. Forward-only: no component may
/// revert a terminal status, and the store rejects backward moves.
///
/// `Discovered`..`Scored` are logical pipeline stages; a record is first
/// persisted at `DocumentsGenerated`, so earlier states never reach storage.
/// `Applied` advances externally (interview/offer/rejected/withdrawn) —
/// the store accepts those transitions but nothing in this core drives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Discovered,
    DuplicateChecked,
    Scored,
    DocumentsGenerated,
    Submitted,
    Applied,
    Failed,
    Interviewing,
    OfferReceived,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Failed
                | ApplicationStatus::OfferReceived
                | ApplicationStatus::Rejected
                | ApplicationStatus::Withdrawn
        )
    }

    /// Whether `self -> next` is a legal forward move.
    pub fn can_transition(self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        match (self, next) {
            (Discovered, DuplicateChecked) => true,
            (DuplicateChecked, Scored) => true,
            (Scored, DocumentsGenerated) => true,
            (DocumentsGenerated, Submitted) => true,
            (Submitted, Applied) | (Submitted, Failed) => true,
            // Post-applied statuses are driven outside this core.
            (Applied, Interviewing)
            | (Applied, OfferReceived)
            | (Applied, Rejected)
            | (Applied, Withdrawn) => true,
            (Interviewing, OfferReceived)
            | (Interviewing, Rejected)
            | (Interviewing, Withdrawn) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplicationStatus::Discovered => "discovered",
            ApplicationStatus::DuplicateChecked => "duplicate_checked",
            ApplicationStatus::Scored => "scored",
            ApplicationStatus::DocumentsGenerated => "documents_generated",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::Failed => "failed",
            ApplicationStatus::Interviewing => "interviewing",
            ApplicationStatus::OfferReceived => "offer_received",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        };
        f.write_str(s)
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(ApplicationStatus::Discovered),
            "duplicate_checked" => Ok(ApplicationStatus::DuplicateChecked),
            "scored" => Ok(ApplicationStatus::Scored),
            "documents_generated" => Ok(ApplicationStatus::DocumentsGenerated),
            "submitted" => Ok(ApplicationStatus::Submitted),
            "applied" => Ok(ApplicationStatus::Applied),
            "failed" => Ok(ApplicationStatus::Failed),
            "interviewing" => Ok(ApplicationStatus::Interviewing),
            "offer_received" => Ok(ApplicationStatus::OfferReceived),
            "rejected" => Ok(ApplicationStatus::Rejected),
            "withdrawn" => Ok(ApplicationStatus::Withdrawn),
            other => Err(format!("unknown application status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMethod {
    Automated,
    Manual,
}

impl fmt::Display for SubmissionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionMethod::Automated => f.write_str("automated"),
            SubmissionMethod::Manual => f.write_str("manual"),
        }
    }
}

impl FromStr for SubmissionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automated" => Ok(SubmissionMethod::Automated),
            "manual" => Ok(SubmissionMethod::Manual),
            other => Err(format!("unknown submission method '{other}'")),
        }
    }
}

/// The durable unit: one record per decision to apply to a job.
/// Never deleted, only status-transitioned. Owned exclusively by the
/// history store; other components read it through accessor calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub candidate_id: Uuid,
    pub job_url: String,
    /// Canonical form of `job_url` (see `similarity::normalize_url`),
    /// computed once at creation and used for exact-duplicate checks.
    pub canonical_url: String,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub description: String,
    pub source: String,
    pub status: ApplicationStatus,
    pub method: SubmissionMethod,
    /// Null until scored.
    pub relevance_score: Option<f64>,
    /// References to generated documents (resume, cover letter) held by
    /// the outer document layer.
    pub document_ids: Vec<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRecord {
    /// Snapshot of a candidate at the moment documents were generated.
    pub fn from_candidate(
        user_id: Uuid,
        candidate: &JobCandidate,
        method: SubmissionMethod,
        relevance_score: f64,
        document_ids: Vec<Uuid>,
    ) -> Self {
        let now = Utc::now();
        ApplicationRecord {
            id: Uuid::new_v4(),
            user_id,
            candidate_id: candidate.id,
            job_url: candidate.url.clone(),
            canonical_url: normalize_url(&candidate.url),
            title: candidate.title.clone(),
            company: candidate.company.clone(),
            location: candidate.location.clone(),
            description: candidate.description.clone(),
            source: candidate.source.clone(),
            status: ApplicationStatus::DocumentsGenerated,
            method,
            relevance_score: Some(relevance_score),
            document_ids,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}
