//! Model Slot Manager — mutually-exclusive, queued access to the single
//! shared inference slot. The host cannot hold all three models in memory
//! at once, so every inference call in the system funnels through here.

pub mod backend;
pub mod manager;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::candidate::JobCandidate;

/// The three inference capabilities. Each maps to one model service
/// (document generation, relevance scoring, application filling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    GenerateDocument,
    ScoreRelevance,
    FillApplication,
}

/// Fixed iteration order for queue scans. Not a fairness guarantee — a role
/// with a long backlog can starve the others, an accepted tradeoff of the
/// sequential-only hardware constraint.
pub const ALL_ROLES: [ModelRole; 3] = [
    ModelRole::GenerateDocument,
    ModelRole::ScoreRelevance,
    ModelRole::FillApplication,
];

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRole::GenerateDocument => f.write_str("generate_document"),
            ModelRole::ScoreRelevance => f.write_str("score_relevance"),
            ModelRole::FillApplication => f.write_str("fill_application"),
        }
    }
}

/// Per-role lifecycle. Global invariant: at most one role is `Ready` or
/// `Busy` at any instant; all others are `Unloaded` (or `Failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Unloaded,
    Loading,
    Ready,
    Busy,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Resume,
    CoverLetter,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Resume => f.write_str("resume"),
            DocumentKind::CoverLetter => f.write_str("cover_letter"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub kind: DocumentKind,
    pub candidate: JobCandidate,
    /// Opaque user profile payload passed through to the model service.
    pub profile: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub candidate: JobCandidate,
    pub profile: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillRequest {
    pub candidate: JobCandidate,
    pub documents: Vec<GeneratedDocument>,
    /// Custom answers for portal-specific questions.
    pub answers: serde_json::Value,
}

/// Tagged union over the three model roles. Owned by the slot manager for
/// the request's lifetime; never shared across concurrent callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", content = "payload", rename_all = "snake_case")]
pub enum ModelRequest {
    GenerateDocument(DocumentRequest),
    ScoreRelevance(ScoreRequest),
    FillApplication(FillRequest),
}

impl ModelRequest {
    pub fn role(&self) -> ModelRole {
        match self {
            ModelRequest::GenerateDocument(_) => ModelRole::GenerateDocument,
            ModelRequest::ScoreRelevance(_) => ModelRole::ScoreRelevance,
            ModelRequest::FillApplication(_) => ModelRole::FillApplication,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub id: Uuid,
    pub kind: DocumentKind,
    pub content: String,
    /// Which model produced it, for traceability.
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceScore {
    /// Overall fit in [0, 1].
    pub score: f64,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilledApplication {
    pub submitted: bool,
    pub reference_number: Option<String>,
    pub tracking_url: Option<String>,
    pub fields_filled: u32,
}

/// Role-specific result mirroring [`ModelRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", content = "payload", rename_all = "snake_case")]
pub enum ModelResult {
    GenerateDocument(GeneratedDocument),
    ScoreRelevance(RelevanceScore),
    FillApplication(FilledApplication),
}

impl ModelResult {
    pub fn role(&self) -> ModelRole {
        match self {
            ModelResult::GenerateDocument(_) => ModelRole::GenerateDocument,
            ModelResult::ScoreRelevance(_) => ModelRole::ScoreRelevance,
            ModelResult::FillApplication(_) => ModelRole::FillApplication,
        }
    }

    pub fn into_document(self) -> Option<GeneratedDocument> {
        match self {
            ModelResult::GenerateDocument(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn into_relevance(self) -> Option<RelevanceScore> {
        match self {
            ModelResult::ScoreRelevance(score) => Some(score),
            _ => None,
        }
    }

    pub fn into_filled(self) -> Option<FilledApplication> {
        match self {
            ModelResult::FillApplication(filled) => Some(filled),
            _ => None,
        }
    }
}
