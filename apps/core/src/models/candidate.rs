use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CoreError;

/// An externally discovered job posting under consideration.
/// Immutable once fetched; owned by the caller for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCandidate {
    pub id: Uuid,
    /// Canonical source URL as scraped (normalization happens in dedup).
    pub url: String,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub description: String,
    /// Portal/source identifier, e.g. "linkedin", "indeed", "custom".
    pub source: String,
    pub discovered_at: DateTime<Utc>,
}

impl JobCandidate {
    /// Rejects malformed candidates before any resource is consumed.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.url.trim().is_empty() {
            return Err(CoreError::Validation("candidate url is empty".into()));
        }
        if self.title.trim().is_empty() {
            return Err(CoreError::Validation("candidate title is empty".into()));
        }
        if self.company.trim().is_empty() {
            return Err(CoreError::Validation("candidate company is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> JobCandidate {
        JobCandidate {
            id: Uuid::new_v4(),
            url: "https://example.com/jobs/1".into(),
            title: "Backend Engineer".into(),
            company: "Acme".into(),
            location: None,
            description: "Build services".into(),
            source: "linkedin".into(),
            discovered_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_candidate_passes() {
        assert!(candidate().validate().is_ok());
    }

    #[test]
    fn test_blank_fields_rejected() {
        for field in ["url", "title", "company"] {
            let mut c = candidate();
            match field {
                "url" => c.url = "  ".into(),
                "title" => c.title = String::new(),
                _ => c.company = String::new(),
            }
            assert!(
                matches!(c.validate(), Err(CoreError::Validation(_))),
                "expected validation error for blank {field}"
            );
        }
    }
}
