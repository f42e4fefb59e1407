//! Deduplication Core — decides whether applying to a candidate would
//! duplicate a prior application, before any model work is spent on it.
//!
//! Read-only over the history store and deterministic for fixed inputs and
//! policy. A history failure propagates (fail closed): silently allowing a
//! possible re-application is worse than blocking progress.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::history::HistoryStore;
use crate::models::candidate::JobCandidate;
use crate::models::record::ApplicationRecord;
use crate::similarity::{company_match, normalize_url, text_similarity};

/// Thresholds and look-back window for fuzzy duplicate matching.
/// Swappable without touching orchestration code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupPolicy {
    pub title_similarity_threshold: f64,
    pub content_similarity_threshold: f64,
    pub lookback_days: i64,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            title_similarity_threshold: 0.75,
            content_similarity_threshold: 0.85,
            lookback_days: 30,
        }
    }
}

/// Transient outcome of a dedup check. Not persisted; consumed immediately
/// by the pipeline coordinator (or surfaced as a UI preview).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateVerdict {
    pub is_duplicate: bool,
    /// Confidence in [0, 1]. 1.0 for a canonical-URL match; for a fuzzy
    /// match, the maximum contributing similarity. Non-duplicates carry the
    /// best score observed, for preview purposes.
    pub score: f64,
    pub matched: Option<ApplicationRecord>,
    /// Contributing reasons, e.g. `url_exact_match`, `title_similarity:0.91`.
    pub reasons: Vec<String>,
}

impl DuplicateVerdict {
    fn not_duplicate(best_score: f64) -> Self {
        Self {
            is_duplicate: false,
            score: best_score,
            matched: None,
            reasons: Vec::new(),
        }
    }
}

pub struct DedupEngine {
    policy: DedupPolicy,
}

impl DedupEngine {
    pub fn new(policy: DedupPolicy) -> Self {
        Self { policy }
    }

    /// Classifies `candidate` against the user's application history.
    ///
    /// Order of checks:
    /// 1. canonical-URL equality — immediate duplicate at 1.0, short-circuits;
    /// 2. within the look-back window, company match AND (title OR content
    ///    similarity over threshold) — duplicate at the max contributing score.
    /// When several historical records match, the maximum-confidence match
    /// wins.
    pub async fn check(
        &self,
        user_id: Uuid,
        candidate: &JobCandidate,
        history: &dyn HistoryStore,
    ) -> Result<DuplicateVerdict, CoreError> {
        let canonical = normalize_url(&candidate.url);

        if let Some(record) = history.find_by_canonical_url(user_id, &canonical).await? {
            debug!(url = %candidate.url, record = %record.id, "exact URL duplicate");
            return Ok(DuplicateVerdict {
                is_duplicate: true,
                score: 1.0,
                matched: Some(record),
                reasons: vec!["url_exact_match".to_string()],
            });
        }

        let since = Utc::now() - Duration::days(self.policy.lookback_days);
        let recent = history.applied_since(user_id, since).await?;

        let mut best: Option<DuplicateVerdict> = None;
        let mut best_observed = 0.0_f64;

        for record in recent {
            if !company_match(&candidate.company, &record.company) {
                continue;
            }

            let title_sim = text_similarity(&candidate.title, &record.title);
            let content_sim = text_similarity(&candidate.description, &record.description);
            best_observed = best_observed.max(title_sim).max(content_sim);

            let title_hit = title_sim >= self.policy.title_similarity_threshold;
            let content_hit = content_sim >= self.policy.content_similarity_threshold;
            if !title_hit && !content_hit {
                continue;
            }

            let score = title_sim.max(content_sim);
            let mut reasons = vec!["company_match".to_string()];
            if title_hit {
                reasons.push(format!("title_similarity:{title_sim:.2}"));
            }
            if content_hit {
                reasons.push(format!("content_similarity:{content_sim:.2}"));
            }

            debug!(
                record = %record.id,
                score,
                "fuzzy duplicate candidate"
            );

            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(DuplicateVerdict {
                    is_duplicate: true,
                    score,
                    matched: Some(record),
                    reasons,
                });
            }
        }

        Ok(best.unwrap_or_else(|| DuplicateVerdict::not_duplicate(best_observed)))
    }
}
