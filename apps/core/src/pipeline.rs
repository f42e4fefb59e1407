//! Job Pipeline Coordinator — drives one candidate through dedup check,
//! relevance scoring, document generation, submission, and history
//! recording, in that order. Stateless between calls: every invocation
//! reads fresh history and model state, so concurrent submissions for
//! different candidates interleave safely at the slot-manager queue.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dedup::{DedupEngine, DedupPolicy, DuplicateVerdict};
use crate::errors::CoreError;
use crate::history::HistoryStore;
use crate::models::candidate::JobCandidate;
use crate::models::record::{ApplicationRecord, ApplicationStatus, SubmissionMethod};
use crate::slot::manager::SlotManager;
use crate::slot::{
    DocumentKind, DocumentRequest, FillRequest, FilledApplication, GeneratedDocument,
    ModelRequest, RelevanceScore, ScoreRequest,
};

/// Per-submission knobs. Defaults match the unattended automation path.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Proceed even when the dedup check reports a duplicate. The verdict
    /// is still recorded in the application notes.
    pub override_duplicate: bool,
    pub method: SubmissionMethod,
    /// Custom answers for portal-specific questions, passed through to the
    /// application-filling model.
    pub answers: Value,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            override_duplicate: false,
            method: SubmissionMethod::Automated,
            answers: Value::Null,
        }
    }
}

/// Terminal result of a submission attempt. Failures after a record exists
/// are reported here rather than as errors, because the record persists and
/// the caller may want it.
#[derive(Debug)]
pub enum PipelineOutcome {
    Applied(ApplicationRecord),
    /// Stopped before any model work; nothing was persisted.
    Duplicate(DuplicateVerdict),
    /// Submission failed after the record was created. The record is left
    /// in `Failed` with the reason appended to its notes.
    Failed {
        record: ApplicationRecord,
        reason: String,
    },
}

pub struct PipelineCoordinator {
    history: Arc<dyn HistoryStore>,
    slots: SlotManager,
    dedup: DedupEngine,
    model_timeout: Duration,
}

impl PipelineCoordinator {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        slots: SlotManager,
        policy: DedupPolicy,
        model_timeout: Duration,
    ) -> Self {
        Self {
            history,
            slots,
            dedup: DedupEngine::new(policy),
            model_timeout,
        }
    }

    /// Dedup preview without side effects, for callers that want to show
    /// the verdict before committing to a submission.
    pub async fn check_duplicate(
        &self,
        user_id: Uuid,
        candidate: &JobCandidate,
    ) -> Result<DuplicateVerdict, CoreError> {
        self.dedup
            .check(user_id, candidate, self.history.as_ref())
            .await
    }

    /// Runs the full application pipeline for one candidate.
    ///
    /// Stage order is fixed: dedup, scoring, document generation, record
    /// creation, submission. A failure before the record is created
    /// propagates as an error and leaves no trace in history; a failure
    /// after creation resolves to [`PipelineOutcome::Failed`] with the
    /// record moved to `Failed`. A duplicate verdict stops the pipeline
    /// before any model work unless `override_duplicate` is set.
    pub async fn submit_candidate(
        &self,
        user_id: Uuid,
        candidate: JobCandidate,
        profile: Value,
        options: SubmitOptions,
    ) -> Result<PipelineOutcome, CoreError> {
        candidate.validate()?;

        // Dedup fails closed: a history error here aborts the submission.
        let verdict = self.check_duplicate(user_id, &candidate).await?;
        if verdict.is_duplicate && !options.override_duplicate {
            info!(
                url = %candidate.url,
                score = verdict.score,
                "duplicate candidate, skipping"
            );
            return Ok(PipelineOutcome::Duplicate(verdict));
        }

        let relevance = self.score(&candidate, &profile).await?;
        info!(url = %candidate.url, score = relevance.score, "candidate scored");

        let resume = self
            .generate_document(DocumentKind::Resume, &candidate, &profile)
            .await?;
        let cover_letter = self
            .generate_document(DocumentKind::CoverLetter, &candidate, &profile)
            .await?;

        let record = ApplicationRecord::from_candidate(
            user_id,
            &candidate,
            options.method,
            relevance.score,
            vec![resume.id, cover_letter.id],
        );
        self.history.insert(&record).await?;
        if verdict.is_duplicate {
            self.history
                .append_note(
                    record.id,
                    &format!(
                        "duplicate check overridden (score {:.2}: {})",
                        verdict.score,
                        verdict.reasons.join(", ")
                    ),
                )
                .await?;
        }

        let record = self
            .history
            .transition(record.id, ApplicationStatus::Submitted)
            .await?;

        match self
            .fill_application(&candidate, vec![resume, cover_letter], &options)
            .await
        {
            Ok(filled) if filled.submitted => {
                let record = self
                    .history
                    .transition(record.id, ApplicationStatus::Applied)
                    .await?;
                if let Some(reference) = &filled.reference_number {
                    self.history
                        .append_note(record.id, &format!("portal reference {reference}"))
                        .await?;
                }
                info!(record = %record.id, url = %record.job_url, "application submitted");
                Ok(PipelineOutcome::Applied(record))
            }
            Ok(_) => {
                self.fail(record, "portal did not confirm the submission".to_string())
                    .await
            }
            Err(e) => self.fail(record, e.to_string()).await,
        }
    }

    /// Moves `record` to `Failed` and records why. The record itself is the
    /// durable trace of the attempt, so this path returns `Ok`.
    async fn fail(
        &self,
        record: ApplicationRecord,
        reason: String,
    ) -> Result<PipelineOutcome, CoreError> {
        warn!(record = %record.id, %reason, "submission failed");
        let record = self
            .history
            .transition(record.id, ApplicationStatus::Failed)
            .await?;
        self.history
            .append_note(record.id, &format!("submission failed: {reason}"))
            .await?;
        Ok(PipelineOutcome::Failed { record, reason })
    }

    async fn score(
        &self,
        candidate: &JobCandidate,
        profile: &Value,
    ) -> Result<RelevanceScore, CoreError> {
        let request = ModelRequest::ScoreRelevance(ScoreRequest {
            candidate: candidate.clone(),
            profile: profile.clone(),
        });
        self.slots
            .submit(request, self.model_timeout)
            .await?
            .into_relevance()
            .ok_or_else(|| mismatched_result("relevance score"))
    }

    async fn generate_document(
        &self,
        kind: DocumentKind,
        candidate: &JobCandidate,
        profile: &Value,
    ) -> Result<GeneratedDocument, CoreError> {
        let request = ModelRequest::GenerateDocument(DocumentRequest {
            kind,
            candidate: candidate.clone(),
            profile: profile.clone(),
        });
        self.slots
            .submit(request, self.model_timeout)
            .await?
            .into_document()
            .ok_or_else(|| mismatched_result("generated document"))
    }

    async fn fill_application(
        &self,
        candidate: &JobCandidate,
        documents: Vec<GeneratedDocument>,
        options: &SubmitOptions,
    ) -> Result<FilledApplication, CoreError> {
        let request = ModelRequest::FillApplication(FillRequest {
            candidate: candidate.clone(),
            documents,
            answers: options.answers.clone(),
        });
        self.slots
            .submit(request, self.model_timeout)
            .await?
            .into_filled()
            .ok_or_else(|| mismatched_result("filled application"))
    }
}

fn mismatched_result(expected: &str) -> CoreError {
    CoreError::Internal(anyhow!("model returned a result of the wrong kind, expected {expected}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::memory::InMemoryHistoryStore;
    use crate::slot::backend::{BackendError, ModelBackend};
    use crate::slot::{ModelResult, ModelRole, ModelStatus};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Store whose every call fails, for the fail-closed path.
    struct UnavailableStore;

    #[async_trait]
    impl HistoryStore for UnavailableStore {
        async fn insert(&self, _record: &ApplicationRecord) -> Result<(), CoreError> {
            Err(CoreError::History("history store offline".into()))
        }

        async fn get(&self, _id: Uuid) -> Result<Option<ApplicationRecord>, CoreError> {
            Err(CoreError::History("history store offline".into()))
        }

        async fn transition(
            &self,
            _id: Uuid,
            _next: ApplicationStatus,
        ) -> Result<ApplicationRecord, CoreError> {
            Err(CoreError::History("history store offline".into()))
        }

        async fn append_note(&self, _id: Uuid, _note: &str) -> Result<(), CoreError> {
            Err(CoreError::History("history store offline".into()))
        }

        async fn find_by_canonical_url(
            &self,
            _user_id: Uuid,
            _canonical_url: &str,
        ) -> Result<Option<ApplicationRecord>, CoreError> {
            Err(CoreError::History("history store offline".into()))
        }

        async fn applied_since(
            &self,
            _user_id: Uuid,
            _since: DateTime<Utc>,
        ) -> Result<Vec<ApplicationRecord>, CoreError> {
            Err(CoreError::History("history store offline".into()))
        }
    }

    struct ScriptedBackend {
        fail_infer: Mutex<HashSet<ModelRole>>,
        confirm_submission: bool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fail_infer: Mutex::new(HashSet::new()),
                confirm_submission: true,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn unconfirmed() -> Arc<Self> {
            Arc::new(Self {
                fail_infer: Mutex::new(HashSet::new()),
                confirm_submission: false,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(role: ModelRole) -> Arc<Self> {
            let backend = Self::new();
            backend.fail_infer.lock().unwrap().insert(role);
            backend
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        async fn load(&self, _role: ModelRole) -> Result<(), BackendError> {
            Ok(())
        }

        async fn unload(&self, _role: ModelRole) -> Result<(), BackendError> {
            Ok(())
        }

        async fn infer(&self, request: &ModelRequest) -> Result<ModelResult, BackendError> {
            let role = request.role();
            self.calls.lock().unwrap().push(role.to_string());

            if self.fail_infer.lock().unwrap().contains(&role) {
                return Err(BackendError::Api {
                    status: 500,
                    message: format!("{role} exploded"),
                });
            }

            Ok(match request {
                ModelRequest::GenerateDocument(r) => {
                    ModelResult::GenerateDocument(GeneratedDocument {
                        id: Uuid::new_v4(),
                        kind: r.kind,
                        content: format!("{} for {}", r.kind, r.candidate.title),
                        model: "scripted".into(),
                    })
                }
                ModelRequest::ScoreRelevance(_) => ModelResult::ScoreRelevance(RelevanceScore {
                    score: 0.87,
                    matched_skills: vec!["rust".into(), "postgres".into()],
                    missing_skills: vec!["kubernetes".into()],
                    summary: "solid match".into(),
                }),
                ModelRequest::FillApplication(_) => {
                    ModelResult::FillApplication(FilledApplication {
                        submitted: self.confirm_submission,
                        reference_number: self
                            .confirm_submission
                            .then(|| "APP-2024-001".to_string()),
                        tracking_url: None,
                        fields_filled: 12,
                    })
                }
            })
        }
    }

    fn candidate(url: &str, title: &str, company: &str) -> JobCandidate {
        JobCandidate {
            id: Uuid::new_v4(),
            url: url.into(),
            title: title.into(),
            company: company.into(),
            location: Some("Remote".into()),
            description: "Own the payments platform".into(),
            source: "linkedin".into(),
            discovered_at: Utc::now(),
        }
    }

    fn coordinator(
        backend: Arc<dyn ModelBackend>,
        history: Arc<InMemoryHistoryStore>,
    ) -> PipelineCoordinator {
        PipelineCoordinator::new(
            history,
            SlotManager::new(backend),
            DedupPolicy::default(),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_full_pipeline_ends_applied() {
        let backend = ScriptedBackend::new();
        let history = Arc::new(InMemoryHistoryStore::new());
        let pipeline = coordinator(backend.clone(), history.clone());
        let user = Uuid::new_v4();

        let outcome = pipeline
            .submit_candidate(
                user,
                candidate("https://x.com/job/1", "Backend Engineer", "Acme"),
                serde_json::json!({"name": "Ada"}),
                SubmitOptions::default(),
            )
            .await
            .unwrap();

        let PipelineOutcome::Applied(record) = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        assert_eq!(record.status, ApplicationStatus::Applied);
        assert_eq!(record.relevance_score, Some(0.87));
        assert_eq!(record.document_ids.len(), 2);

        let stored = history.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ApplicationStatus::Applied);
        assert!(stored.notes.unwrap().contains("APP-2024-001"));

        // score, resume, cover letter, fill
        assert_eq!(
            backend.calls(),
            vec![
                "score_relevance",
                "generate_document",
                "generate_document",
                "fill_application"
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_stops_before_any_model_work() {
        let backend = ScriptedBackend::new();
        let history = Arc::new(InMemoryHistoryStore::new());
        let pipeline = coordinator(backend.clone(), history.clone());
        let user = Uuid::new_v4();

        pipeline
            .submit_candidate(
                user,
                candidate("https://x.com/job/1", "Backend Engineer", "Acme"),
                Value::Null,
                SubmitOptions::default(),
            )
            .await
            .unwrap();
        let calls_after_first = backend.calls().len();

        // Same posting again, URL differs only by tracking params.
        let outcome = pipeline
            .submit_candidate(
                user,
                candidate(
                    "https://x.com/job/1?utm_source=email",
                    "Backend Engineer",
                    "Acme",
                ),
                Value::Null,
                SubmitOptions::default(),
            )
            .await
            .unwrap();

        let PipelineOutcome::Duplicate(verdict) = outcome else {
            panic!("expected Duplicate, got {outcome:?}");
        };
        assert_eq!(verdict.score, 1.0);
        assert_eq!(verdict.reasons, vec!["url_exact_match"]);
        assert_eq!(
            backend.calls().len(),
            calls_after_first,
            "no model call may be spent on a duplicate"
        );
    }

    #[tokio::test]
    async fn test_override_applies_despite_duplicate_and_notes_it() {
        let backend = ScriptedBackend::new();
        let history = Arc::new(InMemoryHistoryStore::new());
        let pipeline = coordinator(backend, history.clone());
        let user = Uuid::new_v4();

        pipeline
            .submit_candidate(
                user,
                candidate("https://x.com/job/1", "Backend Engineer", "Acme"),
                Value::Null,
                SubmitOptions::default(),
            )
            .await
            .unwrap();

        let outcome = pipeline
            .submit_candidate(
                user,
                candidate("https://x.com/job/1", "Backend Engineer", "Acme"),
                Value::Null,
                SubmitOptions {
                    override_duplicate: true,
                    ..SubmitOptions::default()
                },
            )
            .await
            .unwrap();

        let PipelineOutcome::Applied(record) = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        let stored = history.get(record.id).await.unwrap().unwrap();
        assert!(stored
            .notes
            .unwrap()
            .contains("duplicate check overridden"));
    }

    #[tokio::test]
    async fn test_history_failure_aborts_before_any_model_call() {
        let backend = ScriptedBackend::new();
        let pipeline = PipelineCoordinator::new(
            Arc::new(UnavailableStore),
            SlotManager::new(backend.clone()),
            DedupPolicy::default(),
            Duration::from_secs(30),
        );

        let err = pipeline
            .submit_candidate(
                Uuid::new_v4(),
                candidate("https://x.com/job/1", "Backend Engineer", "Acme"),
                Value::Null,
                SubmitOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::History(_)), "got {err:?}");
        assert!(
            backend.calls().is_empty(),
            "dedup must fail closed before any inference is spent"
        );
    }

    #[tokio::test]
    async fn test_scoring_failure_leaves_no_record() {
        let backend = ScriptedBackend::failing(ModelRole::ScoreRelevance);
        let history = Arc::new(InMemoryHistoryStore::new());
        let pipeline = coordinator(backend, history.clone());
        let user = Uuid::new_v4();

        let err = pipeline
            .submit_candidate(
                user,
                candidate("https://x.com/job/1", "Backend Engineer", "Acme"),
                Value::Null,
                SubmitOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Inference { .. }), "got {err:?}");
        let records = history
            .applied_since(user, Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert!(records.is_empty(), "no record before documents exist");
    }

    #[tokio::test]
    async fn test_fill_failure_records_failed_with_reason() {
        let backend = ScriptedBackend::failing(ModelRole::FillApplication);
        let history = Arc::new(InMemoryHistoryStore::new());
        let pipeline = coordinator(backend, history.clone());
        let user = Uuid::new_v4();

        let outcome = pipeline
            .submit_candidate(
                user,
                candidate("https://x.com/job/1", "Backend Engineer", "Acme"),
                Value::Null,
                SubmitOptions::default(),
            )
            .await
            .unwrap();

        let PipelineOutcome::Failed { record, reason } = outcome else {
            panic!("expected Failed, got {outcome:?}");
        };
        assert_eq!(record.status, ApplicationStatus::Failed);
        assert!(reason.contains("fill_application"));

        let stored = history.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ApplicationStatus::Failed);
        assert!(stored.notes.unwrap().contains("submission failed"));
    }

    #[tokio::test]
    async fn test_unconfirmed_submission_is_failure() {
        let backend = ScriptedBackend::unconfirmed();
        let history = Arc::new(InMemoryHistoryStore::new());
        let pipeline = coordinator(backend, history);
        let user = Uuid::new_v4();

        let outcome = pipeline
            .submit_candidate(
                user,
                candidate("https://x.com/job/1", "Backend Engineer", "Acme"),
                Value::Null,
                SubmitOptions::default(),
            )
            .await
            .unwrap();

        let PipelineOutcome::Failed { record, reason } = outcome else {
            panic!("expected Failed, got {outcome:?}");
        };
        assert_eq!(record.status, ApplicationStatus::Failed);
        assert!(reason.contains("did not confirm"));
    }

    #[tokio::test]
    async fn test_invalid_candidate_rejected_up_front() {
        let backend = ScriptedBackend::new();
        let history = Arc::new(InMemoryHistoryStore::new());
        let pipeline = coordinator(backend.clone(), history);

        let mut bad = candidate("https://x.com/job/1", "Backend Engineer", "Acme");
        bad.title = "  ".into();

        let err = pipeline
            .submit_candidate(Uuid::new_v4(), bad, Value::Null, SubmitOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_record_blocks_nothing_but_still_dedups_by_url() {
        // A Failed record still counts for exact-URL dedup: the attempt
        // happened and a human should decide before re-applying.
        let backend = ScriptedBackend::failing(ModelRole::FillApplication);
        let history = Arc::new(InMemoryHistoryStore::new());
        let pipeline = coordinator(backend, history.clone());
        let user = Uuid::new_v4();

        pipeline
            .submit_candidate(
                user,
                candidate("https://x.com/job/1", "Backend Engineer", "Acme"),
                Value::Null,
                SubmitOptions::default(),
            )
            .await
            .unwrap();

        let verdict = pipeline
            .check_duplicate(
                user,
                &candidate("https://x.com/job/1", "Backend Engineer", "Acme"),
            )
            .await
            .unwrap();
        assert!(verdict.is_duplicate);
        assert_eq!(verdict.matched.unwrap().status, ApplicationStatus::Failed);
    }

    #[tokio::test]
    async fn test_pipeline_leaves_filler_resident_after_run() {
        let backend = ScriptedBackend::new();
        let history = Arc::new(InMemoryHistoryStore::new());
        let pipeline = coordinator(backend, history);

        pipeline
            .submit_candidate(
                Uuid::new_v4(),
                candidate("https://x.com/job/1", "Backend Engineer", "Acme"),
                Value::Null,
                SubmitOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(
            pipeline.slots.status(ModelRole::FillApplication),
            ModelStatus::Ready
        );
        assert_eq!(
            pipeline.slots.resident(),
            Some(ModelRole::FillApplication)
        );
    }
}
