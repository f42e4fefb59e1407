//! Orchestration core for automated job applications.
//!
//! Serializes all LLM inference through a single model slot (the host can
//! hold one model at a time), refuses to apply twice to the same posting,
//! and keeps a durable, forward-only record of every application. The
//! pipeline coordinator wires the pieces together:
//!
//! ```text
//! candidate -> dedup check -> relevance scoring -> document generation
//!           -> history record -> application filling -> applied/failed
//! ```
//!
//! Model services, storage, and the user-facing surface live outside this
//! crate; it talks to them through [`slot::backend::ModelBackend`] and
//! [`history::HistoryStore`].

pub mod config;
pub mod dedup;
pub mod errors;
pub mod history;
pub mod models;
pub mod pipeline;
pub mod similarity;
pub mod slot;

pub use config::Config;
pub use dedup::{DedupEngine, DedupPolicy, DuplicateVerdict};
pub use errors::CoreError;
pub use history::HistoryStore;
pub use models::candidate::JobCandidate;
pub use models::record::{ApplicationRecord, ApplicationStatus, SubmissionMethod};
pub use pipeline::{PipelineCoordinator, PipelineOutcome, SubmitOptions};
pub use slot::manager::SlotManager;
pub use slot::{ModelRole, ModelStatus};
