use std::time::Duration;

use anyhow::{Context, Result};

use crate::dedup::DedupPolicy;

/// Core configuration loaded from environment variables.
/// Required variables fail fast at startup; tunables carry defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Endpoint of the document-generation model service.
    pub document_model_url: String,
    /// Endpoint of the relevance-scoring model service.
    pub scoring_model_url: String,
    /// Endpoint of the application-filling model service.
    pub filler_model_url: String,
    /// Per-request deadline for slot-manager submissions (queue wait + load + inference).
    pub model_timeout: Duration,
    pub title_similarity_threshold: f64,
    pub content_similarity_threshold: f64,
    pub dedup_lookback_days: i64,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            document_model_url: require_env("DOCUMENT_MODEL_URL")?,
            scoring_model_url: require_env("SCORING_MODEL_URL")?,
            filler_model_url: require_env("FILLER_MODEL_URL")?,
            model_timeout: Duration::from_secs(
                env_or("MODEL_TIMEOUT_SECS", "120")
                    .parse::<u64>()
                    .context("MODEL_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            title_similarity_threshold: env_or("DUPLICATE_TITLE_THRESHOLD", "0.75")
                .parse::<f64>()
                .context("DUPLICATE_TITLE_THRESHOLD must be a number in [0,1]")?,
            content_similarity_threshold: env_or("DUPLICATE_CONTENT_THRESHOLD", "0.85")
                .parse::<f64>()
                .context("DUPLICATE_CONTENT_THRESHOLD must be a number in [0,1]")?,
            dedup_lookback_days: env_or("DEDUP_LOOKBACK_DAYS", "30")
                .parse::<i64>()
                .context("DEDUP_LOOKBACK_DAYS must be a whole number of days")?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }

    pub fn dedup_policy(&self) -> DedupPolicy {
        DedupPolicy {
            title_similarity_threshold: self.title_similarity_threshold,
            content_similarity_threshold: self.content_similarity_threshold,
            lookback_days: self.dedup_lookback_days,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
