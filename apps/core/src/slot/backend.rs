//! Model service backend — the slot manager's view of the three model
//! services. Each service is a black box that loads/unloads its model and
//! accepts a typed request, returning a typed result or a structured failure.
//!
//! ARCHITECTURAL RULE: no other module talks to the model services directly.
//! All inference goes through the slot manager, which owns a backend.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::slot::{
    FilledApplication, GeneratedDocument, ModelRequest, ModelResult, ModelRole, RelevanceScore,
};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Lifecycle and inference operations for one shared inference capacity.
/// `load`/`unload` are the expensive transitions the manager amortizes;
/// `infer` assumes the role's model is resident.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn load(&self, role: ModelRole) -> Result<(), BackendError>;

    async fn unload(&self, role: ModelRole) -> Result<(), BackendError>;

    async fn infer(&self, request: &ModelRequest) -> Result<ModelResult, BackendError>;
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    error: ServiceErrorBody,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    message: String,
}

/// HTTP backend over three per-role model service endpoints.
/// Each service exposes `POST /load`, `POST /unload`, and `POST /infer`.
pub struct HttpModelBackend {
    client: reqwest::Client,
    endpoints: HashMap<ModelRole, String>,
}

impl HttpModelBackend {
    pub fn new(endpoints: HashMap<ModelRole, String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            ModelRole::GenerateDocument,
            config.document_model_url.clone(),
        );
        endpoints.insert(ModelRole::ScoreRelevance, config.scoring_model_url.clone());
        endpoints.insert(ModelRole::FillApplication, config.filler_model_url.clone());
        Self::new(endpoints)
    }

    fn endpoint(&self, role: ModelRole) -> String {
        self.endpoints.get(&role).cloned().unwrap_or_default()
    }

    async fn post_lifecycle(&self, role: ModelRole, action: &str) -> Result<(), BackendError> {
        let url = format!("{}/{action}", self.endpoint(role));
        debug!(%role, action, "model lifecycle call");

        let response = self.client.post(&url).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ServiceError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    Err(BackendError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ModelBackend for HttpModelBackend {
    async fn load(&self, role: ModelRole) -> Result<(), BackendError> {
        self.post_lifecycle(role, "load").await
    }

    async fn unload(&self, role: ModelRole) -> Result<(), BackendError> {
        self.post_lifecycle(role, "unload").await
    }

    async fn infer(&self, request: &ModelRequest) -> Result<ModelResult, BackendError> {
        let role = request.role();
        let url = format!("{}/infer", self.endpoint(role));
        debug!(%role, "inference call");

        let response = self.client.post(&url).json(request).send().await?;
        let response = check_status(response).await?;
        let body = response.text().await?;

        let result = match role {
            ModelRole::GenerateDocument => {
                ModelResult::GenerateDocument(serde_json::from_str::<GeneratedDocument>(&body)?)
            }
            ModelRole::ScoreRelevance => {
                ModelResult::ScoreRelevance(serde_json::from_str::<RelevanceScore>(&body)?)
            }
            ModelRole::FillApplication => {
                ModelResult::FillApplication(serde_json::from_str::<FilledApplication>(&body)?)
            }
        };
        Ok(result)
    }
}
