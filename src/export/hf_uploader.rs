//! HuggingFace Hub REST API client for dataset upload.
//!
//! Uses the HF Hub commit API to create the dataset repository and push
//! batch files into it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::publisher::DatasetStore;
use crate::error::ExportError;

const HF_API_BASE: &str = "https://huggingface.co/api";

#[derive(Debug, Clone)]
pub struct HfUploadConfig {
    pub repo_id: String,
    pub token: String,
    pub private: bool,
}

#[derive(Debug, Serialize)]
struct CommitAction {
    action: String,
    path: String,
    content: String,
    encoding: String,
}

#[derive(Debug, Serialize)]
struct CommitRequest {
    summary: String,
    actions: Vec<CommitAction>,
}

#[derive(Debug, Deserialize)]
struct WhoAmI {
    name: String,
}

fn http_client() -> Result<Client, ExportError> {
    Ok(Client::builder().timeout(Duration::from_secs(300)).build()?)
}

/// Name of the account `token` belongs to.
pub async fn resolve_owner(token: &str) -> Result<String, ExportError> {
    let url = format!("{}/whoami-v2", HF_API_BASE);
    let resp = http_client()?.get(&url).bearer_auth(token).send().await?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(ExportError::HuggingFaceApi(format!(
            "whoami failed ({}): {}",
            status, text
        )));
    }
    let who: WhoAmI = resp
        .json()
        .await
        .map_err(|e| ExportError::HuggingFaceApi(format!("invalid whoami response: {}", e)))?;
    Ok(who.name)
}

pub struct HfUploader {
    client: Client,
    config: HfUploadConfig,
}

impl HfUploader {
    pub fn new(config: HfUploadConfig) -> Result<Self, ExportError> {
        if config.token.trim().is_empty() {
            return Err(ExportError::MissingToken);
        }
        Ok(Self {
            client: http_client()?,
            config,
        })
    }

    pub fn repo_id(&self) -> &str {
        &self.config.repo_id
    }

    pub async fn ensure_repo_exists(&self) -> Result<(), ExportError> {
        let url = format!("{}/repos/create", HF_API_BASE);

        let (organization, name) = match self.config.repo_id.split_once('/') {
            Some((org, n)) => (Some(org.to_string()), n.to_string()),
            None => (None, self.config.repo_id.clone()),
        };

        let mut body = serde_json::json!({
            "type": "dataset",
            "name": name,
            "private": self.config.private,
        });
        if let Some(org) = organization {
            body["organization"] = serde_json::Value::String(org);
        }

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() || status.as_u16() == 409 {
            tracing::info!(repo = %self.config.repo_id, "HF dataset repo ready");
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        if text.contains("already created") || text.contains("already exist") {
            tracing::info!(repo = %self.config.repo_id, "HF dataset repo already exists");
            Ok(())
        } else {
            Err(ExportError::DatasetCreationFailed {
                repo: self.config.repo_id.clone(),
                reason: format!("{}: {}", status, text),
            })
        }
    }

    /// Upload a file to the dataset repository via the commit API.
    /// `path_in_repo` is the path inside the repo (e.g. "12.jsonl").
    pub async fn upload_file(
        &self,
        path_in_repo: &str,
        content: &[u8],
        commit_message: &str,
    ) -> Result<(), ExportError> {
        let url = format!(
            "{}/datasets/{}/commit/main",
            HF_API_BASE, self.config.repo_id
        );

        let body = CommitRequest {
            summary: commit_message.to_string(),
            actions: vec![CommitAction {
                action: "file".to_string(),
                path: path_in_repo.to_string(),
                content: base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    content,
                ),
                encoding: "base64".to_string(),
            }],
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await?;

        if resp.status().is_success() {
            tracing::debug!(
                path = path_in_repo,
                repo = %self.config.repo_id,
                "Uploaded file to HF"
            );
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            Err(ExportError::UploadFailed {
                file: path_in_repo.to_string(),
                reason: format!("{}: {}", status, text),
            })
        }
    }

    pub fn repo_url(&self) -> String {
        format!("https://huggingface.co/datasets/{}", self.config.repo_id)
    }
}

#[async_trait]
impl DatasetStore for HfUploader {
    async fn ensure_repo(&self) -> Result<(), ExportError> {
        self.ensure_repo_exists().await
    }

    async fn upload(&self, name: &str, content: Vec<u8>) -> Result<(), ExportError> {
        self.upload_file(name, &content, &format!("Upload {}", name))
            .await
    }

    fn location(&self) -> String {
        self.repo_url()
    }
}

impl std::fmt::Debug for HfUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfUploader")
            .field("repo_id", &self.config.repo_id)
            .field("private", &self.config.private)
            .finish_non_exhaustive()
    }
}
