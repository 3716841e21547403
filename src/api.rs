//! REST boundary to the PaaS backend.
//!
//! `BuildApi` is the seam every component talks through; `HttpBuildApi` is the
//! reqwest implementation and the test suites provide in-memory doubles.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use kiln_common::{BuildId, RepoRef};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{
    BuildListError, DeployError, PersistedLogFetchError, ReconcileFetchError, TriggerError,
};

pub const BUILD_START_PATH: &str = "build/start";
pub const BUILDS_PATH: &str = "builds";
pub const BUILD_STATUS_PATH: &str = "build/status";
pub const BUILD_LOGS_PATH: &str = "build/logs/db";
pub const BUILD_STREAM_PATH: &str = "build/logs/stream";
pub const DEPLOY_PATH: &str = "deploy";

const USER_AGENT: &str = "kiln-console";

// ── Wire types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartBuildRequest {
    pub commit_hash: String,
    pub commit_message: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBuildResponse {
    pub build_id: BuildId,
}

/// One row of `GET builds`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    pub workflow_id: BuildId,
    pub commit_id: String,
    #[serde(default)]
    pub commit_message: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub status: String,
}

/// Body of `GET build/status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStatus {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
}

/// Body of `GET build/logs/db`: the whole log as one newline-delimited blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PersistedLogs {
    #[serde(default)]
    pub logs: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub tag: String,
    pub ingress_enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DeployResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Accepted deploy, with the backend's message if it sent one.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployReceipt {
    pub message: Option<String>,
}

/// Parse a backend timestamp. Accepts RFC 3339 and naive `YYYY-MM-DD HH:MM:SS`
/// (taken as UTC). Empty or unparseable values yield `None`.
pub fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

// ── Trait seam ────────────────────────────────────────────────────────

/// Abstraction over the backend REST endpoints for testability.
/// Real implementation: `HttpBuildApi`.
#[async_trait]
pub trait BuildApi: Send + Sync {
    async fn start_build(&self, request: &StartBuildRequest) -> Result<BuildId, TriggerError>;

    async fn list_builds(&self, repo: &RepoRef) -> Result<Vec<BuildSummary>, BuildListError>;

    async fn build_status(&self, build_id: &BuildId) -> Result<RemoteStatus, ReconcileFetchError>;

    async fn persisted_logs(&self, build_id: &BuildId)
    -> Result<PersistedLogs, PersistedLogFetchError>;

    async fn deploy(&self, request: &DeployRequest) -> Result<DeployReceipt, DeployError>;
}

// ── HTTP implementation ───────────────────────────────────────────────

/// Transport-level failure before it is mapped onto a component error.
#[derive(Debug)]
enum HttpFailure {
    Request(String),
    Status { status: u16, message: String },
    Decode(String),
}

impl From<HttpFailure> for TriggerError {
    fn from(f: HttpFailure) -> Self {
        match f {
            HttpFailure::Status { status, message } => TriggerError::Rejected { status, message },
            HttpFailure::Request(m) | HttpFailure::Decode(m) => TriggerError::Transport(m),
        }
    }
}

impl From<HttpFailure> for BuildListError {
    fn from(f: HttpFailure) -> Self {
        match f {
            HttpFailure::Request(m) => BuildListError::Request(m),
            HttpFailure::Status { status, message } => BuildListError::Status { status, message },
            HttpFailure::Decode(m) => BuildListError::Decode(m),
        }
    }
}

impl From<HttpFailure> for ReconcileFetchError {
    fn from(f: HttpFailure) -> Self {
        match f {
            HttpFailure::Request(m) => ReconcileFetchError::Request(m),
            HttpFailure::Status { status, message } => {
                ReconcileFetchError::Status { status, message }
            }
            HttpFailure::Decode(m) => ReconcileFetchError::Decode(m),
        }
    }
}

impl From<HttpFailure> for PersistedLogFetchError {
    fn from(f: HttpFailure) -> Self {
        match f {
            HttpFailure::Request(m) => PersistedLogFetchError::Request(m),
            HttpFailure::Status { status, message } => {
                PersistedLogFetchError::Status { status, message }
            }
            HttpFailure::Decode(m) => PersistedLogFetchError::Decode(m),
        }
    }
}

/// Pull a human-readable message out of an error body. Prefers a JSON
/// `message` or `error` field, falls back to the raw text.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    body.trim().to_string()
}

#[derive(Clone)]
pub struct HttpBuildApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBuildApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, self.endpoint(path))
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, HttpFailure> {
        let resp = builder
            .send()
            .await
            .map_err(|e| HttpFailure::Request(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| HttpFailure::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(HttpFailure::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        serde_json::from_str(&body).map_err(|e| HttpFailure::Decode(e.to_string()))
    }
}

#[async_trait]
impl BuildApi for HttpBuildApi {
    async fn start_build(&self, request: &StartBuildRequest) -> Result<BuildId, TriggerError> {
        let builder = self.request(reqwest::Method::POST, BUILD_START_PATH).json(request);
        let resp: StartBuildResponse = self.send_json(builder).await?;
        Ok(resp.build_id)
    }

    async fn list_builds(&self, repo: &RepoRef) -> Result<Vec<BuildSummary>, BuildListError> {
        let builder = self.request(reqwest::Method::GET, BUILDS_PATH).query(&[
            ("owner", repo.owner.as_str()),
            ("repo", repo.name.as_str()),
            ("branch", repo.branch.as_str()),
        ]);
        Ok(self.send_json(builder).await?)
    }

    async fn build_status(&self, build_id: &BuildId) -> Result<RemoteStatus, ReconcileFetchError> {
        let builder = self
            .request(reqwest::Method::GET, BUILD_STATUS_PATH)
            .query(&[("buildId", build_id.as_str())]);
        Ok(self.send_json(builder).await?)
    }

    async fn persisted_logs(
        &self,
        build_id: &BuildId,
    ) -> Result<PersistedLogs, PersistedLogFetchError> {
        let builder = self
            .request(reqwest::Method::GET, BUILD_LOGS_PATH)
            .query(&[("buildId", build_id.as_str())]);
        Ok(self.send_json(builder).await?)
    }

    async fn deploy(&self, request: &DeployRequest) -> Result<DeployReceipt, DeployError> {
        let builder = self.request(reqwest::Method::POST, DEPLOY_PATH).json(request);
        // Non-JSON success bodies are accepted as a bare success.
        let resp = match self.send_json::<DeployResponse>(builder).await {
            Ok(resp) => resp,
            Err(HttpFailure::Decode(_)) => DeployResponse::default(),
            Err(HttpFailure::Status { message, .. }) => {
                return Err(DeployError::DeployFailed { message });
            }
            Err(HttpFailure::Request(message)) => {
                return Err(DeployError::DeployFailed { message });
            }
        };
        if resp.success == Some(false) {
            let message = resp
                .error
                .or(resp.message)
                .unwrap_or_else(|| "Deployment was rejected".to_string());
            return Err(DeployError::DeployFailed { message });
        }
        Ok(DeployReceipt {
            message: resp.message,
        })
    }
}
