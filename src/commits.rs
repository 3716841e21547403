//! Commit listing for the build picker.
//!
//! Public repositories are read straight from the Git host API; private ones
//! go through the backend proxy, which forwards the same response shape and
//! supplies the host credential server-side.

use async_trait::async_trait;
use kiln_common::{Commit, RepoRef};
use serde::Deserialize;

use crate::api::parse_timestamp;
use crate::errors::CommitSourceError;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_COMMIT_LIMIT: usize = 10;
pub const PROXY_COMMITS_PATH: &str = "github/commits";

/// Source of recent commits for a repository branch. Pure read.
#[async_trait]
pub trait CommitSource: Send + Sync {
    async fn recent_commits(&self, repo: &RepoRef, limit: usize) -> Result<Vec<Commit>, CommitSourceError>;
}

// GitHub `GET /repos/{owner}/{repo}/commits` (subset of fields).
#[derive(Debug, Deserialize)]
struct GitHubCommitEntry {
    sha: String,
    commit: GitHubCommitDetail,
    #[serde(default)]
    author: Option<GitHubUser>,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: Option<GitHubCommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitAuthor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    #[serde(default)]
    login: Option<String>,
}

impl From<GitHubCommitEntry> for Commit {
    fn from(entry: GitHubCommitEntry) -> Self {
        let (name, date) = match entry.commit.author {
            Some(a) => (a.name, a.date),
            None => (None, None),
        };
        let author = name
            .or_else(|| entry.author.and_then(|u| u.login))
            .unwrap_or_else(|| "unknown".to_string());
        Commit {
            hash: entry.sha,
            message: entry.commit.message.lines().next().unwrap_or("").to_string(),
            author,
            date: parse_timestamp(date.as_deref()),
        }
    }
}

fn decode_commits(body: &str, limit: usize) -> Result<Vec<Commit>, CommitSourceError> {
    let entries: Vec<GitHubCommitEntry> =
        serde_json::from_str(body).map_err(|e| CommitSourceError::Decode(e.to_string()))?;
    Ok(entries.into_iter().take(limit).map(Commit::from).collect())
}

async fn fetch(builder: reqwest::RequestBuilder, limit: usize) -> Result<Vec<Commit>, CommitSourceError> {
    let resp = builder
        .send()
        .await
        .map_err(|e| CommitSourceError::Request(e.to_string()))?;
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| CommitSourceError::Request(e.to_string()))?;
    if !status.is_success() {
        return Err(CommitSourceError::Status {
            status: status.as_u16(),
            message: body.trim().to_string(),
        });
    }
    decode_commits(&body, limit)
}

/// Reads commits from the public GitHub API.
#[derive(Clone)]
pub struct GitHubCommitSource {
    client: reqwest::Client,
    api_url: String,
}

impl Default for GitHubCommitSource {
    fn default() -> Self {
        Self::new(DEFAULT_GITHUB_API_URL)
    }
}

impl GitHubCommitSource {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CommitSource for GitHubCommitSource {
    async fn recent_commits(&self, repo: &RepoRef, limit: usize) -> Result<Vec<Commit>, CommitSourceError> {
        let url = format!("{}/repos/{}/{}/commits", self.api_url, repo.owner, repo.name);
        let builder = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "kiln-console")
            .query(&[
                ("sha", repo.branch.as_str()),
                ("per_page", limit.to_string().as_str()),
            ]);
        fetch(builder, limit).await
    }
}

/// Reads commits through the backend proxy with the console's bearer token.
#[derive(Clone)]
pub struct ProxyCommitSource {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ProxyCommitSource {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait]
impl CommitSource for ProxyCommitSource {
    async fn recent_commits(&self, repo: &RepoRef, limit: usize) -> Result<Vec<Commit>, CommitSourceError> {
        let url = format!("{}/{}", self.base_url, PROXY_COMMITS_PATH);
        let mut builder = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("User-Agent", "kiln-console")
            .query(&[
                ("owner", repo.owner.as_str()),
                ("repo", repo.name.as_str()),
                ("branch", repo.branch.as_str()),
                ("limit", limit.to_string().as_str()),
            ]);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        fetch(builder, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {"sha":"abc1234def","commit":{"message":"Add readiness probe\n\nDetails","author":{"name":"Ada","date":"2025-02-01T09:30:00Z"}},"author":{"login":"ada"}},
        {"sha":"bcd2345efa","commit":{"message":"Bump deps","author":null},"author":{"login":"grace"}},
        {"sha":"cde3456fab","commit":{"message":"Initial"}}
    ]"#;

    #[test]
    fn test_decode_maps_fields() {
        let commits = decode_commits(SAMPLE, 10).unwrap();
        assert_eq!(commits.len(), 3);
        assert_eq!(commits[0].hash, "abc1234def");
        assert_eq!(commits[0].author, "Ada");
        assert_eq!(commits[0].message, "Add readiness probe");
        assert!(commits[0].date.is_some());
    }

    #[test]
    fn test_decode_falls_back_to_login_then_unknown() {
        let commits = decode_commits(SAMPLE, 10).unwrap();
        assert_eq!(commits[1].author, "grace");
        assert_eq!(commits[2].author, "unknown");
        assert!(commits[2].date.is_none());
    }

    #[test]
    fn test_decode_respects_limit() {
        let commits = decode_commits(SAMPLE, 2).unwrap();
        assert_eq!(commits.len(), 2);
    }

    #[test]
    fn test_decode_rejects_non_list() {
        let err = decode_commits(r#"{"message":"Not Found"}"#, 10).unwrap_err();
        assert!(matches!(err, CommitSourceError::Decode(_)));
    }
}
