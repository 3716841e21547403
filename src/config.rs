//! Configuration for the kiln console.
//!
//! Settings are layered file → environment → CLI. The file is
//! `.kiln/kiln.toml` in the project directory, falling back to
//! `<config dir>/kiln/kiln.toml` (via `dirs`).
//!
//! ```toml
//! [api]
//! base_url = "https://paas.example.com/api"
//!
//! [repo]
//! owner = "acme"
//! name = "shop"
//! branch = "main"
//! private = false
//!
//! [stream]
//! status_poll_secs = 5
//!
//! [commits]
//! limit = 10
//! github_api_url = "https://api.github.com"
//! use_proxy = false
//!
//! [deploy]
//! ingress_enabled = false
//! ```
//!
//! Credentials never live in the file: `KILN_TOKEN` carries the backend bearer
//! credential and `KILN_GITHUB_TOKEN` the repository token forwarded on build
//! start. `KILN_API_URL` overrides `api.base_url`.

use anyhow::{Context, Result, bail};
use kiln_common::RepoRef;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::commits::{DEFAULT_COMMIT_LIMIT, DEFAULT_GITHUB_API_URL};

pub const CONFIG_DIR: &str = ".kiln";
pub const CONFIG_FILE: &str = "kiln.toml";
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

pub const ENV_API_URL: &str = "KILN_API_URL";
pub const ENV_TOKEN: &str = "KILN_TOKEN";
pub const ENV_GITHUB_TOKEN: &str = "KILN_GITHUB_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSection {
    /// Backend REST base URL. The live stream address is derived from it.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Repository the console builds from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSection {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub private: bool,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Default for RepoSection {
    fn default() -> Self {
        Self {
            owner: String::new(),
            name: String::new(),
            branch: default_branch(),
            private: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSection {
    /// Fixed-cadence status reconcile while a build is live. 0 disables it.
    #[serde(default = "default_status_poll_secs")]
    pub status_poll_secs: u64,
}

fn default_status_poll_secs() -> u64 {
    5
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            status_poll_secs: default_status_poll_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitsSection {
    #[serde(default = "default_commit_limit")]
    pub limit: usize,
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
    /// List commits through the backend proxy instead of the public host API.
    #[serde(default)]
    pub use_proxy: bool,
}

fn default_commit_limit() -> usize {
    DEFAULT_COMMIT_LIMIT
}

fn default_github_api_url() -> String {
    DEFAULT_GITHUB_API_URL.to_string()
}

impl Default for CommitsSection {
    fn default() -> Self {
        Self {
            limit: default_commit_limit(),
            github_api_url: default_github_api_url(),
            use_proxy: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploySection {
    #[serde(default)]
    pub ingress_enabled: bool,
}

/// The complete kiln.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KilnToml {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub repo: RepoSection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub commits: CommitsSection,
    #[serde(default)]
    pub deploy: DeploySection,
}

impl KilnToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse kiln.toml")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize kiln.toml")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(url) = &self.api.base_url
            && !is_http_url(url)
        {
            warnings.push(format!(
                "Invalid api.base_url '{}': should start with http:// or https://",
                url
            ));
        }
        if !is_http_url(&self.commits.github_api_url) {
            warnings.push(format!(
                "Invalid commits.github_api_url '{}': should start with http:// or https://",
                self.commits.github_api_url
            ));
        }
        if self.commits.limit == 0 {
            warnings.push("commits.limit is 0: no commits will be listed".to_string());
        }
        if self.repo.owner.is_empty() || self.repo.name.is_empty() {
            warnings.push("[repo] owner and name are not set".to_string());
        }
        if self.repo.private && !self.commits.use_proxy {
            warnings.push(
                "repo.private is set but commits.use_proxy is false: the public host API cannot list private commits"
                    .to_string(),
            );
        }

        warnings
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct KilnConfig {
    /// Where `toml` was read from, if a file was found.
    pub source: Option<PathBuf>,
    pub toml: KilnToml,
    pub api_url: String,
    pub token: Option<String>,
    pub github_token: Option<String>,
    pub verbose: bool,
}

impl KilnConfig {
    /// Project-local config file path.
    pub fn project_file(project_dir: &Path) -> PathBuf {
        project_dir.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Per-user fallback config file path.
    pub fn user_file() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kiln").join(CONFIG_FILE))
    }

    /// First existing config file: project, then per-user.
    pub fn discover(project_dir: &Path) -> Option<PathBuf> {
        std::iter::once(Self::project_file(project_dir))
            .chain(Self::user_file())
            .find(|path| path.exists())
    }

    /// Load file and process environment.
    pub fn new(project_dir: &Path) -> Result<Self> {
        Self::resolve(project_dir, |key| std::env::var(key).ok())
    }

    /// Load with CLI overrides applied last.
    pub fn with_cli_args(
        project_dir: &Path,
        api_url: Option<String>,
        token: Option<String>,
        verbose: bool,
    ) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        if let Some(url) = api_url {
            config.api_url = url;
        }
        if token.is_some() {
            config.token = token;
        }
        config.verbose = verbose;
        Ok(config)
    }

    fn resolve(project_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let source = Self::discover(project_dir);
        let toml = match &source {
            Some(path) => KilnToml::load(path)?,
            None => KilnToml::default(),
        };
        Ok(Self::from_parts(source, toml, env))
    }

    fn from_parts(source: Option<PathBuf>, toml: KilnToml, env: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let api_url = non_empty(ENV_API_URL)
            .or_else(|| toml.api.base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Self {
            source,
            api_url,
            token: non_empty(ENV_TOKEN),
            github_token: non_empty(ENV_GITHUB_TOKEN),
            toml,
            verbose: false,
        }
    }

    /// Repository from `[repo]`, optionally overridden by an `owner/name`
    /// slug and branch from the command line.
    pub fn repo(&self, slug: Option<&str>, branch: Option<&str>) -> Result<RepoRef> {
        let (owner, name) = match slug {
            Some(slug) => match slug.split_once('/') {
                Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
                    (owner.to_string(), name.to_string())
                }
                _ => bail!("Invalid repository '{}': expected owner/name", slug),
            },
            None => (self.toml.repo.owner.clone(), self.toml.repo.name.clone()),
        };
        if owner.is_empty() || name.is_empty() {
            bail!("No repository configured. Set [repo] in kiln.toml or pass --repo owner/name");
        }
        let branch = branch.map(str::to_string).unwrap_or_else(|| self.toml.repo.branch.clone());
        Ok(RepoRef::new(owner, name, branch).private(self.toml.repo.private))
    }

    /// Cadence of the background status reconcile, `None` when disabled.
    pub fn poll_interval(&self) -> Option<Duration> {
        match self.toml.stream.status_poll_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if !is_http_url(&self.api_url) {
            warnings.push(format!(
                "Invalid API URL '{}': should start with http:// or https://",
                self.api_url
            ));
        }
        warnings
    }
}
