use std::sync::Arc;

use kiln_common::{BuildId, Commit, RepoRef};
use tracing::info;

use crate::api::{BuildApi, StartBuildRequest};
use crate::errors::TriggerError;

/// Starts builds for a commit. Registering the returned id and attaching a
/// log source is left to the caller.
#[derive(Clone)]
pub struct BuildTrigger {
    api: Arc<dyn BuildApi>,
}

impl BuildTrigger {
    pub fn new(api: Arc<dyn BuildApi>) -> Self {
        Self { api }
    }

    pub async fn trigger(
        &self,
        repo: &RepoRef,
        commit: &Commit,
        credential: Option<&str>,
    ) -> Result<BuildId, TriggerError> {
        let request = build_request(repo, commit, credential)?;
        let build_id = self.api.start_build(&request).await?;
        info!(
            build_id = %build_id,
            repo = %repo.slug(),
            commit = %commit.short_hash(),
            "build started"
        );
        Ok(build_id)
    }
}

/// Validate the inputs and assemble the start request. Fails before any
/// network call.
fn build_request(
    repo: &RepoRef,
    commit: &Commit,
    credential: Option<&str>,
) -> Result<StartBuildRequest, TriggerError> {
    for (field, value) in [
        ("owner", repo.owner.as_str()),
        ("repository", repo.name.as_str()),
        ("branch", repo.branch.as_str()),
        ("commit hash", commit.hash.as_str()),
    ] {
        if value.trim().is_empty() {
            return Err(TriggerError::InvalidRepository(format!("{} is empty", field)));
        }
    }

    let token = credential
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    if repo.private && token.is_none() {
        return Err(TriggerError::MissingCredential { repo: repo.slug() });
    }

    Ok(StartBuildRequest {
        commit_hash: commit.hash.clone(),
        commit_message: commit.message.clone(),
        repo_owner: repo.owner.clone(),
        repo_name: repo.name.clone(),
        branch: repo.branch.clone(),
        token,
    })
}
