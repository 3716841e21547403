use std::sync::Arc;

use kiln_common::{Build, BuildStatus};
use tracing::{info, warn};

use crate::api::{BuildApi, DeployReceipt, DeployRequest};
use crate::errors::DeployError;

/// Deploys succeeded builds, tagged by their commit hash.
#[derive(Clone)]
pub struct DeployGate {
    api: Arc<dyn BuildApi>,
}

impl DeployGate {
    pub fn new(api: Arc<dyn BuildApi>) -> Self {
        Self { api }
    }

    /// Local precondition check. Never touches the network.
    pub fn check(&self, build: &Build) -> Result<(), DeployError> {
        if build.status() != BuildStatus::Succeeded {
            return Err(DeployError::NotDeployable {
                build_id: build.id.clone(),
                status: build.status(),
            });
        }
        Ok(())
    }

    /// Submit a deploy for `build`. The caller should refresh the build list
    /// afterwards; a deploy is not tracked here.
    pub async fn submit(&self, build: &Build, ingress_enabled: bool) -> Result<DeployReceipt, DeployError> {
        self.check(build)?;

        let request = DeployRequest {
            tag: build.commit_hash.clone(),
            ingress_enabled,
        };
        match self.api.deploy(&request).await {
            Ok(receipt) => {
                info!(build_id = %build.id, tag = %request.tag, "deploy accepted");
                Ok(receipt)
            }
            Err(e) => {
                warn!(build_id = %build.id, tag = %request.tag, error = %e, "deploy rejected");
                Err(e)
            }
        }
    }
}
