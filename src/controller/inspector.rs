//! Release State Inspector: the single place the migration logic looks
//! at the outside world.
//!
//! Every query reads live state from the underlying systems. Nothing
//! is cached; a cached answer could let a tick act on a release that
//! another actor (manual `helm delete`, a second controller instance)
//! changed since the last tick.

use crate::clients::{HelmClient, LegacyObjects, ReleaseStatus};
use crate::controller::error::MigrationError;
use crate::controller::migration::ChartDeploymentRequest;
use std::sync::Arc;

/// The release as represented by the legacy ConfigMap/Secret model
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRelease {
    pub exists: bool,
    pub name: String,
}

/// Deployment state of the native Helm release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    Absent,
    Pending,
    Deployed,
    Failed,
}

/// The native Helm release together with its applied configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRelease {
    pub status: TargetStatus,
    pub chart_version: Option<String>,
    pub values: Option<serde_json::Value>,
}

impl TargetRelease {
    fn absent() -> Self {
        TargetRelease {
            status: TargetStatus::Absent,
            chart_version: None,
            values: None,
        }
    }
}

pub struct ReleaseStateInspector {
    helm: Arc<dyn HelmClient>,
    objects: Arc<dyn LegacyObjects>,
}

impl ReleaseStateInspector {
    pub fn new(helm: Arc<dyn HelmClient>, objects: Arc<dyn LegacyObjects>) -> Self {
        Self { helm, objects }
    }

    /// Query both sides of the migration in one pass, legacy first.
    pub async fn query(
        &self,
        desired: &ChartDeploymentRequest,
    ) -> Result<(LegacyRelease, TargetRelease), MigrationError> {
        let legacy = self.query_legacy(desired).await?;
        let target = self.query_target(desired).await?;
        Ok((legacy, target))
    }

    /// Existence of the legacy ConfigMap/Secret pair. A read failure
    /// propagates; it is never reported as absence.
    pub async fn query_legacy(
        &self,
        desired: &ChartDeploymentRequest,
    ) -> Result<LegacyRelease, MigrationError> {
        let Some(legacy) = &desired.legacy else {
            // Nothing to migrate for deployments created after native
            // release tracking
            return Ok(LegacyRelease {
                exists: false,
                name: desired.release_name.clone(),
            });
        };

        let config_map_present = self
            .objects
            .config_map_exists(&desired.namespace, &legacy.config_map)
            .await?;
        let secret_present = self
            .objects
            .secret_exists(&desired.namespace, &legacy.secret)
            .await?;

        Ok(LegacyRelease {
            exists: config_map_present || secret_present,
            name: desired.release_name.clone(),
        })
    }

    /// Current state of the native Helm release. Helm "not found" maps
    /// to `Absent`; any other failure propagates.
    pub async fn query_target(
        &self,
        desired: &ChartDeploymentRequest,
    ) -> Result<TargetRelease, MigrationError> {
        let content = self
            .helm
            .release_content(&desired.namespace, &desired.release_name)
            .await?;

        Ok(match content {
            None => TargetRelease::absent(),
            Some(release) => TargetRelease {
                status: match release.status {
                    ReleaseStatus::Pending => TargetStatus::Pending,
                    ReleaseStatus::Deployed => TargetStatus::Deployed,
                    ReleaseStatus::Failed => TargetStatus::Failed,
                },
                chart_version: Some(release.chart_version),
                values: Some(release.values),
            },
        })
    }
}
