//! Release Migration Resource: converts a legacy ConfigMap/Secret-backed
//! release into a native Helm release without ever producing a duplicate
//! or colliding release.
//!
//! Both operations are idempotent. They re-query authoritative external
//! state before every action instead of remembering anything between
//! ticks, so they are safe under at-least-once delivery, crashes and
//! arbitrary retry timing. A tick performs at most the one remaining
//! action needed to converge.

use crate::clients::{HelmClient, InstallRequest, LegacyObjects};
use crate::controller::error::MigrationError;
use crate::controller::inspector::{ReleaseStateInspector, TargetRelease, TargetStatus};
use crate::crd::chart_deployment::{ChartDeploymentSpec, LegacyReleaseRefs};
use anyhow::anyhow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Desired state for one chart deployment, immutable per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartDeploymentRequest {
    pub release_name: String,
    pub namespace: String,
    pub chart: String,
    pub chart_version: String,
    pub channel: Option<String>,
    pub version_bundle_version: Option<String>,
    /// Values applied to the release; `{}` when none are given
    pub values: serde_json::Value,
    /// Legacy objects that may still hold prior release data
    pub legacy: Option<LegacyReleaseRefs>,
}

impl ChartDeploymentRequest {
    pub fn from_spec(spec: &ChartDeploymentSpec) -> Self {
        ChartDeploymentRequest {
            release_name: spec.release_name.clone(),
            namespace: spec.namespace.clone(),
            chart: spec.chart.clone(),
            chart_version: spec.chart_version.clone(),
            channel: spec.channel.clone(),
            version_bundle_version: spec.version_bundle_version.clone(),
            values: spec.values.clone().unwrap_or_else(|| serde_json::json!({})),
            legacy: spec.legacy.clone(),
        }
    }

    /// Reject missing required fields before any external state is
    /// touched.
    fn validate(&self) -> Result<(), MigrationError> {
        if self.release_name.is_empty() {
            return Err(MigrationError::InvalidConfig(
                "release name must not be empty".into(),
            ));
        }
        if self.namespace.is_empty() {
            return Err(MigrationError::InvalidConfig(
                "namespace must not be empty".into(),
            ));
        }
        if self.chart.is_empty() {
            return Err(MigrationError::InvalidConfig(
                "chart reference must not be empty".into(),
            ));
        }
        Ok(())
    }
}

pub struct ReleaseMigration {
    helm: Arc<dyn HelmClient>,
    objects: Arc<dyn LegacyObjects>,
    inspector: ReleaseStateInspector,
    /// Bound on every external call so a hung dependency cannot occupy
    /// a worker indefinitely
    call_timeout: Duration,
}

impl ReleaseMigration {
    pub fn new(
        helm: Arc<dyn HelmClient>,
        objects: Arc<dyn LegacyObjects>,
        call_timeout: Duration,
    ) -> Self {
        let inspector = ReleaseStateInspector::new(helm.clone(), objects.clone());
        Self {
            helm,
            objects,
            inspector,
            call_timeout,
        }
    }

    /// Drive the deployment one step towards the desired state.
    ///
    /// Order is fixed: the legacy release is checked first and the
    /// target release is never touched until the legacy objects are
    /// confirmed absent. When the legacy release is present this tick
    /// only issues the delete; installation happens on a later tick
    /// once deletion is confirmed.
    pub async fn ensure_created(
        &self,
        desired: &ChartDeploymentRequest,
    ) -> Result<(), MigrationError> {
        desired.validate()?;

        let legacy = self
            .bounded("legacy release query", self.inspector.query_legacy(desired))
            .await?;
        if legacy.exists {
            self.delete_legacy(desired).await?;

            let legacy = self
                .bounded("legacy release re-query", self.inspector.query_legacy(desired))
                .await?;
            if legacy.exists {
                debug!(
                    release = %desired.release_name,
                    "legacy objects still present after delete, awaiting removal"
                );
            } else {
                debug!(
                    release = %desired.release_name,
                    "legacy objects gone, target release follows on the next tick"
                );
            }
            // The delete was this tick's one action; converging further
            // happens on the next tick, once deletion is confirmed.
            return Err(MigrationError::ReleasesNotDeleted {
                release: desired.release_name.clone(),
            });
        }

        let target = self
            .bounded("target release query", self.inspector.query_target(desired))
            .await?;
        match target.status {
            TargetStatus::Absent => self.install_target(desired).await,
            _ => self.adopt_or_conflict(desired, &target),
        }
    }

    /// Idempotent teardown of the target release. Never touches the
    /// legacy objects; migration is one-directional.
    pub async fn ensure_deleted(
        &self,
        desired: &ChartDeploymentRequest,
    ) -> Result<(), MigrationError> {
        desired.validate()?;

        let target = self
            .bounded("target release query", self.inspector.query_target(desired))
            .await?;
        if target.status == TargetStatus::Absent {
            return Ok(());
        }

        info!(
            release = %desired.release_name,
            namespace = %desired.namespace,
            "uninstalling target release"
        );
        self.bounded("helm uninstall", async {
            Ok(self
                .helm
                .delete_release(&desired.namespace, &desired.release_name)
                .await?)
        })
        .await?;

        let target = self
            .bounded("target release re-query", self.inspector.query_target(desired))
            .await?;
        if target.status == TargetStatus::Absent {
            Ok(())
        } else {
            Err(MigrationError::Client(anyhow!(
                "release {} still present after uninstall",
                desired.release_name
            )))
        }
    }

    async fn delete_legacy(&self, desired: &ChartDeploymentRequest) -> Result<(), MigrationError> {
        let Some(legacy) = &desired.legacy else {
            return Ok(());
        };

        info!(
            release = %desired.release_name,
            config_map = %legacy.config_map,
            secret = %legacy.secret,
            "deleting legacy release objects"
        );

        self.bounded("configmap delete", async {
            Ok(self
                .objects
                .delete_config_map(&desired.namespace, &legacy.config_map)
                .await?)
        })
        .await?;
        self.bounded("secret delete", async {
            Ok(self
                .objects
                .delete_secret(&desired.namespace, &legacy.secret)
                .await?)
        })
        .await?;
        Ok(())
    }

    async fn install_target(&self, desired: &ChartDeploymentRequest) -> Result<(), MigrationError> {
        info!(
            release = %desired.release_name,
            namespace = %desired.namespace,
            chart = %desired.chart,
            chart_version = %desired.chart_version,
            "installing target release"
        );

        let request = InstallRequest {
            release_name: desired.release_name.clone(),
            namespace: desired.namespace.clone(),
            chart: desired.chart.clone(),
            chart_version: desired.chart_version.clone(),
            values: desired.values.clone(),
        };

        let result = self
            .bounded("helm install", async {
                Ok(self.helm.install_release(&request).await?)
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(MigrationError::Client(cause)) if reports_already_exists(&cause) => {
                // Lost a race against another actor creating the same
                // release between query and install. Re-query and apply
                // the adoption/conflict rules instead of failing.
                let target = self
                    .bounded("target release re-query", self.inspector.query_target(desired))
                    .await?;
                match target.status {
                    TargetStatus::Absent => Err(MigrationError::Client(cause)),
                    _ => self.adopt_or_conflict(desired, &target),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// An existing target release is adopted only on an exact
    /// configuration match; any mismatch is a standing conflict, never
    /// an overwrite.
    fn adopt_or_conflict(
        &self,
        desired: &ChartDeploymentRequest,
        target: &TargetRelease,
    ) -> Result<(), MigrationError> {
        let version_matches = target.chart_version.as_deref() == Some(&desired.chart_version);
        let values_match = target.values.as_ref() == Some(&desired.values);

        if version_matches && values_match {
            debug!(
                release = %desired.release_name,
                "target release already matches desired configuration"
            );
            return Ok(());
        }

        let detail = if !version_matches {
            format!(
                "chart version {} != desired {}",
                target.chart_version.as_deref().unwrap_or("unknown"),
                desired.chart_version
            )
        } else {
            "applied values differ from desired values".to_string()
        };

        Err(MigrationError::ReleaseAlreadyExists {
            release: desired.release_name.clone(),
            detail,
        })
    }

    /// Bound an external call by the per-call timeout; expiry is a
    /// wrapped transient client error, not fatal.
    async fn bounded<T, F>(&self, what: &str, call: F) -> Result<T, MigrationError>
    where
        F: Future<Output = Result<T, MigrationError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(MigrationError::Client(anyhow!(
                "{} timed out after {}s",
                what,
                self.call_timeout.as_secs()
            ))),
        }
    }
}

/// True when a failed install indicates the release already exists
/// (Helm refuses to re-use a name that is still in use).
fn reports_already_exists(cause: &anyhow::Error) -> bool {
    let message = cause.to_string();
    message.contains("already exists") || message.contains("re-use a name")
}
