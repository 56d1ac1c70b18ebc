use crate::controller::backoff::{BackoffTracker, Clock};
use crate::controller::error::{Disposition, MigrationError};
use crate::controller::migration::{ChartDeploymentRequest, ReleaseMigration};
use crate::crd::chart_deployment::{ChartDeployment, ChartDeploymentStatus, Phase};
use chrono::{DateTime, Utc};
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Error as FinalizerError, Event};
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const FINALIZER: &str = "chart-operator.io/release-cleanup";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("ChartDeployment missing namespace")]
    MissingNamespace,

    #[error("finalizer processing failed: {0}")]
    Finalizer(String),
}

pub struct Context {
    pub client: kube::Client,
    pub migration: ReleaseMigration,
    pub backoff: BackoffTracker,
    pub clock: Arc<dyn Clock>,
    /// Requeue interval after a successful or conflicted tick
    pub resync_interval: Duration,
}

/// How the controller schedules the next tick for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Requeue {
    After(Duration),
    /// No automatic requeue; the next tick comes from a watch event
    AwaitChange,
}

impl From<Requeue> for Action {
    fn from(requeue: Requeue) -> Action {
        match requeue {
            Requeue::After(delay) => Action::requeue(delay),
            Requeue::AwaitChange => Action::await_change(),
        }
    }
}

/// Reconcile one ChartDeployment.
///
/// Runs the migration resource under a finalizer so teardown goes
/// through `ensure_deleted` before the object disappears. Each tick
/// runs to completion; the next tick is scheduled via the returned
/// action, never by sleeping in-process.
pub async fn reconcile(
    cd: Arc<ChartDeployment>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let namespace = cd.namespace().ok_or(ReconcileError::MissingNamespace)?;
    let api: Api<ChartDeployment> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER, cd, |event| async {
        match event {
            Event::Apply(cd) => apply(cd, &ctx).await,
            Event::Cleanup(cd) => cleanup(cd, &ctx).await,
        }
    })
    .await
    .map_err(|e| match e {
        FinalizerError::ApplyFailed(err) | FinalizerError::CleanupFailed(err) => err,
        other => ReconcileError::Finalizer(other.to_string()),
    })
}

async fn apply(cd: Arc<ChartDeployment>, ctx: &Context) -> Result<Action, ReconcileError> {
    let namespace = cd.namespace().ok_or(ReconcileError::MissingNamespace)?;
    let name = cd.name_any();
    let key = format!("{}/{}", namespace, name);

    info!(
        chart_deployment = %key,
        release = %cd.spec.release_name,
        "reconciling chart deployment"
    );

    let desired = ChartDeploymentRequest::from_spec(&cd.spec);
    let result = ctx.migration.ensure_created(&desired).await;

    let (mut status, requeue) = next_status_and_requeue(
        &key,
        &result,
        &desired.chart_version,
        &ctx.backoff,
        ctx.clock.now(),
        ctx.resync_interval,
    );

    // Keep the transition timestamp stable while the condition itself
    // is unchanged, so the status patch below is skipped on quiet ticks
    if let Some(existing) = &cd.status {
        if existing.phase == status.phase && existing.message == status.message {
            status.last_transition = existing.last_transition.clone();
        }
    }

    if cd.status.as_ref() != Some(&status) {
        let api: Api<ChartDeployment> = Api::namespaced(ctx.client.clone(), &namespace);
        api.patch_status(
            &name,
            &PatchParams::default(),
            &Patch::Merge(&serde_json::json!({ "status": status })),
        )
        .await?;
    }

    if let Err(e) = &result {
        warn!(chart_deployment = %key, error = %e, "reconciliation did not converge");
    }

    Ok(requeue.into())
}

async fn cleanup(cd: Arc<ChartDeployment>, ctx: &Context) -> Result<Action, ReconcileError> {
    let namespace = cd.namespace().ok_or(ReconcileError::MissingNamespace)?;
    let name = cd.name_any();
    let key = format!("{}/{}", namespace, name);

    info!(chart_deployment = %key, "tearing down chart deployment");

    let desired = ChartDeploymentRequest::from_spec(&cd.spec);
    let result = ctx.migration.ensure_deleted(&desired).await;
    let requeue = next_teardown_requeue(&key, &result, &ctx.backoff);

    if let Err(e) = &result {
        match requeue {
            Requeue::After(_) => {
                warn!(chart_deployment = %key, error = %e, "teardown pending, will retry")
            }
            Requeue::AwaitChange => {
                warn!(
                    chart_deployment = %key,
                    error = %e,
                    "releasing finalizer without teardown"
                )
            }
        }
    }
    Ok(requeue.into())
}

/// Map a teardown outcome to the next requeue behavior. Every branch
/// that releases the finalizer also drops the key's backoff state; the
/// object is going away, so the tracker must not keep an entry for it.
pub(crate) fn next_teardown_requeue(
    key: &str,
    result: &Result<(), MigrationError>,
    backoff: &BackoffTracker,
) -> Requeue {
    match result {
        Ok(()) => {
            backoff.reset(key);
            Requeue::AwaitChange
        }
        Err(e) => match e.disposition() {
            Disposition::Transient(profile) => match backoff.next_delay(key, profile) {
                Some(delay) => Requeue::After(delay),
                None => {
                    backoff.reset(key);
                    Requeue::AwaitChange
                }
            },
            // An invalid spec never created a release; nothing to tear
            // down, let the deletion finish
            _ => {
                backoff.reset(key);
                Requeue::AwaitChange
            }
        },
    }
}

/// Map a tick outcome to the next status condition and requeue
/// behavior. Pure so it is testable without a cluster.
pub(crate) fn next_status_and_requeue(
    key: &str,
    result: &Result<(), MigrationError>,
    desired_chart_version: &str,
    backoff: &BackoffTracker,
    now: DateTime<Utc>,
    resync_interval: Duration,
) -> (ChartDeploymentStatus, Requeue) {
    let last_transition = Some(now.to_rfc3339());

    match result {
        Ok(()) => {
            backoff.reset(key);
            (
                ChartDeploymentStatus {
                    phase: Some(Phase::Deployed),
                    message: Some("release deployed".into()),
                    last_transition,
                    applied_chart_version: Some(desired_chart_version.to_string()),
                },
                Requeue::After(resync_interval),
            )
        }
        Err(e) => match e.disposition() {
            Disposition::Fatal => (
                ChartDeploymentStatus {
                    phase: Some(Phase::Failed),
                    message: Some(e.to_string()),
                    last_transition,
                    applied_chart_version: None,
                },
                Requeue::AwaitChange,
            ),
            Disposition::Conflict => (
                ChartDeploymentStatus {
                    phase: Some(Phase::Conflict),
                    message: Some(e.to_string()),
                    last_transition,
                    applied_chart_version: None,
                },
                // The conflicting release may be cleaned up out of band,
                // so keep re-inspecting at the slow resync interval
                Requeue::After(resync_interval),
            ),
            Disposition::Transient(profile) => match backoff.next_delay(key, profile) {
                Some(delay) => (
                    ChartDeploymentStatus {
                        phase: Some(Phase::Pending),
                        message: Some(e.to_string()),
                        last_transition,
                        applied_chart_version: None,
                    },
                    Requeue::After(delay),
                ),
                None => (
                    ChartDeploymentStatus {
                        phase: Some(Phase::Failed),
                        message: Some(format!("retries exhausted: {}", e)),
                        last_transition,
                        applied_chart_version: None,
                    },
                    Requeue::AwaitChange,
                ),
            },
        },
    }
}
