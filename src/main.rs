use chart_operator::clients::{CliHelmClient, KubeLegacyObjects};
use chart_operator::controller::backoff::{BackoffTracker, SystemClock};
use chart_operator::controller::{reconcile, Context, ReconcileError, ReleaseMigration};
use chart_operator::crd::ChartDeployment;
use chart_operator::server::{run_health_server, shutdown_channel, wait_for_signal};
use chart_operator::version::version_bundle;
use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default port for the liveness endpoint
const HEALTH_PORT: u16 = 8080;

/// Default bound on a single Helm/Kubernetes call
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Default requeue interval after a successful or conflicted tick
const DEFAULT_RESYNC_SECS: u64 = 5 * 60;

/// Get the health port from env (default: 8080)
fn health_port() -> u16 {
    std::env::var("CHART_OPERATOR_HEALTH_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(HEALTH_PORT)
}

/// Get the helm binary path from env (default: helm)
fn helm_bin() -> String {
    std::env::var("CHART_OPERATOR_HELM_BIN").unwrap_or_else(|_| "helm".to_string())
}

/// Get the per-call timeout from env (default: 30s)
fn call_timeout() -> Duration {
    let secs = std::env::var("CHART_OPERATOR_CALL_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CALL_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// Get the namespace to watch from env (default: all namespaces)
fn watch_namespace() -> Option<String> {
    std::env::var("CHART_OPERATOR_WATCH_NAMESPACE")
        .ok()
        .filter(|v| !v.is_empty())
}

/// Get the resync interval from env (default: 5m)
fn resync_interval() -> Duration {
    let secs = std::env::var("CHART_OPERATOR_RESYNC_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RESYNC_SECS);
    Duration::from_secs(secs)
}

/// Error policy for the controller
///
/// Handles infrastructure failures (status patch errors, finalizer
/// bookkeeping); classified migration outcomes never reach this path
/// because `reconcile` maps them to requeue actions itself.
///
/// Uses `warn!` since these errors are expected and trigger retries.
pub fn error_policy(
    _cd: Arc<ChartDeployment>,
    error: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    warn!("Reconcile error (will retry): {:?}", error);
    Action::requeue(Duration::from_secs(10))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bundle = version_bundle();
    info!(
        component = bundle.name,
        version = bundle.version,
        "Starting chart-operator"
    );

    // Create shutdown channel for coordinated shutdown
    let (shutdown_controller, _shutdown_signal) = shutdown_channel();

    // Create Kubernetes client
    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Connected to Kubernetes cluster");

    // Start health server in background
    let port = health_port();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = run_health_server(port).await {
            warn!(error = %e, "Health server failed");
        }
    });

    // Create the migration resource on top of the shared clients
    let helm = Arc::new(CliHelmClient::new(helm_bin()));
    let objects = Arc::new(KubeLegacyObjects::new(client.clone()));
    let migration = ReleaseMigration::new(helm, objects, call_timeout());

    let clock = Arc::new(SystemClock);
    let ctx = Arc::new(Context {
        client: client.clone(),
        migration,
        backoff: BackoffTracker::new(clock.clone()),
        clock,
        resync_interval: resync_interval(),
    });

    // Create API for ChartDeployment resources
    let chart_deployments = match watch_namespace() {
        Some(ns) => {
            info!(namespace = %ns, "Watching single namespace");
            Api::<ChartDeployment>::namespaced(client, &ns)
        }
        None => Api::<ChartDeployment>::all(client),
    };

    info!("Controller ready, starting reconciliation loop");

    // Create the controller stream
    // Note: error_policy already logs errors with warn!, so we only log success here
    let controller = Controller::new(chart_deployments, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Ok(o) = res {
                info!("Reconciled: {:?}", o);
            }
            // Errors are logged in error_policy, no duplicate logging
        });

    // Run controller until shutdown signal received
    tokio::select! {
        _ = controller => {
            info!("Controller stream ended");
        }
        signal = wait_for_signal() => {
            info!(signal = signal, "Initiating graceful shutdown");
        }
    }

    // Trigger shutdown for all components
    shutdown_controller.shutdown();
    health_handle.abort();

    info!("chart-operator shut down gracefully");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
