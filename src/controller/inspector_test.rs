use super::inspector::{ReleaseStateInspector, TargetStatus};
use super::migration::ChartDeploymentRequest;
use crate::clients::helm::MockHelmClient;
use crate::clients::kube_objects::MockLegacyObjects;
use crate::clients::{ReleaseContent, ReleaseStatus};
use crate::controller::error::MigrationError;
use crate::crd::chart_deployment::LegacyReleaseRefs;
use serde_json::json;
use std::sync::Arc;

fn request() -> ChartDeploymentRequest {
    ChartDeploymentRequest {
        release_name: "my-app".into(),
        namespace: "default".into(),
        chart: "stable/my-app".into(),
        chart_version: "1.3.0".into(),
        channel: None,
        version_bundle_version: None,
        values: json!({}),
        legacy: Some(LegacyReleaseRefs {
            config_map: "my-app-chart-config".into(),
            secret: "my-app-chart-secret".into(),
        }),
    }
}

fn inspector(helm: MockHelmClient, objects: MockLegacyObjects) -> ReleaseStateInspector {
    ReleaseStateInspector::new(Arc::new(helm), Arc::new(objects))
}

#[tokio::test]
async fn test_legacy_exists_when_only_secret_remains() {
    // The ConfigMap is already gone but the Secret lingers; the legacy
    // release still counts as present
    let inspector = inspector(
        MockHelmClient::new(),
        MockLegacyObjects::new().with_secret("default", "my-app-chart-secret"),
    );

    let legacy = inspector.query_legacy(&request()).await.expect("query");
    assert!(legacy.exists);
    assert_eq!(legacy.name, "my-app");
}

#[tokio::test]
async fn test_legacy_absent_when_both_objects_gone() {
    let inspector = inspector(MockHelmClient::new(), MockLegacyObjects::new());

    let legacy = inspector.query_legacy(&request()).await.expect("query");
    assert!(!legacy.exists);
}

#[tokio::test]
async fn test_no_legacy_refs_means_nothing_to_migrate() {
    let inspector = inspector(
        MockHelmClient::new(),
        // Unrelated objects with other names must not count
        MockLegacyObjects::new().with_config_map("default", "some-other-config"),
    );

    let mut desired = request();
    desired.legacy = None;

    let legacy = inspector.query_legacy(&desired).await.expect("query");
    assert!(!legacy.exists);
}

/// A read failure must propagate; reporting it as absence would let
/// the migration install the target while legacy objects still exist.
#[tokio::test]
async fn test_legacy_read_failure_is_not_absence() {
    let inspector = inspector(
        MockHelmClient::new(),
        MockLegacyObjects::new().fail_reads("etcd leader changed"),
    );

    let result = inspector.query_legacy(&request()).await;
    assert!(matches!(result, Err(MigrationError::Client(_))));
}

#[tokio::test]
async fn test_target_absent_when_helm_reports_not_found() {
    let inspector = inspector(MockHelmClient::new(), MockLegacyObjects::new());

    let target = inspector.query_target(&request()).await.expect("query");
    assert_eq!(target.status, TargetStatus::Absent);
    assert_eq!(target.chart_version, None);
    assert_eq!(target.values, None);
}

#[tokio::test]
async fn test_target_states_map_from_helm_statuses() {
    for (helm_status, expected) in [
        (ReleaseStatus::Pending, TargetStatus::Pending),
        (ReleaseStatus::Deployed, TargetStatus::Deployed),
        (ReleaseStatus::Failed, TargetStatus::Failed),
    ] {
        let inspector = inspector(
            MockHelmClient::new().with_release(
                "default",
                ReleaseContent {
                    name: "my-app".into(),
                    status: helm_status,
                    chart_version: "1.3.0".into(),
                    values: json!({"replicas": 2}),
                },
            ),
            MockLegacyObjects::new(),
        );

        let target = inspector.query_target(&request()).await.expect("query");
        assert_eq!(target.status, expected);
        assert_eq!(target.chart_version.as_deref(), Some("1.3.0"));
        assert_eq!(target.values, Some(json!({"replicas": 2})));
    }
}

#[tokio::test]
async fn test_query_returns_both_sides() {
    let inspector = inspector(
        MockHelmClient::new().with_release(
            "default",
            ReleaseContent {
                name: "my-app".into(),
                status: ReleaseStatus::Deployed,
                chart_version: "1.3.0".into(),
                values: json!({}),
            },
        ),
        MockLegacyObjects::new().with_config_map("default", "my-app-chart-config"),
    );

    let (legacy, target) = inspector.query(&request()).await.expect("query");
    assert!(legacy.exists);
    assert_eq!(target.status, TargetStatus::Deployed);
}

#[tokio::test]
async fn test_helm_failure_propagates_from_target_query() {
    let inspector = inspector(
        MockHelmClient::new().fail_queries("kube-apiserver 500"),
        MockLegacyObjects::new(),
    );

    let result = inspector.query_target(&request()).await;
    assert!(matches!(result, Err(MigrationError::Client(_))));
}
