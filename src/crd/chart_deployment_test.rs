use super::chart_deployment::*;
use kube::CustomResourceExt;

fn spec_json() -> serde_json::Value {
    serde_json::json!({
        "chart": "stable/my-app",
        "chartVersion": "1.3.0",
        "releaseName": "my-app",
        "namespace": "default",
        "channel": "stable",
        "versionBundleVersion": "0.7.0",
        "values": {"replicas": 2},
        "legacy": {
            "configMap": "my-app-chart-config",
            "secret": "my-app-chart-secret"
        }
    })
}

#[test]
fn test_spec_deserializes_with_camel_case_fields() {
    let spec: ChartDeploymentSpec =
        serde_json::from_value(spec_json()).expect("spec should deserialize");

    assert_eq!(spec.chart, "stable/my-app");
    assert_eq!(spec.chart_version, "1.3.0");
    assert_eq!(spec.release_name, "my-app");
    assert_eq!(spec.channel.as_deref(), Some("stable"));
    let legacy = spec.legacy.expect("legacy refs present");
    assert_eq!(legacy.config_map, "my-app-chart-config");
    assert_eq!(legacy.secret, "my-app-chart-secret");
}

#[test]
fn test_optional_fields_default_to_none() {
    let spec: ChartDeploymentSpec = serde_json::from_value(serde_json::json!({
        "chart": "stable/my-app",
        "chartVersion": "1.3.0",
        "releaseName": "my-app",
        "namespace": "default"
    }))
    .expect("minimal spec should deserialize");

    assert!(spec.channel.is_none());
    assert!(spec.version_bundle_version.is_none());
    assert!(spec.values.is_none());
    assert!(spec.legacy.is_none());
}

#[test]
fn test_crd_identity() {
    let crd = ChartDeployment::crd();
    assert_eq!(
        crd.metadata.name.as_deref(),
        Some("chartdeployments.chart-operator.io")
    );
    assert_eq!(crd.spec.group, "chart-operator.io");
    assert_eq!(crd.spec.names.kind, "ChartDeployment");
    // Status subresource must exist so phase patches work
    let version = &crd.spec.versions[0];
    assert!(version
        .subresources
        .as_ref()
        .and_then(|s| s.status.as_ref())
        .is_some());
}

#[test]
fn test_status_phase_serializes_as_plain_string() {
    let status = ChartDeploymentStatus {
        phase: Some(Phase::Conflict),
        message: Some("release my-app already exists".into()),
        last_transition: None,
        applied_chart_version: None,
    };
    let json = serde_json::to_value(&status).expect("status serializes");
    assert_eq!(json["phase"], "Conflict");
    // Unset optionals are omitted, not null
    assert!(json.get("lastTransition").is_none());
}
