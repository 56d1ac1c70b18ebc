use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ChartDeployment is a Custom Resource describing a desired Helm chart
/// deployment managed by chart-operator.
///
/// Deployments that predate native Helm release tracking carry a
/// `legacy` reference to the ConfigMap/Secret pair holding the old
/// release data; the controller migrates those to a native release
/// before anything else happens.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "chart-operator.io",
    version = "v1alpha1",
    kind = "ChartDeployment",
    namespaced,
    status = "ChartDeploymentStatus",
    printcolumn = r#"{"name":"Chart", "type":"string", "jsonPath":".spec.chart"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.chartVersion"}"#,
    printcolumn = r#"{"name":"Channel", "type":"string", "jsonPath":".spec.channel"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct ChartDeploymentSpec {
    /// Chart reference understood by Helm (repository chart or OCI URL)
    pub chart: String,

    /// Chart version to install
    #[serde(rename = "chartVersion")]
    pub chart_version: String,

    /// Name of the Helm release
    #[serde(rename = "releaseName")]
    pub release_name: String,

    /// Namespace the release is installed into
    pub namespace: String,

    /// Release channel the chart is tracked on (e.g. "stable")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Version-bundle version used for fleet-wide upgrade sequencing
    #[serde(
        rename = "versionBundleVersion",
        skip_serializing_if = "Option::is_none"
    )]
    pub version_bundle_version: Option<String>,

    /// Values applied to the release
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<serde_json::Value>,

    /// References to the legacy ConfigMap/Secret pair that may still
    /// hold prior release data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy: Option<LegacyReleaseRefs>,
}

/// Names of the legacy objects backing the old release model.
/// Both live in the release namespace.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct LegacyReleaseRefs {
    /// Name of the ConfigMap holding legacy release metadata
    #[serde(rename = "configMap")]
    pub config_map: String,

    /// Name of the Secret holding legacy release data
    pub secret: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ChartDeploymentStatus {
    /// Current phase of the deployment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    /// Human-readable detail for the current phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// RFC3339 timestamp of the last phase transition
    #[serde(rename = "lastTransition", skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<String>,

    /// Chart version of the release that was last applied successfully
    #[serde(
        rename = "appliedChartVersion",
        skip_serializing_if = "Option::is_none"
    )]
    pub applied_chart_version: Option<String>,
}

/// Deployment phase reported on the status subresource
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum Phase {
    /// Migration or installation is in progress, tick will be retried
    Pending,
    /// The release is installed and matches the desired configuration
    Deployed,
    /// A release with a different configuration already exists;
    /// requires operator intervention or a desired-state change
    Conflict,
    /// A fatal error or exhausted retries; not requeued automatically
    Failed,
}
