//! Helm client seam: query, install and delete releases.
//!
//! The production implementation shells out to the `helm` binary. It
//! never caches release state; every query reflects what Helm reports
//! at that moment.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Deployment status of a release as reported by Helm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStatus {
    /// An install/upgrade/rollback is in flight
    Pending,
    Deployed,
    Failed,
}

impl ReleaseStatus {
    /// Map a Helm status string ("deployed", "pending-install", ...)
    fn from_helm(status: &str) -> Self {
        match status {
            "deployed" => ReleaseStatus::Deployed,
            s if s.starts_with("pending") || s == "uninstalling" => ReleaseStatus::Pending,
            _ => ReleaseStatus::Failed,
        }
    }
}

/// Observable content of an existing release
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseContent {
    pub name: String,
    pub status: ReleaseStatus,
    pub chart_version: String,
    /// User-supplied values; `{}` when none were given
    pub values: serde_json::Value,
}

/// Parameters for installing a release
#[derive(Debug, Clone, PartialEq)]
pub struct InstallRequest {
    pub release_name: String,
    pub namespace: String,
    pub chart: String,
    pub chart_version: String,
    pub values: serde_json::Value,
}

/// Trait for the Helm operations the migration logic needs
///
/// Production code uses `CliHelmClient`; tests use `MockHelmClient`
/// parameterized with canned releases and errors.
#[async_trait]
pub trait HelmClient: Send + Sync {
    /// Query a release by name. `None` when the release does not exist;
    /// query failures propagate as errors, never as absence.
    async fn release_content(
        &self,
        namespace: &str,
        release_name: &str,
    ) -> Result<Option<ReleaseContent>>;

    /// Install a release with the given name, chart and values.
    async fn install_release(&self, request: &InstallRequest) -> Result<()>;

    /// Delete a release by name. "Not found" counts as success.
    async fn delete_release(&self, namespace: &str, release_name: &str) -> Result<()>;
}

/// One entry of `helm list -o json`
#[derive(Debug, Deserialize)]
struct HelmListEntry {
    name: String,
    status: String,
}

/// Output of `helm get metadata -o json`. The chart version is a
/// dedicated field here; the `helm list` chart column concatenates
/// chart name and version and cannot be split back apart once either
/// side contains a hyphen.
#[derive(Debug, Deserialize)]
struct HelmMetadata {
    version: String,
}

/// Production Helm client invoking the `helm` binary
pub struct CliHelmClient {
    helm_bin: String,
}

impl CliHelmClient {
    pub fn new(helm_bin: impl Into<String>) -> Self {
        Self {
            helm_bin: helm_bin.into(),
        }
    }

    async fn run(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<std::process::Output> {
        debug!(helm = %self.helm_bin, args = ?args, "running helm");

        let mut command = Command::new(&self.helm_bin);
        command
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.helm_bin))?;

        if let Some(input) = stdin {
            let mut handle = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("helm stdin not captured"))?;
            handle.write_all(input).await.context("writing helm stdin")?;
            drop(handle);
        }

        child
            .wait_with_output()
            .await
            .context("waiting for helm to exit")
    }
}

/// Helm prints "null" for releases installed without values
fn normalize_values(values: serde_json::Value) -> serde_json::Value {
    if values.is_null() {
        serde_json::json!({})
    } else {
        values
    }
}

#[async_trait]
impl HelmClient for CliHelmClient {
    async fn release_content(
        &self,
        namespace: &str,
        release_name: &str,
    ) -> Result<Option<ReleaseContent>> {
        // Anchored filter so "app" does not match "app-db"
        let filter = format!("^{}$", regex_escape(release_name));
        let output = self
            .run(
                &[
                    "list",
                    "--namespace",
                    namespace,
                    "--filter",
                    &filter,
                    "--all",
                    "--output",
                    "json",
                ],
                None,
            )
            .await?;

        if !output.status.success() {
            return Err(anyhow!(
                "helm list failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let entries: Vec<HelmListEntry> =
            serde_json::from_slice(&output.stdout).context("parsing helm list output")?;
        let Some(entry) = entries.into_iter().find(|e| e.name == release_name) else {
            return Ok(None);
        };

        let metadata_output = self
            .run(
                &[
                    "get",
                    "metadata",
                    release_name,
                    "--namespace",
                    namespace,
                    "--output",
                    "json",
                ],
                None,
            )
            .await?;
        if !metadata_output.status.success() {
            return Err(anyhow!(
                "helm get metadata failed: {}",
                String::from_utf8_lossy(&metadata_output.stderr).trim()
            ));
        }
        let metadata: HelmMetadata = serde_json::from_slice(&metadata_output.stdout)
            .context("parsing helm metadata output")?;

        let values_output = self
            .run(
                &[
                    "get",
                    "values",
                    release_name,
                    "--namespace",
                    namespace,
                    "--output",
                    "json",
                ],
                None,
            )
            .await?;
        if !values_output.status.success() {
            return Err(anyhow!(
                "helm get values failed: {}",
                String::from_utf8_lossy(&values_output.stderr).trim()
            ));
        }
        let values: serde_json::Value =
            serde_json::from_slice(&values_output.stdout).context("parsing helm values output")?;

        Ok(Some(ReleaseContent {
            name: entry.name,
            status: ReleaseStatus::from_helm(&entry.status),
            chart_version: metadata.version,
            values: normalize_values(values),
        }))
    }

    async fn install_release(&self, request: &InstallRequest) -> Result<()> {
        let values =
            serde_yaml::to_string(&request.values).context("serializing release values")?;

        let output = self
            .run(
                &[
                    "install",
                    &request.release_name,
                    &request.chart,
                    "--namespace",
                    &request.namespace,
                    "--version",
                    &request.chart_version,
                    "--values",
                    "-",
                ],
                Some(values.as_bytes()),
            )
            .await?;

        if !output.status.success() {
            return Err(anyhow!(
                "helm install {} failed: {}",
                request.release_name,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }

    async fn delete_release(&self, namespace: &str, release_name: &str) -> Result<()> {
        let output = self
            .run(
                &["uninstall", release_name, "--namespace", namespace],
                None,
            )
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Idempotent delete: a release that is already gone is fine
            if stderr.contains("not found") {
                return Ok(());
            }
            return Err(anyhow!(
                "helm uninstall {} failed: {}",
                release_name,
                stderr.trim()
            ));
        }
        Ok(())
    }
}

/// Escape regex metacharacters in a release name for `--filter`
fn regex_escape(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if !c.is_alphanumeric() && c != '-' && c != '_' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Mock Helm client for tests: an in-memory release map plus canned
/// errors, recording call counts for idempotence assertions.
#[cfg(test)]
pub struct MockHelmClient {
    releases: std::sync::Mutex<std::collections::HashMap<String, ReleaseContent>>,
    /// Releases another actor creates concurrently: invisible until an
    /// install attempt has been made, to exercise the install race
    racing: std::sync::Mutex<std::collections::HashMap<String, ReleaseContent>>,
    query_error: std::sync::Mutex<Option<String>>,
    install_error: std::sync::Mutex<Option<String>>,
    /// When set, uninstalls succeed but the release remains
    stuck_uninstalls: std::sync::atomic::AtomicBool,
    pub query_calls: std::sync::atomic::AtomicUsize,
    pub install_calls: std::sync::atomic::AtomicUsize,
    pub delete_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl Default for MockHelmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockHelmClient {
    pub fn new() -> Self {
        MockHelmClient {
            releases: std::sync::Mutex::new(std::collections::HashMap::new()),
            racing: std::sync::Mutex::new(std::collections::HashMap::new()),
            query_error: std::sync::Mutex::new(None),
            install_error: std::sync::Mutex::new(None),
            stuck_uninstalls: std::sync::atomic::AtomicBool::new(false),
            query_calls: std::sync::atomic::AtomicUsize::new(0),
            install_calls: std::sync::atomic::AtomicUsize::new(0),
            delete_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn with_release(self, namespace: &str, content: ReleaseContent) -> Self {
        self.releases
            .lock()
            .unwrap()
            .insert(format!("{}/{}", namespace, content.name), content);
        self
    }

    /// A release another actor creates concurrently: queries miss it
    /// until the first install attempt has happened
    pub fn with_racing_release(self, namespace: &str, content: ReleaseContent) -> Self {
        self.racing
            .lock()
            .unwrap()
            .insert(format!("{}/{}", namespace, content.name), content);
        self
    }

    /// Uninstalls succeed but leave the release in place
    pub fn with_stuck_uninstalls(self) -> Self {
        self.stuck_uninstalls
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self
    }

    /// Make every query fail with the given message
    pub fn fail_queries(self, message: &str) -> Self {
        *self.query_error.lock().unwrap() = Some(message.to_string());
        self
    }

    /// Make every install fail with the given message
    pub fn fail_installs(self, message: &str) -> Self {
        *self.install_error.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn install_count(&self) -> usize {
        self.install_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.delete_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.query_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[async_trait]
impl HelmClient for MockHelmClient {
    async fn release_content(
        &self,
        namespace: &str,
        release_name: &str,
    ) -> Result<Option<ReleaseContent>> {
        self.query_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(message) = self.query_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", message));
        }
        let key = format!("{}/{}", namespace, release_name);
        if let Some(content) = self.releases.lock().unwrap().get(&key) {
            return Ok(Some(content.clone()));
        }
        if self.install_calls.load(std::sync::atomic::Ordering::SeqCst) > 0 {
            return Ok(self.racing.lock().unwrap().get(&key).cloned());
        }
        Ok(None)
    }

    async fn install_release(&self, request: &InstallRequest) -> Result<()> {
        self.install_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(message) = self.install_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", message));
        }
        self.releases.lock().unwrap().insert(
            format!("{}/{}", request.namespace, request.release_name),
            ReleaseContent {
                name: request.release_name.clone(),
                status: ReleaseStatus::Deployed,
                chart_version: request.chart_version.clone(),
                values: request.values.clone(),
            },
        );
        Ok(())
    }

    async fn delete_release(&self, namespace: &str, release_name: &str) -> Result<()> {
        self.delete_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        // "Not found" counts as success, same as the CLI client
        if !self
            .stuck_uninstalls
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            self.releases
                .lock()
                .unwrap()
                .remove(&format!("{}/{}", namespace, release_name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_status_from_helm_strings() {
        assert_eq!(ReleaseStatus::from_helm("deployed"), ReleaseStatus::Deployed);
        assert_eq!(
            ReleaseStatus::from_helm("pending-install"),
            ReleaseStatus::Pending
        );
        assert_eq!(
            ReleaseStatus::from_helm("pending-upgrade"),
            ReleaseStatus::Pending
        );
        assert_eq!(
            ReleaseStatus::from_helm("uninstalling"),
            ReleaseStatus::Pending
        );
        assert_eq!(ReleaseStatus::from_helm("failed"), ReleaseStatus::Failed);
        assert_eq!(ReleaseStatus::from_helm("superseded"), ReleaseStatus::Failed);
    }

    #[test]
    fn test_helm_list_entry_parses() {
        let json = r#"[{"name":"my-app","namespace":"default","revision":"2",
            "updated":"2026-08-01 10:00:00.000000000 +0000 UTC",
            "status":"deployed","chart":"my-app-1.2.3","app_version":"1.0"}]"#;
        let entries: Vec<HelmListEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "my-app");
        assert_eq!(entries[0].status, "deployed");
    }

    /// The metadata version field carries the chart version verbatim.
    /// The `helm list` chart column ("my-app-1.3.0-rc1") is ambiguous
    /// once chart name or version contains a hyphen, so it must never
    /// be the source of the version.
    #[test]
    fn test_helm_metadata_preserves_prerelease_version() {
        let json = r#"{"name":"my-app","chart":"my-app","version":"1.3.0-rc1",
            "appVersion":"1.0","namespace":"default","revision":"2",
            "status":"deployed"}"#;
        let metadata: HelmMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.version, "1.3.0-rc1");
    }

    #[test]
    fn test_helm_metadata_parses_plain_version() {
        let json = r#"{"name":"my-app","chart":"my-app","version":"1.2.3"}"#;
        let metadata: HelmMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.version, "1.2.3");
    }

    #[test]
    fn test_normalize_values_maps_null_to_empty_object() {
        assert_eq!(
            normalize_values(serde_json::Value::Null),
            serde_json::json!({})
        );
        let values = serde_json::json!({"replicas": 2});
        assert_eq!(normalize_values(values.clone()), values);
    }

    #[test]
    fn test_regex_escape_anchors_literal_names() {
        assert_eq!(regex_escape("my-app"), "my-app");
        assert_eq!(regex_escape("app.v2"), "app\\.v2");
    }
}
