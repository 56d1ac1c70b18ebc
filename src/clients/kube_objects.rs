//! Kubernetes client seam for the legacy ConfigMap/Secret pair.
//!
//! Reads must distinguish "not found" from transient query failure:
//! the migration logic treats a query error as unknown state, never as
//! absence, or it could install the target release while the legacy
//! one still exists.

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::Api;

/// Trait for reading and deleting the legacy release backing objects
///
/// Production code uses `KubeLegacyObjects`; tests use
/// `MockLegacyObjects` parameterized with canned objects and errors.
#[async_trait]
pub trait LegacyObjects: Send + Sync {
    async fn config_map_exists(&self, namespace: &str, name: &str) -> Result<bool>;
    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool>;

    /// Delete the ConfigMap; "not found" counts as success.
    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()>;

    /// Delete the Secret; "not found" counts as success.
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Production implementation backed by the cluster API
pub struct KubeLegacyObjects {
    client: kube::Client,
}

impl KubeLegacyObjects {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

/// True when the delete failed only because the object is already gone
fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}

#[async_trait]
impl LegacyObjects for KubeLegacyObjects {
    async fn config_map_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        // get_opt maps 404 to None; any other failure propagates
        let object = api
            .get_opt(name)
            .await
            .with_context(|| format!("reading configmap {}/{}", namespace, name))?;
        Ok(object.is_some())
    }

    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let object = api
            .get_opt(name)
            .await
            .with_context(|| format!("reading secret {}/{}", namespace, name))?;
        Ok(object.is_some())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &Default::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("deleting configmap {}/{}", namespace, name)),
        }
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &Default::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("deleting secret {}/{}", namespace, name)),
        }
    }
}

/// Mock implementation for tests: in-memory object sets with switches
/// to simulate stuck deletions (finalizers) and read failures.
#[cfg(test)]
pub struct MockLegacyObjects {
    config_maps: std::sync::Mutex<std::collections::HashSet<(String, String)>>,
    secrets: std::sync::Mutex<std::collections::HashSet<(String, String)>>,
    /// When set, deletes succeed but objects remain, as with a pending
    /// finalizer
    stuck_deletes: std::sync::atomic::AtomicBool,
    read_error: std::sync::Mutex<Option<String>>,
    pub delete_calls: std::sync::atomic::AtomicUsize,
    pub read_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl Default for MockLegacyObjects {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockLegacyObjects {
    pub fn new() -> Self {
        MockLegacyObjects {
            config_maps: std::sync::Mutex::new(std::collections::HashSet::new()),
            secrets: std::sync::Mutex::new(std::collections::HashSet::new()),
            stuck_deletes: std::sync::atomic::AtomicBool::new(false),
            read_error: std::sync::Mutex::new(None),
            delete_calls: std::sync::atomic::AtomicUsize::new(0),
            read_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn with_config_map(self, namespace: &str, name: &str) -> Self {
        self.config_maps
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()));
        self
    }

    pub fn with_secret(self, namespace: &str, name: &str) -> Self {
        self.secrets
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()));
        self
    }

    /// Deletes succeed but leave the objects in place
    pub fn with_stuck_deletes(self) -> Self {
        self.stuck_deletes
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self
    }

    /// Make every existence read fail with the given message
    pub fn fail_reads(self, message: &str) -> Self {
        *self.read_error.lock().unwrap() = Some(message.to_string());
        self
    }

    /// Simulate the external system finishing an asynchronous deletion
    pub fn finish_deletions(&self, namespace: &str) {
        self.config_maps
            .lock()
            .unwrap()
            .retain(|(ns, _)| ns != namespace);
        self.secrets
            .lock()
            .unwrap()
            .retain(|(ns, _)| ns != namespace);
    }

    pub fn delete_count(&self) -> usize {
        self.delete_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.read_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn read_checked(&self) -> Result<()> {
        self.read_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(message) = self.read_error.lock().unwrap().as_ref() {
            return Err(anyhow::anyhow!("{}", message));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[async_trait]
impl LegacyObjects for MockLegacyObjects {
    async fn config_map_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        self.read_checked()?;
        Ok(self
            .config_maps
            .lock()
            .unwrap()
            .contains(&(namespace.to_string(), name.to_string())))
    }

    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        self.read_checked()?;
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .contains(&(namespace.to_string(), name.to_string())))
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if !self.stuck_deletes.load(std::sync::atomic::Ordering::SeqCst) {
            self.config_maps
                .lock()
                .unwrap()
                .remove(&(namespace.to_string(), name.to_string()));
        }
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if !self.stuck_deletes.load(std::sync::atomic::Ordering::SeqCst) {
            self.secrets
                .lock()
                .unwrap()
                .remove(&(namespace.to_string(), name.to_string()));
        }
        Ok(())
    }
}
