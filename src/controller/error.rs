//! Closed error taxonomy for the release migration logic.
//!
//! Every error kind has a fixed retry disposition; classification is a
//! pure function over the kind so the controller can map outcomes to
//! requeue behavior without inspecting messages.

use crate::controller::backoff::Profile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// Required input missing at validation time. Never retried.
    #[error("invalid chart deployment: {0}")]
    InvalidConfig(String),

    /// The legacy ConfigMap/Secret pair is still present after a delete
    /// was issued. Deletion may be asynchronous (e.g. waiting on
    /// finalizers), so this is retried on the Short profile.
    #[error("legacy release for {release} is still being deleted")]
    ReleasesNotDeleted { release: String },

    /// The target release exists with a configuration that differs from
    /// the desired one. Never overwritten silently; surfaced as a
    /// standing conflict.
    #[error("release {release} already exists with different configuration: {detail}")]
    ReleaseAlreadyExists { release: String, detail: String },

    /// An underlying Helm/Kubernetes call failed for reasons outside
    /// this system's control. Retried on the Long profile.
    #[error("client call failed: {0}")]
    Client(#[from] anyhow::Error),
}

/// Retry disposition of an error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Never retried, surfaced immediately
    Fatal,
    /// Recovered via requeue under the given backoff profile
    Transient(Profile),
    /// Not auto-resolved; requires external intervention
    Conflict,
}

impl MigrationError {
    pub fn disposition(&self) -> Disposition {
        match self {
            MigrationError::InvalidConfig(_) => Disposition::Fatal,
            MigrationError::ReleasesNotDeleted { .. } => Disposition::Transient(Profile::Short),
            MigrationError::ReleaseAlreadyExists { .. } => Disposition::Conflict,
            MigrationError::Client(_) => Disposition::Transient(Profile::Long),
        }
    }
}
