//! Client seams consumed by the migration logic.
//!
//! Each external dependency is a narrow capability trait with a
//! production implementation and a deterministic mock for tests.

pub mod helm;
pub mod kube_objects;

pub use helm::{CliHelmClient, HelmClient, InstallRequest, ReleaseContent, ReleaseStatus};
pub use kube_objects::{KubeLegacyObjects, LegacyObjects};
