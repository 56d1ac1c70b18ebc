//! Version-bundle metadata for fleet-wide upgrade sequencing.
//!
//! A static descriptor of this component: name, semantic version and
//! human-readable changelog entries. It is consumed by a cluster-wide
//! version tracker and never consulted by the migration logic itself.

use serde::Serialize;

pub const COMPONENT_NAME: &str = "chart-operator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Changed,
    Fixed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Changelog {
    pub component: &'static str,
    pub description: &'static str,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionBundle {
    pub name: &'static str,
    pub version: &'static str,
    pub changelogs: Vec<Changelog>,
}

/// The version bundle published by this build
pub fn version_bundle() -> VersionBundle {
    VersionBundle {
        name: COMPONENT_NAME,
        version: env!("CARGO_PKG_VERSION"),
        changelogs: vec![
            Changelog {
                component: COMPONENT_NAME,
                description: "Migrate legacy ConfigMap/Secret releases to native Helm releases.",
                kind: ChangeKind::Changed,
            },
            Changelog {
                component: COMPONENT_NAME,
                description: "Bound every Helm/Kubernetes call by a per-call timeout.",
                kind: ChangeKind::Added,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_bundle_matches_crate_version() {
        let bundle = version_bundle();
        assert_eq!(bundle.name, "chart-operator");
        assert_eq!(bundle.version, env!("CARGO_PKG_VERSION"));
        assert!(!bundle.changelogs.is_empty());
    }

    #[test]
    fn test_version_bundle_serializes() {
        let json = serde_json::to_value(version_bundle()).expect("serializing version bundle");
        assert_eq!(json["name"], "chart-operator");
        assert!(json["changelogs"].is_array());
    }
}
