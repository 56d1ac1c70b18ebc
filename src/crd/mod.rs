pub mod chart_deployment;

pub use chart_deployment::{ChartDeployment, ChartDeploymentSpec, ChartDeploymentStatus, Phase};

#[cfg(test)]
#[path = "chart_deployment_test.rs"]
mod chart_deployment_tests;
